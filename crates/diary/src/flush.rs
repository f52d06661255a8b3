use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::buffer::{BufferedContent, IngestionBuffer};
use crate::document::merge_into_folder;
use crate::error::{DiaryError, Result};
use crate::event::ConversationId;
use crate::grouping::group_by_local_date;
use crate::settings::DiarySettings;

/// Result of a successful flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered; no file was touched.
    Empty,
    /// Page file names, in ascending date order.
    Saved { files: Vec<String> },
}

impl FlushOutcome {
    /// Reply sent back to whoever asked for the flush.
    pub fn reply(&self) -> String {
        match self {
            FlushOutcome::Empty => "Nothing to save yet, the buffer is empty.".to_string(),
            FlushOutcome::Saved { files } => {
                format!("Saved new entries to {}.", files.join(", "))
            }
        }
    }
}

/// Drains conversation buffers into diary pages.
///
/// Flushes of one conversation run one at a time.  The buffer is only locked
/// to take the snapshot and to acknowledge it afterwards; page I/O happens on
/// the blocking pool in between, so producers keep adding while a flush runs.
#[derive(Debug)]
pub struct DiaryWriter {
    buffer: Arc<IngestionBuffer>,
    settings: Arc<DiarySettings>,
    flush_locks: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl DiaryWriter {
    pub fn new(buffer: Arc<IngestionBuffer>, settings: DiarySettings) -> Self {
        Self {
            buffer,
            settings: Arc::new(settings),
            flush_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn buffer(&self) -> &IngestionBuffer {
        &self.buffer
    }

    pub fn settings(&self) -> &DiarySettings {
        &self.settings
    }

    async fn flush_lock(&self, conversation: &ConversationId) -> Arc<Mutex<()>> {
        let mut locks = self.flush_locks.lock().await;
        Arc::clone(locks.entry(conversation.clone()).or_default())
    }

    /// Writes everything buffered for `conversation` into `folder`, one page
    /// per local day, oldest day first.
    ///
    /// The flushed events leave the buffer only after every page was written.
    /// On error the buffer is left as it was, so the flush can be retried.
    pub async fn flush(
        &self,
        conversation: &ConversationId,
        folder: impl Into<PathBuf>,
    ) -> Result<FlushOutcome> {
        let folder = folder.into();
        let lock = self.flush_lock(conversation).await;
        let _guard = lock.lock().await;

        let snapshot = self.buffer.get_content(conversation).await;
        if snapshot.is_empty() {
            info!(%conversation, "flush requested with an empty buffer");
            return Ok(FlushOutcome::Empty);
        }
        info!(
            %conversation,
            texts = snapshot.texts.len(),
            images = snapshot.images.len(),
            folder = %folder.display(),
            "flushing buffered entries"
        );

        let files = {
            let snapshot = Arc::clone(&snapshot);
            let settings = Arc::clone(&self.settings);
            tokio::task::spawn_blocking(move || write_days(&folder, &snapshot, &settings)).await??
        };

        if !self.buffer.acknowledge(conversation, &snapshot).await {
            debug!(%conversation, "buffer was cleared while flushing, nothing to acknowledge");
        }
        Ok(FlushOutcome::Saved { files })
    }
}

/// Groups `content` by local day and merges each day into its page.
pub fn write_days(
    folder: &Path,
    content: &BufferedContent,
    settings: &DiarySettings,
) -> Result<Vec<String>> {
    fs::create_dir_all(folder).map_err(|source| DiaryError::CreateDir {
        path: folder.to_path_buf(),
        source,
    })?;

    let days = group_by_local_date(&content.texts, &content.images, settings.zone);
    let mut files = Vec::with_capacity(days.len());
    for (date, bucket) in days {
        let events = bucket.into_sorted_events();
        files.push(merge_into_folder(folder, date, &events, settings)?);
    }
    Ok(files)
}
