use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::event::{ConversationId, ImageEvent, RawTimestamp, TextEvent, normalize_timestamp};

/// Immutable copy of one conversation's buffer, shared by everyone reading it
/// until the next add or clear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferedContent {
    pub texts: Vec<TextEvent>,
    pub images: Vec<ImageEvent>,
    epoch: u64,
}

impl BufferedContent {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.texts.len() + self.images.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub texts: usize,
    pub images: usize,
}

#[derive(Debug, Default)]
struct ConversationBuffer {
    texts: Vec<TextEvent>,
    images: Vec<ImageEvent>,
    /// Memoized snapshot; dropped whenever the lists change.
    cache: Option<Arc<BufferedContent>>,
    /// Bumped whenever events are removed, so a snapshot taken before the
    /// removal can no longer be acknowledged.
    epoch: u64,
}

impl ConversationBuffer {
    fn snapshot(&mut self) -> Arc<BufferedContent> {
        if let Some(cached) = &self.cache {
            return Arc::clone(cached);
        }
        let snapshot = Arc::new(BufferedContent {
            texts: self.texts.clone(),
            images: self.images.clone(),
            epoch: self.epoch,
        });
        self.cache = Some(Arc::clone(&snapshot));
        snapshot
    }
}

/// Per-conversation accumulation of diary events.
///
/// Each conversation sits behind its own mutex; the outer map is only
/// write-locked the first time a conversation shows up, so adds to different
/// conversations never wait on each other.
#[derive(Debug, Default)]
pub struct IngestionBuffer {
    conversations: RwLock<HashMap<ConversationId, Arc<Mutex<ConversationBuffer>>>>,
}

impl IngestionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, conversation: &ConversationId) -> Arc<Mutex<ConversationBuffer>> {
        {
            let map = self.conversations.read().await;
            if let Some(slot) = map.get(conversation) {
                return Arc::clone(slot);
            }
        }
        let mut map = self.conversations.write().await;
        Arc::clone(map.entry(conversation.clone()).or_default())
    }

    async fn existing_slot(
        &self,
        conversation: &ConversationId,
    ) -> Option<Arc<Mutex<ConversationBuffer>>> {
        self.conversations.read().await.get(conversation).cloned()
    }

    pub async fn add_text(
        &self,
        conversation: impl Into<ConversationId>,
        text: impl Into<String>,
        timestamp: impl Into<RawTimestamp>,
    ) {
        let conversation = conversation.into();
        let event = TextEvent {
            conversation: conversation.clone(),
            text: text.into(),
            timestamp: normalize_timestamp(timestamp),
        };
        debug!(%conversation, at = %event.timestamp, "buffering text entry");

        let slot = self.slot(&conversation).await;
        let mut buffer = slot.lock().await;
        buffer.texts.push(event);
        buffer.cache = None;
    }

    pub async fn add_image(
        &self,
        conversation: impl Into<ConversationId>,
        path: impl Into<PathBuf>,
        timestamp: impl Into<RawTimestamp>,
    ) {
        let conversation = conversation.into();
        let event = ImageEvent {
            conversation: conversation.clone(),
            image_path: path.into(),
            timestamp: normalize_timestamp(timestamp),
        };
        debug!(%conversation, path = %event.image_path.display(), "buffering image entry");

        let slot = self.slot(&conversation).await;
        let mut buffer = slot.lock().await;
        buffer.images.push(event);
        buffer.cache = None;
    }

    /// Current texts and images of `conversation`, in append order.
    pub async fn get_content(&self, conversation: &ConversationId) -> Arc<BufferedContent> {
        let Some(slot) = self.existing_slot(conversation).await else {
            return Arc::new(BufferedContent::default());
        };
        let mut buffer = slot.lock().await;
        buffer.snapshot()
    }

    pub async fn clear(&self, conversation: &ConversationId) {
        if let Some(slot) = self.existing_slot(conversation).await {
            let mut buffer = slot.lock().await;
            buffer.texts.clear();
            buffer.images.clear();
            buffer.cache = None;
            buffer.epoch += 1;
        }
    }

    /// Drops the events contained in `snapshot` and keeps anything added after
    /// it was taken.  Returns `false` (and changes nothing) when the buffer was
    /// cleared or acknowledged since.
    pub async fn acknowledge(
        &self,
        conversation: &ConversationId,
        snapshot: &BufferedContent,
    ) -> bool {
        let Some(slot) = self.existing_slot(conversation).await else {
            return false;
        };
        let mut buffer = slot.lock().await;
        if buffer.epoch != snapshot.epoch {
            return false;
        }

        // Events are only ever appended, so a snapshot is a prefix of the lists.
        let texts = snapshot.texts.len().min(buffer.texts.len());
        let images = snapshot.images.len().min(buffer.images.len());
        buffer.texts.drain(..texts);
        buffer.images.drain(..images);
        buffer.cache = None;
        buffer.epoch += 1;
        true
    }

    pub async fn stats(&self, conversation: &ConversationId) -> BufferStats {
        match self.existing_slot(conversation).await {
            Some(slot) => {
                let buffer = slot.lock().await;
                BufferStats {
                    texts: buffer.texts.len(),
                    images: buffer.images.len(),
                }
            }
            None => BufferStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, NaiveDate};

    use super::*;

    fn at(raw: &str) -> DateTime<chrono::FixedOffset> {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    #[tokio::test]
    async fn returns_exactly_what_was_added() {
        let buffer = IngestionBuffer::new();
        let g1 = ConversationId::from("G1");

        buffer.add_text("G1", "Had lunch", at("2025-03-05T13:05:00+05:30")).await;
        buffer.add_image("G1", "/a/one.jpg", at("2025-03-05T13:06:00+05:30")).await;
        buffer.add_text("G1", "Went for a walk", at("2025-03-05T13:40:00+05:30")).await;
        buffer.add_image("G1", "/a/two.jpg", at("2025-03-05T12:00:00+05:30")).await;

        let content = buffer.get_content(&g1).await;
        let texts = content.texts.iter().map(|t| t.text.as_str()).collect::<Vec<_>>();
        let images = content.images.iter().map(|i| i.file_name()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["Had lunch", "Went for a walk"]);
        assert_eq!(images, vec!["one.jpg", "two.jpg"]);
        assert_eq!(content.len(), 4);
    }

    #[tokio::test]
    async fn naive_timestamps_are_stored_as_utc() {
        let buffer = IngestionBuffer::new();
        let naive = NaiveDate::from_ymd_opt(2025, 3, 5)
            .unwrap()
            .and_hms_opt(7, 35, 0)
            .unwrap();
        buffer.add_text(7_i64, "naive", naive).await;

        let content = buffer.get_content(&ConversationId::from(7_i64)).await;
        assert_eq!(content.texts[0].timestamp, at("2025-03-05T07:35:00+00:00"));
    }

    #[tokio::test]
    async fn cache_is_reused_until_the_next_add() {
        let buffer = IngestionBuffer::new();
        let g1 = ConversationId::from("G1");
        buffer.add_text("G1", "one", at("2025-03-05T09:00:00+05:30")).await;

        let first = buffer.get_content(&g1).await;
        let second = buffer.get_content(&g1).await;
        assert!(Arc::ptr_eq(&first, &second));

        buffer.add_text("G1", "two", at("2025-03-05T09:01:00+05:30")).await;
        let third = buffer.get_content(&g1).await;
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.texts.len(), 2);
        // Earlier readers keep their stable view.
        assert_eq!(first.texts.len(), 1);
    }

    #[tokio::test]
    async fn clear_empties_both_lists() {
        let buffer = IngestionBuffer::new();
        let g1 = ConversationId::from("G1");
        buffer.add_text("G1", "one", at("2025-03-05T09:00:00+05:30")).await;
        buffer.add_image("G1", "/a/one.jpg", at("2025-03-05T09:00:00+05:30")).await;
        let _ = buffer.get_content(&g1).await;

        buffer.clear(&g1).await;
        let content = buffer.get_content(&g1).await;
        assert!(content.texts.is_empty());
        assert!(content.images.is_empty());
    }

    #[tokio::test]
    async fn unknown_conversation_is_empty() {
        let buffer = IngestionBuffer::new();
        let nobody = ConversationId::from("nobody");
        assert!(buffer.get_content(&nobody).await.is_empty());
        assert_eq!(buffer.stats(&nobody).await, BufferStats::default());
        buffer.clear(&nobody).await;
    }

    #[tokio::test]
    async fn acknowledge_keeps_events_added_after_the_snapshot() {
        let buffer = IngestionBuffer::new();
        let g1 = ConversationId::from("G1");
        buffer.add_text("G1", "flushed", at("2025-03-05T09:00:00+05:30")).await;
        let snapshot = buffer.get_content(&g1).await;

        buffer.add_text("G1", "late", at("2025-03-05T09:05:00+05:30")).await;
        buffer.add_image("G1", "/a/late.jpg", at("2025-03-05T09:06:00+05:30")).await;
        assert!(buffer.acknowledge(&g1, &snapshot).await);

        let rest = buffer.get_content(&g1).await;
        assert_eq!(rest.texts.len(), 1);
        assert_eq!(rest.texts[0].text, "late");
        assert_eq!(rest.images.len(), 1);

        // The same snapshot cannot remove anything twice.
        assert!(!buffer.acknowledge(&g1, &snapshot).await);
        assert_eq!(buffer.stats(&g1).await, BufferStats { texts: 1, images: 1 });
    }

    #[tokio::test]
    async fn acknowledge_after_clear_is_a_no_op() {
        let buffer = IngestionBuffer::new();
        let g1 = ConversationId::from("G1");
        buffer.add_text("G1", "old", at("2025-03-05T09:00:00+05:30")).await;
        let snapshot = buffer.get_content(&g1).await;

        buffer.clear(&g1).await;
        buffer.add_text("G1", "new", at("2025-03-05T10:00:00+05:30")).await;
        assert!(!buffer.acknowledge(&g1, &snapshot).await);
        assert_eq!(buffer.get_content(&g1).await.texts[0].text, "new");
    }

    #[tokio::test]
    async fn concurrent_adds_across_conversations_are_all_kept() {
        let buffer = Arc::new(IngestionBuffer::new());
        let mut tasks = Vec::new();
        for chat in 0..4_i64 {
            for n in 0..25 {
                let buffer = Arc::clone(&buffer);
                tasks.push(tokio::spawn(async move {
                    let stamp = at("2025-03-05T09:00:00+05:30");
                    if n % 2 == 0 {
                        buffer.add_text(chat, format!("note {n}"), stamp).await;
                    } else {
                        buffer.add_image(chat, format!("/a/{n}.jpg"), stamp).await;
                    }
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        for chat in 0..4_i64 {
            let stats = buffer.stats(&ConversationId::from(chat)).await;
            assert_eq!(stats, BufferStats { texts: 13, images: 12 });
        }
    }
}
