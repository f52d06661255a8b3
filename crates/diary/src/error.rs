use std::io;
use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Failures that leave the buffer untouched so the flush can be retried.
#[derive(Debug, Error)]
pub enum DiaryError {
    #[error("failed to read diary page {} ({date}): {source}", path.display())]
    ReadPage {
        path: PathBuf,
        date: NaiveDate,
        source: io::Error,
    },
    #[error("failed to write diary page {} ({date}): {source}", path.display())]
    WritePage {
        path: PathBuf,
        date: NaiveDate,
        source: io::Error,
    },
    #[error("failed to create diary folder {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("diary writer task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, DiaryError>;
