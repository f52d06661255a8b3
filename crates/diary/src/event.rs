use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// Logical channel events are buffered under (a Telegram chat id, a backfill
/// source name, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for ConversationId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&ConversationId> for ConversationId {
    fn from(value: &ConversationId) -> Self {
        value.clone()
    }
}

/// A timestamp as handed over by a producer, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTimestamp {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl<Tz: TimeZone> From<DateTime<Tz>> for RawTimestamp {
    fn from(value: DateTime<Tz>) -> Self {
        Self::Zoned(value.fixed_offset())
    }
}

impl From<NaiveDateTime> for RawTimestamp {
    fn from(value: NaiveDateTime) -> Self {
        Self::Naive(value)
    }
}

/// The single place where timezone-less input gets a zone: naive timestamps
/// are read as UTC.  Everything downstream works on zoned instants.
pub fn normalize_timestamp(raw: impl Into<RawTimestamp>) -> DateTime<FixedOffset> {
    match raw.into() {
        RawTimestamp::Zoned(value) => value,
        RawTimestamp::Naive(value) => Utc.from_utc_datetime(&value).fixed_offset(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEvent {
    pub conversation: ConversationId,
    pub text: String,
    pub timestamp: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEvent {
    pub conversation: ConversationId,
    pub image_path: PathBuf,
    pub timestamp: DateTime<FixedOffset>,
}

impl ImageEvent {
    /// File name used in the page embed; falls back to the whole path.
    pub fn file_name(&self) -> String {
        self.image_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.image_path.display().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Text(TextEvent),
    Image(ImageEvent),
}

impl Event {
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        match self {
            Event::Text(event) => event.timestamp,
            Event::Image(event) => event.timestamp,
        }
    }
}
