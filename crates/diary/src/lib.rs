//! Diary ingestion buffer and page merge engine.
//!
//! Producers push text and image events into an [`IngestionBuffer`]; a flush
//! groups the buffered events by local calendar day and appends them to one
//! Markdown page per day, keeping whatever the user already wrote there.

pub mod buffer;
pub mod document;
pub mod error;
pub mod event;
pub mod flush;
pub mod grouping;
pub mod navigation;
pub mod segment;
pub mod settings;

pub use buffer::{BufferStats, BufferedContent, IngestionBuffer};
pub use document::{Document, merge_into_folder, merge_page, write_page};
pub use error::{DiaryError, Result};
pub use event::{ConversationId, Event, ImageEvent, RawTimestamp, TextEvent, normalize_timestamp};
pub use flush::{DiaryWriter, FlushOutcome};
pub use grouping::{DayBucket, group_by_local_date};
pub use navigation::{adjacent_date_labels, date_label, page_file_name};
pub use segment::{Block, render_blocks, segment_events};
pub use settings::DiarySettings;
