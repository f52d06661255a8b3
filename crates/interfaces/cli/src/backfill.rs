//! Offline import: replays a JSONL export of diary entries through the same
//! buffer and flush path the bot uses.
//!
//! ```text
//! {"kind":"text","text":"Had lunch","timestamp":"2025-03-05T13:05:00+05:30"}
//! {"kind":"image","path":"attachments/image_1.jpg","timestamp":"2025-03-05 07:40:00"}
//! ```
//!
//! Timestamps without an offset are read as UTC.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use tracing::{info, warn};

use diarist_diary::{ConversationId, DiaryWriter, RawTimestamp};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum BackfillRecord {
    Text { text: String, timestamp: String },
    Image { path: PathBuf, timestamp: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BackfillEntry {
    Text(String, RawTimestamp),
    Image(PathBuf, RawTimestamp),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BackfillCounts {
    pub(crate) accepted: usize,
    pub(crate) rejected: usize,
}

fn parse_timestamp(raw: &str) -> Result<RawTimestamp> {
    let raw = raw.trim();
    if let Ok(zoned) = DateTime::parse_from_rfc3339(raw) {
        return Ok(zoned.into());
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.into());
        }
    }
    bail!("unrecognised timestamp `{raw}`")
}

fn parse_line(line: &str) -> Result<BackfillEntry> {
    let record: BackfillRecord = serde_json::from_str(line).context("invalid record")?;
    Ok(match record {
        BackfillRecord::Text { text, timestamp } => {
            BackfillEntry::Text(text, parse_timestamp(&timestamp)?)
        }
        BackfillRecord::Image { path, timestamp } => {
            BackfillEntry::Image(path, parse_timestamp(&timestamp)?)
        }
    })
}

/// Buffers every valid line of `raw`.  Invalid lines are logged and skipped;
/// they never reach the buffer.
pub(crate) async fn buffer_lines(
    writer: &DiaryWriter,
    conversation: &ConversationId,
    raw: &str,
) -> BackfillCounts {
    let mut counts = BackfillCounts::default();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(BackfillEntry::Text(text, timestamp)) => {
                writer.buffer().add_text(conversation, text, timestamp).await;
                counts.accepted += 1;
            }
            Ok(BackfillEntry::Image(path, timestamp)) => {
                writer.buffer().add_image(conversation, path, timestamp).await;
                counts.accepted += 1;
            }
            Err(err) => {
                warn!(line = index + 1, error = %format!("{err:#}"), "skipping backfill line");
                counts.rejected += 1;
            }
        }
    }
    counts
}

pub(crate) async fn run_backfill(
    writer: &DiaryWriter,
    conversation: &ConversationId,
    file: &Path,
    folder: &Path,
) -> Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("read backfill file {}", file.display()))?;
    let counts = buffer_lines(writer, conversation, &raw).await;
    info!(
        accepted = counts.accepted,
        rejected = counts.rejected,
        file = %file.display(),
        "backfill entries buffered"
    );

    let outcome = writer.flush(conversation, folder).await?;
    println!("{}", outcome.reply());
    if counts.rejected > 0 {
        println!("skipped {} invalid line(s); see log for details", counts.rejected);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use tempfile::TempDir;

    use diarist_diary::{DiarySettings, IngestionBuffer};

    use super::*;

    #[test]
    fn zoned_and_naive_timestamps_are_accepted() {
        let zoned = parse_timestamp("2025-03-05T13:05:00+05:30").unwrap();
        assert_eq!(
            zoned,
            RawTimestamp::Zoned(DateTime::parse_from_rfc3339("2025-03-05T13:05:00+05:30").unwrap())
        );

        let naive = parse_timestamp("2025-03-05 07:40").unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 3, 5)
            .unwrap()
            .and_hms_opt(7, 40, 0)
            .unwrap();
        assert_eq!(naive, RawTimestamp::Naive(expected));

        assert!(parse_timestamp("yesterday at noon").is_err());
    }

    #[test]
    fn records_are_tagged_by_kind() {
        let text = parse_line(r#"{"kind":"text","text":"Had lunch","timestamp":"2025-03-05T13:05:00+05:30"}"#)
            .unwrap();
        assert!(matches!(text, BackfillEntry::Text(ref body, _) if body == "Had lunch"));

        let image = parse_line(r#"{"kind":"image","path":"a/b.jpg","timestamp":"2025-03-05T07:40:00"}"#)
            .unwrap();
        assert!(matches!(image, BackfillEntry::Image(ref path, _) if path.ends_with("b.jpg")));

        assert!(parse_line(r#"{"kind":"video","path":"x.mp4","timestamp":"2025-03-05T07:40:00"}"#).is_err());
        assert!(parse_line("not json").is_err());
    }

    #[tokio::test]
    async fn invalid_lines_never_reach_the_buffer() {
        let dir = TempDir::new().unwrap();
        let writer = DiaryWriter::new(Arc::new(IngestionBuffer::new()), DiarySettings::default());
        let conversation = ConversationId::from("backfill");
        let raw = concat!(
            r#"{"kind":"text","text":"Had lunch","timestamp":"2025-03-05T13:05:00+05:30"}"#,
            "\n\n",
            r#"{"kind":"text","text":"broken","timestamp":"someday"}"#,
            "\n",
            r#"{"kind":"text","text":"Went for a walk","timestamp":"2025-03-05T13:40:00+05:30"}"#,
            "\n",
        );

        let counts = buffer_lines(&writer, &conversation, raw).await;
        assert_eq!(counts, BackfillCounts { accepted: 2, rejected: 1 });

        let file = dir.path().join("events.jsonl");
        fs::write(&file, "").unwrap();
        run_backfill(&writer, &conversation, &file, dir.path()).await.unwrap();

        let page = fs::read_to_string(dir.path().join("March5'25.md")).unwrap();
        assert!(page.starts_with("Neram: 01:05 PM\nHad lunch\n\nNeram: 01:40 PM\nWent for a walk\n\n"));
        assert!(!page.contains("broken"));
        assert!(writer.buffer().get_content(&conversation).await.is_empty());
    }
}
