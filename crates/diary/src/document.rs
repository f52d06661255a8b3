//! Diary page parsing, merging and persistence.
//!
//! A page is a free-form Markdown body followed by a footer that starts at the
//! first line consisting of the delimiter (`---` by default):
//!
//! ```text
//! Neram: 01:05 PM
//! Had lunch
//!
//!
//! ---
//! [[March4'25]] | [[March6'25]]
//! ```
//!
//! New entries are always appended to the body.  The footer is written once,
//! when the page is created, and carried over verbatim afterwards.

use std::fs::{self, File, FileTimes};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::error::{DiaryError, Result};
use crate::event::Event;
use crate::navigation::{adjacent_date_labels, page_file_name};
use crate::segment::{render_blocks, segment_events};
use crate::settings::DiarySettings;

const HEADER_TIME_FORMAT: &str = "%I:%M %p";

/// An existing page split into the part entries are appended to and the part
/// that is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Everything before the delimiter line, trimmed.
    pub body: String,
    /// A newline, the delimiter line and everything after it, untouched.  A
    /// lone newline when the page has no delimiter.
    pub footer: String,
}

impl Document {
    pub fn parse(raw: &str, delimiter: &str) -> Self {
        match find_delimiter_line(raw, delimiter) {
            Some(start) => Self {
                body: raw[..start].trim().to_string(),
                footer: format!("\n{}", &raw[start..]),
            },
            None => Self {
                body: raw.trim().to_string(),
                footer: "\n".to_string(),
            },
        }
    }

    /// The last time header in the body, placed on `date` in `zone`.
    ///
    /// Returns `None` when there is no header or it cannot be read; the caller
    /// then starts the new entries with a fresh header.
    pub fn last_header(&self, label: &str, date: NaiveDate, zone: Tz) -> Option<DateTime<Tz>> {
        let line = self
            .body
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| line.starts_with(label))?;
        let raw_time = line[label.len()..].trim();

        let time = match NaiveTime::parse_from_str(raw_time, HEADER_TIME_FORMAT) {
            Ok(time) => time,
            Err(err) => {
                debug!(header = raw_time, error = %err, "unreadable time header — starting fresh");
                return None;
            }
        };

        zone.from_local_datetime(&date.and_time(time)).earliest()
    }
}

fn find_delimiter_line(raw: &str, delimiter: &str) -> Option<usize> {
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if line.trim() == delimiter {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Builds the full text of the page for `date` after appending `events`
/// (sorted ascending).  `existing` is the current page content, `None` when
/// the page does not exist yet.
pub fn merge_page(
    existing: Option<&str>,
    date: NaiveDate,
    events: &[Event],
    settings: &DiarySettings,
) -> String {
    let document = existing.map(|raw| Document::parse(raw, &settings.delimiter));
    let seed = document
        .as_ref()
        .and_then(|doc| doc.last_header(&settings.header_label, date, settings.zone));

    let blocks = segment_events(events, seed, settings.zone, settings.gap_threshold);

    let mut out = String::new();
    if let Some(doc) = &document {
        if !doc.body.is_empty() {
            out.push_str(&doc.body);
            out.push_str("\n\n");
        }
    }
    out.push_str(&render_blocks(&blocks, &settings.header_label));

    match &document {
        Some(doc) => out.push_str(doc.footer.trim_end()),
        None => {
            let (prev, next) = adjacent_date_labels(date, settings.month_boundary);
            out.push_str(&format!("\n{}\n[[{prev}]] | [[{next}]]", settings.delimiter));
        }
    }

    out
}

/// Local midnight of `date`, used as the page's modification time so that
/// sorting by mtime follows diary dates.
fn local_midnight(date: NaiveDate, zone: Tz) -> Option<SystemTime> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    zone.from_local_datetime(&midnight)
        .earliest()
        .map(SystemTime::from)
}

/// Replaces the page at `path` with `content`.
///
/// The content goes to a `.tmp` sibling first, is synced, gets its timestamps
/// pinned to local midnight of `date`, and is then renamed over `path`.  A
/// failure at any point leaves the previous page untouched.
pub fn write_page(path: &Path, content: &str, date: NaiveDate, zone: Tz) -> Result<()> {
    let tmp_path = {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "page".to_string());
        path.with_file_name(format!("{filename}.tmp"))
    };

    let write_result = (|| -> io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        file.sync_all()?;
        match local_midnight(date, zone) {
            Some(midnight) => {
                file.set_times(
                    FileTimes::new()
                        .set_accessed(midnight)
                        .set_modified(midnight),
                )?;
            }
            None => warn!(%date, "no local midnight for date — keeping write time as mtime"),
        }
        Ok(())
    })();

    let result = write_result.and_then(|()| fs::rename(&tmp_path, path));
    if let Err(source) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(DiaryError::WritePage {
            path: path.to_path_buf(),
            date,
            source,
        });
    }

    Ok(())
}

/// Merges `events` into the page for `date` inside `folder` and returns the
/// page's file name.
pub fn merge_into_folder(
    folder: &Path,
    date: NaiveDate,
    events: &[Event],
    settings: &DiarySettings,
) -> Result<String> {
    let file_name = page_file_name(date, &settings.extension);
    let path: PathBuf = folder.join(&file_name);

    let existing = match fs::read_to_string(&path) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(source) => return Err(DiaryError::ReadPage { path, date, source }),
    };
    let created = existing.is_none();

    let content = merge_page(existing.as_deref(), date, events, settings);
    write_page(&path, &content, date, settings.zone)?;

    info!(
        page = %path.display(),
        %date,
        entries = events.len(),
        created,
        "diary page updated"
    );
    Ok(file_name)
}
