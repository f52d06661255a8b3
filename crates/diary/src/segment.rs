use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;

use crate::event::Event;

/// One rendered unit of a page section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Header(DateTime<Tz>),
    Text(String),
    Image(String),
}

/// Walks `events` (sorted ascending) and starts a new time header whenever an
/// event lands more than `threshold` after the current header.
///
/// `seed` is the last header already present on the page, if any.  Without a
/// seed the first event always gets a header.
pub fn segment_events(
    events: &[Event],
    seed: Option<DateTime<Tz>>,
    zone: Tz,
    threshold: TimeDelta,
) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(events.len() * 2);
    let mut current = seed;

    for event in events {
        let local = event.timestamp().with_timezone(&zone);
        let needs_header = match current {
            None => true,
            Some(header) => local.signed_duration_since(header) > threshold,
        };
        if needs_header {
            blocks.push(Block::Header(local));
            current = Some(local);
        }

        blocks.push(match event {
            Event::Text(text) => Block::Text(text.text.clone()),
            Event::Image(image) => Block::Image(image.file_name()),
        });
    }

    blocks
}

/// Headers are followed by a single newline, entries by a blank line.
pub fn render_blocks(blocks: &[Block], header_label: &str) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            Block::Header(at) => {
                out.push_str(&format!("{header_label} {}\n", at.format("%I:%M %p")));
            }
            Block::Text(text) => {
                out.push_str(text);
                out.push_str("\n\n");
            }
            Block::Image(name) => {
                out.push_str(&format!("![[{name}]]\n\n"));
            }
        }
    }
    out
}
