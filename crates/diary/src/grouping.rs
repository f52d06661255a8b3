use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;

use crate::event::{Event, ImageEvent, TextEvent};

/// Events that fall on one local calendar day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayBucket {
    pub texts: Vec<TextEvent>,
    pub images: Vec<ImageEvent>,
}

impl DayBucket {
    pub fn len(&self) -> usize {
        self.texts.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.images.is_empty()
    }

    /// Texts and images interleaved by timestamp.  The sort is stable, so
    /// simultaneous events keep texts ahead of images and their append order.
    pub fn into_sorted_events(self) -> Vec<Event> {
        let mut events = self
            .texts
            .into_iter()
            .map(Event::Text)
            .chain(self.images.into_iter().map(Event::Image))
            .collect::<Vec<_>>();
        events.sort_by_key(Event::timestamp);
        events
    }
}

pub fn local_date(timestamp: &DateTime<FixedOffset>, zone: Tz) -> NaiveDate {
    timestamp.with_timezone(&zone).date_naive()
}

/// Buckets events by their calendar date in `zone`.  Iterating the map yields
/// days in ascending order.
pub fn group_by_local_date(
    texts: &[TextEvent],
    images: &[ImageEvent],
    zone: Tz,
) -> BTreeMap<NaiveDate, DayBucket> {
    let mut days: BTreeMap<NaiveDate, DayBucket> = BTreeMap::new();
    for text in texts {
        days.entry(local_date(&text.timestamp, zone))
            .or_default()
            .texts
            .push(text.clone());
    }
    for image in images {
        days.entry(local_date(&image.timestamp, zone))
            .or_default()
            .images
            .push(image.clone());
    }
    days
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::DateTime;
    use chrono_tz::Asia::Kolkata;

    use super::*;
    use crate::event::ConversationId;

    fn text(body: &str, at: &str) -> TextEvent {
        TextEvent {
            conversation: ConversationId::from("G1"),
            text: body.to_string(),
            timestamp: DateTime::parse_from_rfc3339(at).unwrap(),
        }
    }

    fn image(path: &str, at: &str) -> ImageEvent {
        ImageEvent {
            conversation: ConversationId::from("G1"),
            image_path: PathBuf::from(path),
            timestamp: DateTime::parse_from_rfc3339(at).unwrap(),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn utc_evening_lands_on_the_next_local_day() {
        // 19:00 UTC on March 5 is 00:30 on March 6 in Kolkata.
        let texts = [
            text("late", "2025-03-05T19:00:00+00:00"),
            text("early", "2025-03-05T10:00:00+00:00"),
        ];
        let days = group_by_local_date(&texts, &[], Kolkata);
        assert_eq!(days.len(), 2);
        assert_eq!(days[&day(2025, 3, 5)].texts[0].text, "early");
        assert_eq!(days[&day(2025, 3, 6)].texts[0].text, "late");
    }

    #[test]
    fn days_iterate_in_ascending_order() {
        let texts = [
            text("c", "2025-03-09T09:00:00+05:30"),
            text("a", "2025-02-27T09:00:00+05:30"),
        ];
        let images = [image("b.jpg", "2025-03-01T09:00:00+05:30")];
        let days = group_by_local_date(&texts, &images, Kolkata)
            .into_keys()
            .collect::<Vec<_>>();
        assert_eq!(days, vec![day(2025, 2, 27), day(2025, 3, 1), day(2025, 3, 9)]);
    }

    #[test]
    fn bucket_events_are_sorted_by_time() {
        let texts = [
            text("second", "2025-03-05T13:40:00+05:30"),
            text("first", "2025-03-05T13:05:00+05:30"),
        ];
        let images = [
            image("photo.jpg", "2025-03-05T13:20:00+05:30"),
            image("tie.jpg", "2025-03-05T13:40:00+05:30"),
        ];
        let mut days = group_by_local_date(&texts, &images, Kolkata);
        let bucket = days.remove(&day(2025, 3, 5)).unwrap();
        assert_eq!(bucket.len(), 4);

        let order = bucket
            .into_sorted_events()
            .into_iter()
            .map(|event| match event {
                Event::Text(text) => text.text,
                Event::Image(image) => image.file_name(),
            })
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["first", "photo.jpg", "second", "tie.jpg"]);
    }
}
