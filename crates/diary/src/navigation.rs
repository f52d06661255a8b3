use chrono::{Datelike, NaiveDate};

use diarist_config::MonthBoundary;

/// `March5'25`: full month name, unpadded day, two-digit year.
pub fn date_label(date: NaiveDate) -> String {
    format!(
        "{}{}'{:02}",
        date.format("%B"),
        date.day(),
        date.year().rem_euclid(100)
    )
}

/// File name of the page for `date`, e.g. `March5'25.md`.
pub fn page_file_name(date: NaiveDate, extension: &str) -> String {
    if extension.is_empty() {
        date_label(date)
    } else {
        format!("{}.{extension}", date_label(date))
    }
}

/// Labels of the previous and next day pages.
///
/// With [`MonthBoundary::Clamp`] neither link leaves the month of `date`; the
/// first day links back to itself and the last day links forward to itself.
pub fn adjacent_date_labels(date: NaiveDate, policy: MonthBoundary) -> (String, String) {
    let prev = date.pred_opt().unwrap_or(date);
    let next = date.succ_opt().unwrap_or(date);

    let (prev, next) = match policy {
        MonthBoundary::Cross => (prev, next),
        MonthBoundary::Clamp => (
            if prev.month() == date.month() { prev } else { date },
            if next.month() == date.month() { next } else { date },
        ),
    };

    (date_label(prev), date_label(next))
}
