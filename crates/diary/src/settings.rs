use chrono::TimeDelta;
use chrono_tz::Tz;
use tracing::warn;

use diarist_config::{DiaryConfig, MonthBoundary};

/// Page format and grouping parameters, resolved from [`DiaryConfig`].
#[derive(Debug, Clone)]
pub struct DiarySettings {
    pub zone: Tz,
    pub header_label: String,
    pub gap_threshold: TimeDelta,
    pub delimiter: String,
    pub extension: String,
    pub month_boundary: MonthBoundary,
}

impl Default for DiarySettings {
    fn default() -> Self {
        Self::from_config(&DiaryConfig::default())
    }
}

impl DiarySettings {
    pub fn from_config(config: &DiaryConfig) -> Self {
        let zone: Tz = config.timezone.parse().unwrap_or_else(|_| {
            warn!(tz = %config.timezone, "unrecognised timezone — falling back to UTC");
            chrono_tz::UTC
        });

        let delimiter = if config.delimiter.trim().is_empty() {
            warn!("empty page delimiter configured — using ---");
            "---".to_string()
        } else {
            config.delimiter.trim().to_string()
        };

        let gap_secs = i64::try_from(config.gap_threshold_secs).unwrap_or(i64::MAX / 1_000);

        Self {
            zone,
            header_label: config.header_label.trim().to_string(),
            gap_threshold: TimeDelta::try_seconds(gap_secs).unwrap_or(TimeDelta::MAX),
            delimiter,
            extension: config.extension.trim_start_matches('.').to_string(),
            month_boundary: config.month_boundary,
        }
    }
}
