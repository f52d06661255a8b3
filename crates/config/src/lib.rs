use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Navigation policy ─────────────────────────────────────────────────────────

/// How the previous/next links of a new diary page behave at month edges.
///
/// | Policy  | Behaviour                                                        |
/// |---------|------------------------------------------------------------------|
/// | `clamp` | Links never leave the month: day 1 points back to itself, the last day points forward to itself. |
/// | `cross` | Plain calendar arithmetic (March 1 links back to February 28/29). |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonthBoundary {
    #[default]
    Clamp,
    Cross,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiaryConfig {
    /// IANA timezone name (e.g. `"Asia/Kolkata"`, `"Europe/London"`).
    /// Decides which calendar day an entry belongs to and how time headers read.
    /// Falls back to UTC when the name is unrecognised.
    pub timezone: String,
    /// Prefix of the time-header lines written into diary pages.
    pub header_label: String,
    /// A new time header is started when an entry arrives more than this many
    /// seconds after the current header.
    pub gap_threshold_secs: u64,
    /// Line separating the page body from its navigation footer.
    pub delimiter: String,
    /// File extension of diary pages, without the dot.
    pub extension: String,
    pub month_boundary: MonthBoundary,
    /// Named flush targets.  Each name becomes an `/update_<name>` command.
    pub targets: BTreeMap<String, String>,
}

impl Default for DiaryConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Kolkata".to_string(),
            header_label: "Neram:".to_string(),
            gap_threshold_secs: 900,
            delimiter: "---".to_string(),
            extension: "md".to_string(),
            month_boundary: MonthBoundary::Clamp,
            targets: BTreeMap::from([("pc".to_string(), "diary".to_string())]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// The one chat the bot serves; the bot will not start without it.
    /// Messages from any other chat are ignored.  Can also be set via
    /// `DIARIST_CHAT_ID` (env takes precedence).
    pub allowed_chat_id: Option<i64>,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
    /// Downloaded photos land here.
    pub attachments_dir: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            allowed_chat_id: None,
            poll_timeout_secs: 25,
            attachments_dir: "diary/attachments".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Directory for the daily-rolling log file.  `None` logs to stderr only.
    pub log_dir: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Exclusive lock held while the bot runs, so only one process owns the
    /// in-memory buffers.
    pub lock_file: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lock_file: ".diarist/diarist.lock".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub diary: DiaryConfig,
    pub telegram: TelegramConfig,
    pub telemetry: TelemetryConfig,
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("DIARIST_TIMEZONE") {
            if !value.trim().is_empty() {
                config.diary.timezone = value.trim().to_string();
            }
        }

        if let Ok(value) = env::var("DIARIST_CHAT_ID") {
            if let Ok(chat_id) = value.trim().parse::<i64>() {
                config.telegram.allowed_chat_id = Some(chat_id);
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Folder configured for a flush target, matched case-insensitively.
    pub fn target_path(&self, name: &str) -> Option<&str> {
        self.diary
            .targets
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, path)| path.as_str())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
