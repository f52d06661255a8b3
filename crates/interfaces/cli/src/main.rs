mod backfill;
mod instance;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use diarist_config::{AppConfig, TelemetryConfig};
use diarist_diary::{
    ConversationId, DiarySettings, DiaryWriter, IngestionBuffer, adjacent_date_labels,
    page_file_name,
};
use diarist_telegram::start_bot;

#[derive(Debug, Parser)]
#[command(
    name = "diarist",
    version,
    about = "Collects Telegram messages and photos into daily Markdown diary pages"
)]
struct Cli {
    /// Config file to load (missing file means defaults).
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the Telegram bot (default).
    Telegram,
    /// Write a config file with default settings.
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Import a JSONL file of entries into a target folder.
    Backfill {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Target name from `[diary.targets]`.
        #[arg(long, default_value = "pc")]
        target: String,
        #[arg(long, default_value = "backfill")]
        conversation: String,
    },
    /// Show the page name and navigation links for a date (YYYY-MM-DD).
    Labels {
        #[arg(value_name = "DATE")]
        date: NaiveDate,
    },
}

fn init_tracing(telemetry: &TelemetryConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&telemetry.log_level));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match &telemetry.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "diarist.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(file_writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

fn build_writer(config: &AppConfig) -> DiaryWriter {
    DiaryWriter::new(
        Arc::new(IngestionBuffer::new()),
        DiarySettings::from_config(&config.diary),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    let _log_guard = init_tracing(&config.telemetry);

    match cli.command.unwrap_or(Commands::Telegram) {
        Commands::Telegram => {
            let _lock = instance::acquire_lock(Path::new(&config.runtime.lock_file))?;
            let writer = Arc::new(build_writer(&config));
            info!(
                timezone = %writer.settings().zone,
                targets = config.diary.targets.len(),
                "starting diarist"
            );

            let result = tokio::select! {
                result = start_bot(Arc::clone(&writer), config) => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    Ok(())
                }
            };
            // lock file drop releases the OS lock automatically.
            result?;
        }
        Commands::Init { force } => {
            if cli.config.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    cli.config.display()
                );
            }
            AppConfig::default().save_to(&cli.config)?;
            println!("wrote {}", cli.config.display());
        }
        Commands::Backfill {
            file,
            target,
            conversation,
        } => {
            let Some(folder) = config.target_path(&target).map(PathBuf::from) else {
                let known = config.diary.targets.keys().cloned().collect::<Vec<_>>();
                bail!("unknown target `{target}` (configured: {})", known.join(", "));
            };
            let _lock = instance::acquire_lock(Path::new(&config.runtime.lock_file))?;
            let writer = build_writer(&config);
            backfill::run_backfill(&writer, &ConversationId::from(conversation), &file, &folder)
                .await?;
        }
        Commands::Labels { date } => {
            let settings = DiarySettings::from_config(&config.diary);
            let (prev, next) = adjacent_date_labels(date, settings.month_boundary);
            println!("page     : {}", page_file_name(date, &settings.extension));
            println!("previous : {prev}");
            println!("next     : {next}");
        }
    }

    Ok(())
}
