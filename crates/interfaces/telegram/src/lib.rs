use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use diarist_config::AppConfig;
use diarist_diary::{ConversationId, DiaryWriter};

const API_ROOT: &str = "https://api.telegram.org";
const PHOTO_FAILED_REPLY: &str = "Error: could not save the photo, please send it again.";

#[derive(Clone)]
struct Bot {
    client: Client,
    base_url: String,
    file_url: String,
    chat_id: i64,
    writer: Arc<DiaryWriter>,
    config: Arc<AppConfig>,
}

pub async fn start_bot(writer: Arc<DiaryWriter>, config: AppConfig) -> Result<()> {
    let token = std::env::var("TELEGRAM_BOT_TOKEN")
        .map_err(|_| anyhow::anyhow!("TELEGRAM_BOT_TOKEN is not set"))?;
    if token.trim().is_empty() {
        bail!("TELEGRAM_BOT_TOKEN is empty");
    }
    let bot = Bot::new(writer, config, token.trim(), API_ROOT)?;

    let me = bot.get_me().await.context("bot token check failed")?;
    info!(
        username = me.username.as_deref().unwrap_or("(unknown)"),
        chat = bot.chat_id,
        "telegram bot connected, listening for updates"
    );

    let mut offset: i64 = 0;
    loop {
        let updates = match bot.fetch_updates(offset).await {
            Ok(u) => u,
            Err(err) => {
                let status = err
                    .downcast_ref::<reqwest::Error>()
                    .and_then(reqwest::Error::status);
                if status == Some(StatusCode::CONFLICT) {
                    // Another poller holds the token; back off.
                    warn!("409 Conflict: another bot instance is running; waiting 15s before retrying");
                    tokio::time::sleep(Duration::from_secs(15)).await;
                } else {
                    warn!(error = %format!("{err:#}"), "getUpdates failed, retrying in 5s");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                continue;
            }
        };

        if !updates.is_empty() {
            debug!(count = updates.len(), "received updates");
        }
        for update in updates {
            offset = update.update_id + 1;
            let Some(message) = update.message else {
                continue;
            };
            bot.handle_message(message).await;
        }
    }
}

/// reqwest errors print the request URL, and every Bot API URL carries the
/// token.
fn scrub(err: reqwest::Error) -> anyhow::Error {
    anyhow::Error::new(err.without_url())
}

impl Bot {
    /// Fails when no chat id is configured; the bot only ever serves one chat.
    fn new(
        writer: Arc<DiaryWriter>,
        config: AppConfig,
        token: &str,
        api_root: &str,
    ) -> Result<Self> {
        let Some(chat_id) = config.telegram.allowed_chat_id else {
            bail!("no chat configured: set telegram.allowed_chat_id or DIARIST_CHAT_ID");
        };

        // Requests must outlive the long-poll window.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.telegram.poll_timeout_secs + 15))
            .build()
            .map_err(scrub)?;
        Ok(Self {
            client,
            base_url: format!("{api_root}/bot{token}"),
            file_url: format!("{api_root}/file/bot{token}"),
            chat_id,
            writer,
            config: Arc::new(config),
        })
    }

    async fn handle_message(&self, message: TelegramMessage) {
        let chat_id = message.chat.id;
        if chat_id != self.chat_id {
            debug!(chat_id, "ignoring message from another chat");
            return;
        }

        let Some(timestamp) = message_timestamp(message.date) else {
            warn!(chat_id, date = message.date, "message date out of range, dropped");
            return;
        };

        if let Some(text) = message.text {
            let line = normalize_telegram_command(&text);
            if line.starts_with('/') {
                let reply = self.handle_command(chat_id, &line).await;
                self.reply(chat_id, &reply).await;
            } else {
                self.writer.buffer().add_text(chat_id, text, timestamp).await;
            }
            return;
        }

        // Telegram lists photo sizes smallest first.
        if let Some(photo) = message.photo.as_ref().and_then(|sizes| sizes.last()) {
            let bot = self.clone();
            let file_id = photo.file_id.clone();
            let message_id = message.message_id;
            tokio::spawn(async move {
                bot.save_photo(chat_id, &file_id, message_id, timestamp).await;
            });
        }
    }

    async fn save_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        message_id: i64,
        timestamp: DateTime<Utc>,
    ) {
        match self.download_photo(file_id, message_id, timestamp).await {
            Ok(path) => {
                info!(chat_id, path = %path.display(), "photo saved");
                self.writer.buffer().add_image(chat_id, path, timestamp).await;
            }
            Err(err) => {
                error!(chat_id, error = %format!("{err:#}"), "photo download failed");
                self.reply(chat_id, PHOTO_FAILED_REPLY).await;
            }
        }
    }

    async fn handle_command(&self, chat_id: i64, line: &str) -> String {
        match parse_command(line) {
            BotCommand::Help => help_text(&self.config),
            BotCommand::Status => {
                let stats = self
                    .writer
                    .buffer()
                    .stats(&ConversationId::from(chat_id))
                    .await;
                [
                    format!("buffered text entries: {}", stats.texts),
                    format!("buffered images: {}", stats.images),
                    format!("timezone: {}", self.writer.settings().zone),
                ]
                .join("\n")
            }
            BotCommand::Update(target) => {
                let Some(folder) = self.config.target_path(target) else {
                    return format!("unknown target `{target}`. use /help");
                };
                info!(chat_id, target_name = target, folder, "flush command received");
                match self
                    .writer
                    .flush(&ConversationId::from(chat_id), folder)
                    .await
                {
                    Ok(outcome) => outcome.reply(),
                    Err(err) => {
                        error!(chat_id, target_name = target, error = %err, "flush failed; buffer kept for retry");
                        format!("Error: {err}")
                    }
                }
            }
            BotCommand::Unknown => "unknown command. use /help".to_string(),
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(err) = self.send_message(chat_id, text).await {
            warn!(chat_id, error = %format!("{err:#}"), "sendMessage failed");
        }
    }

    /// Sends a Bot API request and unwraps the `{ok, result}` envelope.
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder, method: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(scrub)?
            .error_for_status()
            .map_err(scrub)?;
        let payload: TelegramResponse<T> = response.json().await.map_err(scrub)?;
        payload.into_result(&format!("telegram {method} failed"))
    }

    async fn get_me(&self) -> Result<TelegramUser> {
        let request = self.client.get(format!("{}/getMe", self.base_url));
        self.call(request, "getMe").await
    }

    async fn fetch_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        let request = self
            .client
            .get(format!("{}/getUpdates", self.base_url))
            .query(&[
                ("timeout", self.config.telegram.poll_timeout_secs.to_string()),
                ("offset", offset.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ]);
        self.call(request, "getUpdates").await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = SendMessageRequest {
            chat_id,
            text,
            disable_web_page_preview: true,
        };
        let request = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&body);
        self.call::<serde_json::Value>(request, "sendMessage").await?;
        Ok(())
    }

    /// Downloads a photo into the attachments folder and returns its path.
    async fn download_photo(
        &self,
        file_id: &str,
        message_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let request = self
            .client
            .get(format!("{}/getFile", self.base_url))
            .query(&[("file_id", file_id)]);
        let remote_path = self
            .call::<TelegramFile>(request, "getFile")
            .await?
            .file_path
            .context("telegram getFile returned no file_path")?;

        let bytes = self
            .client
            .get(format!("{}/{remote_path}", self.file_url))
            .send()
            .await
            .map_err(scrub)?
            .error_for_status()
            .map_err(scrub)?
            .bytes()
            .await
            .map_err(scrub)?;

        let dir = Path::new(&self.config.telegram.attachments_dir);
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create attachments folder {}", dir.display()))?;
        let local = timestamp.with_timezone(&self.writer.settings().zone);
        let stamp = local.format("%Y%m%d_%H%M%S").to_string();
        let path = dir.join(attachment_file_name(&remote_path, message_id, &stamp));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("write photo {}", path.display()))?;
        Ok(path)
    }
}

fn message_timestamp(unix_seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(unix_seconds, 0)
}

/// `image_<local time>_<message id>.<remote extension or jpg>`.
fn attachment_file_name(remote_path: &str, message_id: i64, local_stamp: &str) -> String {
    let extension = Path::new(remote_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("jpg");
    format!("image_{local_stamp}_{message_id}.{extension}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BotCommand<'a> {
    Help,
    Status,
    Update(&'a str),
    Unknown,
}

fn parse_command(line: &str) -> BotCommand<'_> {
    match line {
        "/start" | "/help" => BotCommand::Help,
        "/status" => BotCommand::Status,
        _ => match line.strip_prefix("/update_") {
            Some(target) if !target.is_empty() && !target.contains(char::is_whitespace) => {
                BotCommand::Update(target)
            }
            _ => BotCommand::Unknown,
        },
    }
}

fn help_text(config: &AppConfig) -> String {
    let mut lines = vec!["Send text or photos; they are buffered until you save.".to_string()];
    lines.push(String::new());
    for (name, folder) in &config.diary.targets {
        lines.push(format!("/update_{name} — save buffered entries to {folder}"));
    }
    lines.push("/status — show what is buffered".to_string());
    lines.push("/help".to_string());
    lines.join("\n")
}


fn normalize_telegram_command(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return trimmed.to_string();
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim();

    let command = command
        .split_once('@')
        .map(|(base, _)| base)
        .unwrap_or(command);

    if rest.is_empty() {
        command.to_string()
    } else {
        format!("{command} {rest}")
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> TelegramResponse<T> {
    fn into_result(self, fallback: &str) -> Result<T> {
        if !self.ok {
            bail!(self.description.unwrap_or_else(|| fallback.to_string()));
        }
        self.result.with_context(|| fallback.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    date: i64,
    chat: TelegramChat,
    text: Option<String>,
    photo: Option<Vec<TelegramPhotoSize>>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramPhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}
