//! Discord adapter (report channel notifications).
//!
//! Posts an embed to `POST {api}/channels/{id}/messages`. Messages without a
//! file go out as JSON; with a file the embed travels as `payload_json` next
//! to a `files[0]` multipart part.

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Serialize;
use tokio::time::sleep;

use frp_core::{
    config::DiscordConfig,
    errors::Error,
    notification::{Attachment, Notification},
    ports::Notifier,
    Result,
};

/// Upload limit for bots in an unboosted guild.
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 8 * 1024 * 1024;

const MAX_RETRIES: usize = 1;

#[derive(Debug, Serialize)]
struct EmbedAuthor<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct EmbedField<'a> {
    name: &'a str,
    value: &'a str,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    color: u32,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<EmbedAuthor<'a>>,
    fields: Vec<EmbedField<'a>>,
}

#[derive(Debug, Serialize)]
struct AttachmentRef<'a> {
    id: u32,
    filename: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    embeds: Vec<Embed<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentRef<'a>>,
}

impl<'a> MessagePayload<'a> {
    fn from_notification(n: &'a Notification) -> Self {
        let embed = Embed {
            title: &n.title,
            url: n.url.as_deref(),
            color: n.color,
            timestamp: n.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            author: n.author.as_ref().map(|a| EmbedAuthor {
                name: &a.name,
                icon_url: a.icon_url.as_deref(),
            }),
            fields: n
                .fields
                .iter()
                .map(|f| EmbedField {
                    name: &f.name,
                    value: &f.value,
                    inline: false,
                })
                .collect(),
        };
        Self {
            content: n.content.as_deref(),
            embeds: vec![embed],
            attachments: n
                .attachment
                .iter()
                .map(|a| AttachmentRef {
                    id: 0,
                    filename: &a.file_name,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DiscordNotifier {
    cfg: DiscordConfig,
    http: reqwest::Client,
    max_attachment_bytes: usize,
}

impl DiscordNotifier {
    pub fn new(cfg: DiscordConfig, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build");
        Self {
            cfg,
            http,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }

    /// Override the upload limit (boosted guilds allow more).
    pub fn with_max_attachment_bytes(mut self, limit: usize) -> Self {
        self.max_attachment_bytes = limit;
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/channels/{}/messages",
            self.cfg.api_base.trim_end_matches('/'),
            self.cfg.channel_id
        )
    }

    fn request(
        &self,
        payload: &MessagePayload<'_>,
        attachment: Option<&Attachment>,
    ) -> Result<reqwest::RequestBuilder> {
        let req = self
            .http
            .post(self.messages_url())
            .header("Authorization", format!("Bot {}", self.cfg.bot_token));

        let Some(file) = attachment else {
            return Ok(req.json(payload));
        };

        let payload_json = serde_json::to_string(payload)?;
        let form = reqwest::multipart::Form::new()
            .part(
                "payload_json",
                reqwest::multipart::Part::text(payload_json)
                    .mime_str("application/json")
                    .map_err(|e| Error::External(format!("discord multipart error: {e}")))?,
            )
            .part(
                "files[0]",
                reqwest::multipart::Part::bytes(file.data.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(mime_for(&file.file_name))
                    .map_err(|e| Error::External(format!("discord multipart error: {e}")))?,
            );
        Ok(req.multipart(form))
    }
}

fn mime_for(file_name: &str) -> &'static str {
    if file_name.ends_with(".zip") {
        "application/zip"
    } else {
        "text/plain"
    }
}

/// Longest rate-limit wait honoured for the single retry.
const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);
const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(1);

/// Seconds to wait from a 429 body (`{"retry_after": 1.5, ...}`), capped.
fn retry_after(body: &str) -> Duration {
    let secs = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("retry_after").and_then(|r| r.as_f64()));
    match secs {
        Some(s) if s >= 0.0 => Duration::try_from_secs_f64(s)
            .unwrap_or(MAX_RETRY_WAIT)
            .min(MAX_RETRY_WAIT),
        _ => DEFAULT_RETRY_WAIT,
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn max_attachment_bytes(&self) -> usize {
        self.max_attachment_bytes
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = MessagePayload::from_notification(notification);
        let mut attempts = 0usize;
        loop {
            // Multipart forms are single-use; rebuild per attempt.
            let resp = self
                .request(&payload, notification.attachment.as_ref())?
                .send()
                .await
                .map_err(|e| Error::External(format!("discord request error: {e}")))?;

            let status = resp.status();
            if status.is_success() {
                tracing::debug!(title = %notification.title, "report posted to discord");
                return Ok(());
            }

            let body = resp.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS && attempts < MAX_RETRIES {
                attempts += 1;
                let wait = retry_after(&body);
                tracing::warn!(?wait, "discord rate limited; retrying");
                sleep(wait).await;
                continue;
            }

            return Err(Error::External(format!(
                "discord error: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }
    }
}
