//! Telegram adapter (teloxide).
//!
//! Implements the `frp-core` [`Notifier`] port over the Telegram Bot API. The
//! summary is rendered as HTML and sent as a message, or as the caption of the
//! attached document when it fits.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InputFile, ParseMode},
};

use tokio::time::sleep;

pub mod html;

use html::escape_html;

use frp_core::{
    config::TelegramConfig, errors::Error, notification::Notification, ports::Notifier, Result,
};

/// Bot API upload limit for documents.
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 50 * 1024 * 1024;

const MAX_CAPTION_CHARS: usize = 1024;

/// How one notification maps onto Bot API calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    Message,
    CaptionedDocument,
    /// Summary too long for a caption; the file follows on its own.
    MessageThenDocument,
}

fn plan_delivery(summary_html: &str, has_attachment: bool) -> Delivery {
    if !has_attachment {
        Delivery::Message
    } else if summary_html.chars().count() <= MAX_CAPTION_CHARS {
        Delivery::CaptionedDocument
    } else {
        Delivery::MessageThenDocument
    }
}

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
    max_attachment_bytes: usize,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat_id: i64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }

    pub fn from_config(cfg: &TelegramConfig) -> Self {
        Self::new(Bot::new(cfg.bot_token.clone()), cfg.chat_id)
    }

    pub fn with_max_attachment_bytes(mut self, limit: usize) -> Self {
        self.max_attachment_bytes = limit;
        self
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::warn!(wait = ?d, "telegram rate limited; retrying");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn max_attachment_bytes(&self) -> usize {
        self.max_attachment_bytes
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let text = html::render_notification(notification);
        let delivery = plan_delivery(&text, notification.attachment.is_some());

        if delivery != Delivery::CaptionedDocument {
            self.with_retry(|| {
                self.bot
                    .send_message(self.chat_id, text.clone())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
            })
            .await?;
        }

        if let Some(file) = &notification.attachment {
            let caption = match delivery {
                Delivery::CaptionedDocument => text.clone(),
                _ => escape_html(&notification.title),
            };
            self.with_retry(|| {
                self.bot
                    .send_document(
                        self.chat_id,
                        InputFile::memory(file.data.clone()).file_name(file.file_name.clone()),
                    )
                    .caption(caption.clone())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        }

        tracing::debug!(title = %notification.title, "report posted to telegram");
        Ok(())
    }
}
