//! Capability traits the reporter depends on.
//!
//! Paste hosts and chat services live behind these ports; adapter crates
//! implement them.

use async_trait::async_trait;

use crate::{notification::Notification, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasteVisibility {
    Public,
    Unlisted,
    Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasteExpiration {
    Never,
    OneDay,
    OneMonth,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasteRequest {
    pub title: String,
    pub content: String,
    pub visibility: PasteVisibility,
    pub expiration: PasteExpiration,
}

/// Uploads a payload to a paste host and returns its URL.
#[async_trait]
pub trait ArchiveUploader: Send + Sync {
    async fn upload(&self, paste: &PasteRequest) -> Result<String>;
}

/// Delivers an operator-facing notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Largest file the channel accepts in a single message.
    fn max_attachment_bytes(&self) -> usize;

    async fn send(&self, notification: &Notification) -> Result<()>;
}
