use std::path::PathBuf;

/// Core error type for the fault report pipeline.
///
/// Adapter crates map their transport errors into this type. Stage outcomes
/// recorded on a packet use [`ReportError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("invalid keyset: {path}: {reason}")]
    InvalidKeyset { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single pipeline stage.
///
/// Each variant maps to one independent slot of
/// [`StageFailures`](crate::packet::StageFailures); a single run can record
/// several of them at once.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("pastebin upload failed: {0}")]
    Pastebin(String),

    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("{0}")]
    Unknown(String),
}

impl ReportError {
    /// Short type label used in rendered fields and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Encryption(_) => "EncryptionError",
            ReportError::Encoding(_) => "EncodingError",
            ReportError::Pastebin(_) => "PastebinError",
            ReportError::Notification(_) => "NotificationError",
            ReportError::Unknown(_) => "UnknownError",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ReportError::Encryption(s)
            | ReportError::Encoding(s)
            | ReportError::Pastebin(s)
            | ReportError::Notification(s)
            | ReportError::Unknown(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_error_kind_and_detail() {
        let e = ReportError::Pastebin("Bad API request, invalid api_dev_key".to_string());
        assert_eq!(e.kind(), "PastebinError");
        assert_eq!(e.detail(), "Bad API request, invalid api_dev_key");
        assert!(e.to_string().starts_with("pastebin upload failed"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
    }
}
