//! The mutable record threaded through one pipeline run.

use crate::{
    codec::{self, HeaderFlag, HeaderFlags},
    domain::Fault,
    errors::ReportError,
    identifier::generate_identifier,
};

/// Pipeline position of a packet. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Created,
    Encrypting,
    Uploading,
    SkipUpload,
    Notifying,
    Done,
}

/// Failures recorded per stage. Any subset may be populated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageFailures {
    pub encryption: Option<ReportError>,
    pub encoding: Option<ReportError>,
    pub archive: Option<ReportError>,
    pub notification: Option<ReportError>,
    pub unknown: Vec<ReportError>,
}

impl StageFailures {
    /// Route `err` to the slot matching its variant.
    pub fn record(&mut self, err: ReportError) {
        match err {
            ReportError::Encryption(_) => self.encryption = Some(err),
            ReportError::Encoding(_) => self.encoding = Some(err),
            ReportError::Pastebin(_) => self.archive = Some(err),
            ReportError::Notification(_) => self.notification = Some(err),
            ReportError::Unknown(_) => self.unknown.push(err),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.encryption.is_none()
            && self.encoding.is_none()
            && self.archive.is_none()
            && self.notification.is_none()
            && self.unknown.is_empty()
    }

    /// All recorded failures in stage order, each with a short description of
    /// what the pipeline was doing.
    pub fn labelled(&self) -> Vec<(&'static str, &ReportError)> {
        let mut out = Vec::new();
        if let Some(e) = &self.encryption {
            out.push(("encrypting the data", e));
        }
        if let Some(e) = &self.encoding {
            out.push(("encoding the encrypted data", e));
        }
        if let Some(e) = &self.archive {
            out.push(("uploading the data", e));
        }
        if let Some(e) = &self.notification {
            out.push(("reporting to the notification channel", e));
        }
        for e in &self.unknown {
            out.push(("doing something unexpected", e));
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct ReportPacket {
    fault: Fault,
    captured_at_millis: u64,
    plaintext: String,
    title_prefix: String,
    upload_data: Vec<u8>,
    identifier: String,
    // Changes only together with `upload_data`.
    flags: HeaderFlags,
    pub archive_url: Option<String>,
    pub failures: StageFailures,
    pub stage: Stage,
}

impl ReportPacket {
    pub fn new(fault: Fault, captured_at_millis: u64, title_prefix: &str) -> Self {
        let plaintext = fault.render_trace();
        let upload_data = plaintext.as_bytes().to_vec();
        let identifier = generate_identifier(title_prefix, captured_at_millis, &upload_data);
        Self {
            fault,
            captured_at_millis,
            plaintext,
            title_prefix: title_prefix.to_string(),
            upload_data,
            identifier,
            flags: HeaderFlags::empty(),
            archive_url: None,
            failures: StageFailures::default(),
            stage: Stage::Created,
        }
    }

    pub fn fault(&self) -> &Fault {
        &self.fault
    }

    pub fn captured_at_millis(&self) -> u64 {
        self.captured_at_millis
    }

    pub fn plaintext(&self) -> &str {
        &self.plaintext
    }

    pub fn plaintext_bytes(&self) -> &[u8] {
        self.plaintext.as_bytes()
    }

    pub fn upload_data(&self) -> &[u8] {
        &self.upload_data
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(HeaderFlag::Encrypted)
    }

    /// Replace the payload with plain (unencrypted) bytes.
    ///
    /// Clears the `encrypted` flag; the identifier is recomputed.
    pub fn set_upload_data(&mut self, data: Vec<u8>) {
        self.flags.remove(HeaderFlag::Encrypted);
        self.replace_upload_data(data);
    }

    /// Drop back to the raw plaintext and clear the `encrypted` flag.
    pub fn reset_to_plaintext(&mut self) {
        let raw = self.plaintext.as_bytes().to_vec();
        self.set_upload_data(raw);
    }

    /// Store `ciphertext` as an encoded payload and mark the packet encrypted.
    pub(crate) fn set_encrypted_payload(&mut self, ciphertext: &[u8]) {
        self.flags.insert(HeaderFlag::Encrypted);
        let payload = codec::encode_payload(self.flags, ciphertext);
        self.replace_upload_data(payload);
    }

    fn replace_upload_data(&mut self, data: Vec<u8>) {
        self.upload_data = data;
        self.identifier = generate_identifier(
            &self.title_prefix,
            self.captured_at_millis,
            &self.upload_data,
        );
    }

    pub(crate) fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "{:?} -> {next:?}", self.stage);
        tracing::debug!(identifier = %self.identifier, from = ?self.stage, to = ?next, "report stage");
        self.stage = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> ReportPacket {
        ReportPacket::new(Fault::new("TestError", "boom"), 1_000, "AppErr")
    }

    #[test]
    fn starts_with_plaintext_payload() {
        let p = packet();
        assert_eq!(p.upload_data(), p.plaintext_bytes());
        assert_eq!(p.plaintext(), "TestError: boom\n");
        assert!(!p.is_encrypted());
        assert_eq!(p.stage, Stage::Created);
    }

    #[test]
    fn identifier_follows_upload_data() {
        let mut p = packet();
        let before = p.identifier().to_string();
        p.set_upload_data(b"something else".to_vec());
        assert_ne!(p.identifier(), before);
        assert_eq!(
            p.identifier(),
            generate_identifier("AppErr", 1_000, b"something else")
        );

        p.reset_to_plaintext();
        assert_eq!(p.identifier(), before);
    }

    #[test]
    fn encrypted_flag_travels_with_encoded_payload() {
        let mut p = packet();
        p.set_encrypted_payload(b"sealed");
        assert!(p.is_encrypted());
        let (flags, body) = codec::split_payload(p.upload_data()).unwrap();
        assert_eq!(flags, p.flags());
        assert_eq!(body, b"sealed");
        assert_eq!(
            p.identifier(),
            generate_identifier("AppErr", 1_000, p.upload_data())
        );

        // Any plain payload drops the flag.
        p.set_upload_data(b"diagnostics".to_vec());
        assert!(!p.is_encrypted());
        assert!(p.flags().is_empty());

        p.set_encrypted_payload(b"sealed");
        p.reset_to_plaintext();
        assert!(!p.is_encrypted());
        assert_eq!(p.upload_data(), p.plaintext_bytes());
    }

    #[test]
    fn failures_route_to_their_slots() {
        let mut f = StageFailures::default();
        assert!(f.is_empty());
        f.record(ReportError::Encryption("e".to_string()));
        f.record(ReportError::Pastebin("p".to_string()));
        f.record(ReportError::Unknown("u1".to_string()));
        f.record(ReportError::Unknown("u2".to_string()));
        assert!(f.encryption.is_some());
        assert!(f.archive.is_some());
        assert!(f.notification.is_none());
        assert_eq!(f.unknown.len(), 2);
        assert_eq!(f.labelled().len(), 4);
    }
}
