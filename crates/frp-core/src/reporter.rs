//! Fault report orchestration.
//!
//! A [`Reporter`] owns every piece of shared pipeline state: the cipher, the
//! self-report cooldown and the injected archive/notification clients. Each
//! call to [`Reporter::report`] runs on its own task:
//!
//! `Created -> Encrypting -> (Uploading | SkipUpload) -> Notifying -> Done`
//!
//! Stage failures are recorded on the packet and never abort the run.

use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::{
    cipher::Cipher,
    compress::{plan_attachment, AttachmentPlan, TEXT_EXTENSION, ZIP_EXTENSION},
    cooldown::CooldownGate,
    domain::Fault,
    errors::{Error, ReportError},
    fallback_log::FallbackLog,
    identifier::DEFAULT_PREFIX,
    notification::{
        build_notification, diagnostic_document, unconfigured_document, Attachment,
        TOO_LARGE_NOTICE,
    },
    packet::{ReportPacket, Stage},
    ports::{ArchiveUploader, Notifier, PasteExpiration, PasteRequest, PasteVisibility},
    Result,
};

pub const DEFAULT_ENCRYPTION_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct ReporterConfig {
    pub title_prefix: String,
    /// How long a self-report about broken encryption suppresses the next one.
    pub encryption_cooldown: Duration,
    pub fallback_log: FallbackLog,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            title_prefix: DEFAULT_PREFIX.to_string(),
            encryption_cooldown: DEFAULT_ENCRYPTION_COOLDOWN,
            fallback_log: FallbackLog::new(PathBuf::from("/tmp/frp-fallback.log"), false),
        }
    }
}

#[derive(Default)]
pub struct ReporterBuilder {
    cfg: ReporterConfig,
    cipher: Option<Box<dyn Cipher>>,
    archive: Option<Arc<dyn ArchiveUploader>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ReporterBuilder {
    pub fn config(mut self, cfg: ReporterConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn cipher(mut self, cipher: impl Cipher + 'static) -> Self {
        self.cipher = Some(Box::new(cipher));
        self
    }

    pub fn archive(mut self, archive: Arc<dyn ArchiveUploader>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Reporter {
        let cooldown = CooldownGate::new(self.cfg.encryption_cooldown);
        Reporter {
            inner: Arc::new(ReporterInner {
                cfg: self.cfg,
                cipher: self.cipher.map(std::sync::Mutex::new),
                archive: self.archive,
                notifier: self.notifier,
                cooldown,
                tracker: TaskTracker::new(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct Reporter {
    inner: Arc<ReporterInner>,
}

struct ReporterInner {
    cfg: ReporterConfig,
    // The cipher is not safe for concurrent use; every seal goes through here.
    cipher: Option<std::sync::Mutex<Box<dyn Cipher>>>,
    archive: Option<Arc<dyn ArchiveUploader>>,
    notifier: Option<Arc<dyn Notifier>>,
    cooldown: CooldownGate,
    tracker: TaskTracker,
}

/// Handle to an in-flight report. Dropping it does not cancel the run.
pub struct ReportHandle(JoinHandle<ReportPacket>);

impl ReportHandle {
    /// Wait for the run to finish and return its packet.
    pub async fn packet(self) -> Result<ReportPacket> {
        self.0
            .await
            .map_err(|e| Error::External(format!("report task failed: {e}")))
    }
}

impl Reporter {
    pub fn builder() -> ReporterBuilder {
        ReporterBuilder::default()
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.inner.cfg
    }

    fn archiving_enabled(&self) -> bool {
        self.inner.cipher.is_some() && self.inner.archive.is_some()
    }

    /// Submit a fault. Must be called from within a tokio runtime.
    pub fn report(&self, fault: Fault) -> ReportHandle {
        let captured_at = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let packet = ReportPacket::new(fault, captured_at, &self.inner.cfg.title_prefix);
        let this = self.clone();
        ReportHandle(
            self.inner
                .tracker
                .spawn(async move { this.process(packet).await }),
        )
    }

    /// Convenience for reporting any error value.
    pub fn report_error(
        &self,
        kind: &str,
        err: &(dyn std::error::Error + 'static),
    ) -> ReportHandle {
        self.report(Fault::from_error(kind, err))
    }

    /// Wait until every in-flight report, self-reports included, has finished.
    pub async fn drain(&self) {
        let tracker = &self.inner.tracker;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }

    async fn process(&self, mut packet: ReportPacket) -> ReportPacket {
        let Some(notifier) = self.inner.notifier.clone() else {
            tracing::error!(
                identifier = %packet.identifier(),
                fault = %packet.fault(),
                "no notification channel configured; keeping fault report local"
            );
            if let Err(e) = self.inner.cfg.fallback_log.write_packet(&packet) {
                tracing::error!(error = %e, "failed to write fallback log");
            }
            packet.advance(Stage::Done);
            return packet;
        };

        tracing::warn!(identifier = %packet.identifier(), fault = %packet.fault(), "reporting fault");

        match (&self.inner.cipher, &self.inner.archive) {
            (Some(cipher), Some(archive)) => {
                packet.advance(Stage::Encrypting);
                match self.encrypt(cipher, &mut packet).await {
                    Ok(()) => {
                        packet.advance(Stage::Uploading);
                        if let Err(e) = upload(archive.as_ref(), &mut packet).await {
                            tracing::warn!(identifier = %packet.identifier(), error = %e, "archive upload failed");
                            packet.failures.record(e);
                        }
                    }
                    Err(e) => {
                        packet.failures.record(e);
                        packet.advance(Stage::SkipUpload);
                    }
                }
            }
            _ => packet.advance(Stage::SkipUpload),
        }

        packet.advance(Stage::Notifying);
        self.notify(notifier.as_ref(), &mut packet).await;
        packet.advance(Stage::Done);
        packet
    }

    async fn encrypt(
        &self,
        cipher: &std::sync::Mutex<Box<dyn Cipher>>,
        packet: &mut ReportPacket,
    ) -> std::result::Result<(), ReportError> {
        let sealed = match cipher.lock() {
            Ok(mut c) => c.encrypt(packet.plaintext_bytes()),
            Err(_) => Err(Error::Crypto("cipher lock poisoned".to_string())),
        };

        let sealed = match sealed {
            Ok(v) => v,
            Err(e) => {
                packet.reset_to_plaintext();
                let err = ReportError::Encryption(e.to_string());
                tracing::warn!(identifier = %packet.identifier(), error = %err, "encryption failed");
                self.report_encryption_trouble(&err).await;
                return Err(err);
            }
        };

        packet.set_encrypted_payload(&sealed);
        Ok(())
    }

    /// Self-report a broken cipher at most once per cooldown window.
    async fn report_encryption_trouble(&self, err: &ReportError) {
        if !self.inner.cooldown.try_acquire().await {
            tracing::debug!("encryption trouble already reported within the cooldown window");
            return;
        }
        let fault = Fault::new("EncryptionError", "Error while trying to encrypt message!")
            .with_cause(Fault::new(err.kind(), err.detail()));
        // Tracked by `drain`; nobody waits on the handle.
        let _ = self.report(fault);
    }

    /// Decide what file (if any) accompanies the notification.
    ///
    /// Returns `false` when the archive URL already carries the report.
    fn prepare_payload(&self, packet: &mut ReportPacket) -> bool {
        if packet.archive_url.is_some() {
            return false;
        }
        if !self.archiving_enabled() {
            let doc = unconfigured_document(packet.plaintext());
            packet.set_upload_data(doc.into_bytes());
            return true;
        }
        if packet.failures.encryption.is_some() {
            // Already the raw plaintext.
            return true;
        }
        if packet.failures.archive.is_none() && packet.failures.unknown.is_empty() {
            packet.failures.record(ReportError::Unknown(
                "archive URL is missing, yet no stage failures were recorded".to_string(),
            ));
        }
        let doc = diagnostic_document(packet);
        packet.set_upload_data(doc.into_bytes());
        true
    }

    async fn notify(&self, notifier: &dyn Notifier, packet: &mut ReportPacket) {
        let mut attachment = None;
        let mut content = None;

        if self.prepare_payload(packet) {
            let entry_name = format!("{}{TEXT_EXTENSION}", packet.identifier());
            match plan_attachment(
                &entry_name,
                packet.upload_data(),
                notifier.max_attachment_bytes(),
            ) {
                Ok(AttachmentPlan::Plain) => {
                    attachment = Some(Attachment {
                        file_name: entry_name,
                        data: packet.upload_data().to_vec(),
                    });
                }
                Ok(AttachmentPlan::Compressed(zipped)) => {
                    packet.set_upload_data(zipped);
                    attachment = Some(Attachment {
                        file_name: format!("{}{ZIP_EXTENSION}", packet.identifier()),
                        data: packet.upload_data().to_vec(),
                    });
                }
                Ok(AttachmentPlan::TooLarge) => {
                    packet.failures.record(ReportError::Unknown(
                        "the report is too large to post to the notification channel, despite attempts to compress"
                            .to_string(),
                    ));
                    content = Some(TOO_LARGE_NOTICE.to_string());
                }
                Err(e) => {
                    packet.failures.record(e);
                    content = Some(TOO_LARGE_NOTICE.to_string());
                }
            }
        }

        let mut notification = build_notification(packet);
        notification.attachment = attachment;
        notification.content = content;

        if let Err(e) = notifier.send(&notification).await {
            // The notification channel is the recursion target; never recurse here.
            packet
                .failures
                .record(ReportError::Notification(e.to_string()));
            if let Err(log_err) = self.inner.cfg.fallback_log.write_packet(packet) {
                tracing::error!(error = %log_err, "failed to write fallback log");
            }
        }
    }
}

async fn upload(
    archive: &dyn ArchiveUploader,
    packet: &mut ReportPacket,
) -> std::result::Result<(), ReportError> {
    let paste = PasteRequest {
        title: packet.identifier().to_string(),
        content: String::from_utf8_lossy(packet.upload_data()).into_owned(),
        visibility: PasteVisibility::Private,
        expiration: PasteExpiration::Never,
    };
    let url = archive
        .upload(&paste)
        .await
        .map_err(|e| ReportError::Pastebin(e.to_string()))?;
    tracing::info!(identifier = %packet.identifier(), url = %url, "fault archived");
    packet.archive_url = Some(url);
    Ok(())
}
