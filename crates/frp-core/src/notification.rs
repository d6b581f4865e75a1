//! Operator-facing notification model and rendering.

use chrono::{DateTime, Utc};

use crate::{domain::Fault, errors::ReportError, packet::ReportPacket};

pub const ERROR_COLOR: u32 = 0xff0000;
pub const MAX_FIELD_MESSAGE_LEN: usize = 128;
pub const MAX_CAUSES: usize = 3;

pub const TOO_LARGE_NOTICE: &str = "A fault was encountered, and it's too large to post to the notification channel. Check the logs.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationAuthor {
    pub name: String,
    pub icon_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub url: Option<String>,
    pub color: u32,
    pub timestamp: DateTime<Utc>,
    pub author: Option<NotificationAuthor>,
    pub fields: Vec<NotificationField>,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
}

impl Notification {
    fn push_field(&mut self, name: &str, value: String) {
        self.fields.push(NotificationField {
            name: name.to_string(),
            value,
        });
    }
}

/// `**<kind>**\n<message>` with the message capped.
pub fn field_message(kind: &str, message: Option<&str>) -> String {
    let message = match message {
        Some(m) if !m.is_empty() => cap_message(m),
        _ => "No message given.".to_string(),
    };
    format!("**{kind}**\n{message}")
}

fn cap_message(m: &str) -> String {
    if m.chars().count() <= MAX_FIELD_MESSAGE_LEN {
        return m.to_string();
    }
    let mut out: String = m.chars().take(MAX_FIELD_MESSAGE_LEN - 3).collect();
    out.push_str("...");
    out
}

fn fault_field(f: &Fault) -> String {
    field_message(f.kind(), f.message())
}

fn report_error_field(e: &ReportError) -> String {
    field_message(e.kind(), Some(e.detail()))
}

fn capture_time(millis: u64) -> DateTime<Utc> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

/// Render the summary for `packet`. The attachment is decided separately.
pub fn build_notification(packet: &ReportPacket) -> Notification {
    let fault = packet.fault();
    let mut n = Notification {
        title: packet.identifier().to_string(),
        url: packet.archive_url.clone(),
        color: ERROR_COLOR,
        timestamp: capture_time(packet.captured_at_millis()),
        author: fault.context().map(|ctx| NotificationAuthor {
            name: ctx.attribution(),
            icon_url: ctx.avatar_url.clone(),
        }),
        fields: Vec::new(),
        content: None,
        attachment: None,
    };

    if let Some(err) = &packet.failures.encryption {
        n.push_field("Encryption:", report_error_field(err));
    }
    match &packet.failures.archive {
        Some(err) => {
            n.push_field("Pastebin:", report_error_field(err));
            n.push_field("Original:", fault_field(fault));
        }
        None => n.push_field("Exception:", fault_field(fault)),
    }

    let mut causes = fault.causes();
    for cause in causes.by_ref().take(MAX_CAUSES) {
        n.push_field("Caused by:", fault_field(cause));
    }
    if causes.next().is_some() {
        n.push_field("Caused by:", "**Etc...**".to_string());
    }

    n
}

fn indent(text: &str, prefix: &str) -> String {
    let mut out = String::from(prefix);
    out.push_str(&text.trim_end().replace('\n', &format!("\n{prefix}")));
    out
}

/// Attachment body when no encryptor or archive client is configured.
pub fn unconfigured_document(plaintext: &str) -> String {
    format!(
        "The following fault has been encountered and reported. The reporting pipeline has no configured encryptor or archive service.\n{}\n",
        indent(plaintext, "\t")
    )
}

/// Attachment body listing every recorded stage failure, then the fault.
pub fn diagnostic_document(packet: &ReportPacket) -> String {
    let mut out = String::from(
        "The following errors were encountered while attempting to prepare and upload a fault report:\n\n",
    );
    for (doing, err) in packet.failures.labelled() {
        out.push_str(&format!(
            "\tThe following was encountered while {doing}:\n{}\n\n",
            indent(&format!("{}: {}", err.kind(), err.detail()), "\t\t")
        ));
    }
    out.push_str(
        "The preceding errors were encountered while attempting to prepare and upload the following fault:\n",
    );
    out.push_str(&indent(packet.plaintext(), "\t"));
    out.push('\n');
    out
}
