//! Local sink for reports that could not reach the notification channel.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{packet::ReportPacket, Result};

#[derive(Clone, Debug, Serialize)]
pub struct FallbackEntry {
    pub timestamp: String,
    pub identifier: String,
    pub stage: String,
    pub fault: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
    pub encrypted: bool,
    pub failures: Vec<String>,
}

impl FallbackEntry {
    pub fn from_packet(packet: &ReportPacket) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            identifier: packet.identifier().to_string(),
            stage: format!("{:?}", packet.stage),
            fault: packet.plaintext().to_string(),
            archive_url: packet.archive_url.clone(),
            encrypted: packet.is_encrypted(),
            failures: packet
                .failures
                .labelled()
                .into_iter()
                .map(|(doing, e)| format!("while {doing}: {e}"))
                .collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FallbackLog {
    path: PathBuf,
    json: bool,
}

impl FallbackLog {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the full packet. Also emitted at `error` level.
    pub fn write_packet(&self, packet: &ReportPacket) -> Result<()> {
        let entry = FallbackEntry::from_packet(packet);
        tracing::error!(
            identifier = %entry.identifier,
            failures = ?entry.failures,
            fault = %entry.fault,
            "fault report kept locally"
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&entry)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));
        out.push_str(&format!(
            "\ntimestamp: {}\nidentifier: {}\nstage: {}\nencrypted: {}",
            entry.timestamp, entry.identifier, entry.stage, entry.encrypted
        ));
        if let Some(url) = &entry.archive_url {
            out.push_str(&format!("\narchive_url: {url}"));
        }
        for f in &entry.failures {
            out.push_str("\nfailure: ");
            out.push_str(f);
        }
        out.push_str("\nfault:\n");
        out.push_str(&entry.fault);

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::Fault, errors::ReportError};

    fn packet() -> ReportPacket {
        let mut p = ReportPacket::new(Fault::new("Boom", "bad"), 7, "AppErr");
        p.failures
            .record(ReportError::Notification("channel missing".to_string()));
        p
    }

    #[test]
    fn json_lines_carry_fault_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let log = FallbackLog::new(dir.path().join("fallback.log"), true);
        log.write_packet(&packet()).unwrap();
        log.write_packet(&packet()).unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["fault"], "Boom: bad\n");
        assert!(v["failures"][0]
            .as_str()
            .unwrap()
            .contains("channel missing"));
        assert!(v.get("archive_url").is_none());
    }

    #[test]
    fn plain_format_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let log = FallbackLog::new(dir.path().join("fallback.log"), false);
        log.write_packet(&packet()).unwrap();
        let written = std::fs::read_to_string(log.path()).unwrap();
        assert!(written.contains("failure: while reporting to the notification channel"));
        assert!(written.ends_with("fault:\nBoom: bad\n"));
    }
}
