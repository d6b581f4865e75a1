//! Single-entry zip compression for oversized attachments.

use std::io::{Cursor, Write};

use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::errors::ReportError;

pub const TEXT_EXTENSION: &str = ".txt";
pub const ZIP_EXTENSION: &str = ".zip";

/// Zip `data` as a single deflated entry named `entry_name`.
pub fn zip_single_entry(entry_name: &str, data: &[u8]) -> Result<Vec<u8>, ReportError> {
    let map_err = |e: zip::result::ZipError| ReportError::Unknown(format!("zip error: {e}"));

    let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zw.start_file(entry_name, options).map_err(map_err)?;
    zw.write_all(data)
        .map_err(|e| ReportError::Unknown(format!("zip write error: {e}")))?;
    let cursor = zw.finish().map_err(map_err)?;
    Ok(cursor.into_inner())
}

/// What to attach for a payload of a given size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentPlan {
    /// Fits as-is.
    Plain,
    /// Fits once compressed; carries the zip bytes.
    Compressed(Vec<u8>),
    /// Too large even compressed.
    TooLarge,
}

/// Decide how to attach `data` under `limit` bytes.
///
/// Payloads at or below the limit are attached untouched. Larger ones are
/// zipped under `entry_name`; if the archive still exceeds the limit nothing
/// can be attached.
pub fn plan_attachment(
    entry_name: &str,
    data: &[u8],
    limit: usize,
) -> Result<AttachmentPlan, ReportError> {
    if data.len() <= limit {
        return Ok(AttachmentPlan::Plain);
    }
    let zipped = zip_single_entry(entry_name, data)?;
    if zipped.len() > limit {
        tracing::debug!(
            original = data.len(),
            compressed = zipped.len(),
            limit,
            "attachment too large even after compression"
        );
        return Ok(AttachmentPlan::TooLarge);
    }
    Ok(AttachmentPlan::Compressed(zipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn noise(len: usize) -> Vec<u8> {
        // xorshift64; incompressible enough for deflate.
        let mut x = 0x9E37_79B9_7F4A_7C15u64;
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                x as u8
            })
            .collect()
    }

    #[test]
    fn zip_contains_single_named_entry() {
        let zipped = zip_single_entry("AppErr:1-2.txt", b"hello hello hello").unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(zipped)).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "AppErr:1-2.txt");
        let mut out = String::new();
        entry.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello hello hello");
    }

    #[test]
    fn below_and_at_limit_are_not_compressed() {
        let limit = 1024;
        let below = vec![b'a'; limit - 1];
        let at = vec![b'a'; limit];
        assert_eq!(
            plan_attachment("x.txt", &below, limit).unwrap(),
            AttachmentPlan::Plain
        );
        assert_eq!(
            plan_attachment("x.txt", &at, limit).unwrap(),
            AttachmentPlan::Plain
        );
    }

    #[test]
    fn above_limit_is_compressed() {
        let limit = 1024;
        let above = vec![b'a'; limit + 1];
        match plan_attachment("x.txt", &above, limit).unwrap() {
            AttachmentPlan::Compressed(zipped) => assert!(zipped.len() <= limit),
            other => panic!("expected compression, got {other:?}"),
        }
    }

    #[test]
    fn incompressible_payload_is_too_large() {
        let limit = 1024;
        let data = noise(limit * 4);
        assert_eq!(
            plan_attachment("x.txt", &data, limit).unwrap(),
            AttachmentPlan::TooLarge
        );
    }
}
