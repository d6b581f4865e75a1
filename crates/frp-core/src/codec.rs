//! Header flag codec and archive payload framing.
//!
//! Payload layout: `base64url(header) '.' base64url(body)`. The separator is
//! outside the URL-safe alphabet, so a reader can split without a length prefix.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};

use crate::errors::ReportError;

/// Byte separating the encoded header from the encoded body.
pub const HEADER_SEPARATOR: u8 = b'.';

/// Flags describing how a payload must be interpreted.
///
/// The discriminant is the bit ordinal on the wire; never reorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeaderFlag {
    Encrypted = 0,
}

impl HeaderFlag {
    pub const ALL: [HeaderFlag; 1] = [HeaderFlag::Encrypted];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    fn bit(self) -> u64 {
        1 << self.ordinal()
    }
}

/// Set of [`HeaderFlag`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct HeaderFlags(u64);

impl HeaderFlags {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, flag: HeaderFlag) {
        self.0 |= flag.bit();
    }

    pub fn remove(&mut self, flag: HeaderFlag) {
        self.0 &= !flag.bit();
    }

    pub fn contains(&self, flag: HeaderFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = HeaderFlag> + '_ {
        HeaderFlag::ALL.into_iter().filter(|f| self.contains(*f))
    }
}

impl FromIterator<HeaderFlag> for HeaderFlags {
    fn from_iter<I: IntoIterator<Item = HeaderFlag>>(iter: I) -> Self {
        let mut flags = HeaderFlags::empty();
        for f in iter {
            flags.insert(f);
        }
        flags
    }
}

fn header_len() -> usize {
    HeaderFlag::ALL.len().div_ceil(8)
}

/// Encode `flags` as base64url of the packed bit header.
///
/// Flag `n` is bit `0x80 >> (n % 8)` of byte `n / 8`.
pub fn encode_header(flags: HeaderFlags) -> Vec<u8> {
    let mut header = vec![0u8; header_len()];
    for flag in flags.iter() {
        let ordinal = flag.ordinal();
        header[ordinal / 8] |= 0x80 >> (ordinal % 8);
    }
    URL_SAFE.encode(header).into_bytes()
}

/// Decode a base64url header. Unknown bits are logged and ignored.
pub fn decode_header(encoded: &[u8]) -> Result<HeaderFlags, ReportError> {
    let decoded = URL_SAFE
        .decode(encoded)
        .map_err(|e| ReportError::Encoding(format!("invalid header base64: {e}")))?;

    let mut flags = HeaderFlags::empty();
    for (i, byte) in decoded.iter().enumerate() {
        for j in 0..8 {
            if byte & (0x80 >> j) == 0 {
                continue;
            }
            let ordinal = i * 8 + j;
            match HeaderFlag::from_ordinal(ordinal) {
                Some(flag) => flags.insert(flag),
                None => tracing::warn!(
                    ordinal,
                    "unrecognized header flag; either this build is out of date or the payload is malformed"
                ),
            }
        }
    }
    Ok(flags)
}

/// Build an archive payload from flags and raw (not yet encoded) body bytes.
pub fn encode_payload(flags: HeaderFlags, body: &[u8]) -> Vec<u8> {
    let header = encode_header(flags);
    let body = URL_SAFE.encode(body);
    let mut out = Vec::with_capacity(header.len() + 1 + body.len());
    out.extend_from_slice(&header);
    out.push(HEADER_SEPARATOR);
    out.extend_from_slice(body.as_bytes());
    out
}

/// Split an archive payload into its flags and decoded body.
pub fn split_payload(payload: &[u8]) -> Result<(HeaderFlags, Vec<u8>), ReportError> {
    let trimmed = trim_ascii_whitespace(payload);
    let pos = trimmed
        .iter()
        .position(|b| *b == HEADER_SEPARATOR)
        .ok_or_else(|| ReportError::Encoding("payload has no header separator".to_string()))?;
    let flags = decode_header(&trimmed[..pos])?;
    let body = URL_SAFE
        .decode(&trimmed[pos + 1..])
        .map_err(|e| ReportError::Encoding(format!("invalid body base64: {e}")))?;
    Ok((flags, body))
}

fn trim_ascii_whitespace(mut b: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = b {
        if !first.is_ascii_whitespace() {
            break;
        }
        b = rest;
    }
    while let [rest @ .., last] = b {
        if !last.is_ascii_whitespace() {
            break;
        }
        b = rest;
    }
    b
}
