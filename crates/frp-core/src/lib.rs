//! Asynchronous fault reporting pipeline.
//!
//! A captured fault is encrypted, archived to a paste host and announced in an
//! operator chat channel, degrading stage by stage when any service fails.
//! Paste hosts and chat services live behind ports (traits) implemented in
//! adapter crates.

pub mod cipher;
pub mod codec;
pub mod compress;
pub mod config;
pub mod cooldown;
pub mod domain;
pub mod errors;
pub mod fallback_log;
pub mod identifier;
pub mod logging;
pub mod notification;
pub mod packet;
pub mod ports;
pub mod reporter;

pub use errors::{Error, ReportError, Result};
pub use reporter::{ReportHandle, Reporter, ReporterBuilder, ReporterConfig};
