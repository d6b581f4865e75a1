use crate::{errors::Error, Result};

/// Initialize tracing for the reporter.
///
/// Defaults to `info` for our crates and `warn` for everything else; `RUST_LOG`
/// overrides.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,frp=info,frp_core=info,frp_discord=info,frp_pastebin=info,frp_telegram=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))
}
