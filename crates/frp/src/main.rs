mod cli;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;

use frp_core::{
    cipher::{AesGcmCipher, Cipher, Keyset},
    codec::{self, HeaderFlag},
    config::Config,
    domain::Fault,
    errors::Error,
    Reporter, Result,
};
use frp_discord::DiscordNotifier;
use frp_pastebin::PastebinClient;
use frp_telegram::TelegramNotifier;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    frp_core::logging::init("frp")?;

    match Cli::parse().command {
        Commands::Report { kind, message } => {
            let cfg = Config::load()?;
            report(&cfg, &kind, &message.join(" ")).await
        }
        Commands::Decode { path } => {
            let cfg = Config::load()?;
            decode(&cfg, &path)
        }
        Commands::Keygen { path } => keygen(&path),
    }
}

fn load_cipher(path: &Path) -> Result<AesGcmCipher> {
    AesGcmCipher::from_keyset(&Keyset::load(path)?)
}

fn build_reporter(cfg: &Config) -> Result<Reporter> {
    let mut builder = Reporter::builder().config(cfg.reporter_config());

    if let Some(path) = &cfg.keyset_path {
        builder = builder.cipher(load_cipher(path)?);
    } else {
        tracing::warn!("REPORT_KEYSET_PATH not set; reports will not be archived");
    }

    if let Some(pb) = &cfg.pastebin {
        builder = builder.archive(Arc::new(PastebinClient::new(pb.clone(), cfg.http_timeout)));
    }

    if let Some(dc) = &cfg.discord {
        let mut notifier = DiscordNotifier::new(dc.clone(), cfg.http_timeout);
        if let Some(limit) = cfg.attachment_limit_bytes {
            notifier = notifier.with_max_attachment_bytes(limit);
        }
        builder = builder.notifier(Arc::new(notifier));
    } else if let Some(tg) = &cfg.telegram {
        let mut notifier = TelegramNotifier::from_config(tg);
        if let Some(limit) = cfg.attachment_limit_bytes {
            notifier = notifier.with_max_attachment_bytes(limit);
        }
        builder = builder.notifier(Arc::new(notifier));
    } else {
        tracing::warn!(
            path = %cfg.fallback_log_path.display(),
            "no notification channel configured; reports go to the fallback log"
        );
    }

    Ok(builder.build())
}

async fn report(cfg: &Config, kind: &str, message: &str) -> Result<()> {
    let reporter = build_reporter(cfg)?;
    let packet = reporter.report(Fault::new(kind, message)).packet().await?;
    // Self-reports may still be in flight.
    reporter.drain().await;

    println!("{}", packet.identifier());
    if let Some(url) = &packet.archive_url {
        println!("{url}");
    }
    for (doing, err) in packet.failures.labelled() {
        eprintln!("while {doing}: {err}");
    }
    Ok(())
}

fn decode(cfg: &Config, path: &Path) -> Result<()> {
    let payload = std::fs::read(path)?;
    let (flags, body) =
        codec::split_payload(&payload).map_err(|e| Error::External(e.to_string()))?;

    let plaintext = if flags.contains(HeaderFlag::Encrypted) {
        let keyset_path: &PathBuf = cfg.keyset_path.as_ref().ok_or_else(|| {
            Error::Config("payload is encrypted; set REPORT_KEYSET_PATH".to_string())
        })?;
        load_cipher(keyset_path)?.decrypt(&body)?
    } else {
        body
    };

    print!("{}", String::from_utf8_lossy(&plaintext));
    Ok(())
}

fn keygen(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::Config(format!(
            "{} already exists; refusing to overwrite a keyset",
            path.display()
        )));
    }
    Keyset::generate().save(path)?;
    tracing::info!(path = %path.display(), "keyset written");
    Ok(())
}
