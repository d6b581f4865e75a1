use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    errors::Error, fallback_log::FallbackLog, identifier::DEFAULT_PREFIX,
    reporter::ReporterConfig, Result,
};

#[derive(Clone, Debug)]
pub struct PastebinConfig {
    pub dev_key: String,
    pub username: String,
    pub password: String,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub bot_token: String,
    pub channel_id: u64,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

/// Typed configuration for the reporting pipeline.
///
/// Every external service is optional; missing pieces switch the matching
/// stage off rather than failing startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub title_prefix: String,
    pub keyset_path: Option<PathBuf>,
    pub pastebin: Option<PastebinConfig>,
    pub discord: Option<DiscordConfig>,
    pub telegram: Option<TelegramConfig>,

    /// Overrides the notifier's own attachment limit.
    pub attachment_limit_bytes: Option<usize>,
    pub encryption_cooldown: Duration,
    pub http_timeout: Duration,

    pub fallback_log_path: PathBuf,
    pub fallback_log_json: bool,
}

impl Config {
    /// Load from the process environment (plus `.env`, which never overrides).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let title_prefix = get("REPORT_TITLE_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        if title_prefix.contains(':') {
            return Err(Error::Config(
                "REPORT_TITLE_PREFIX must not contain ':'".to_string(),
            ));
        }

        let keyset_path = get("REPORT_KEYSET_PATH").map(PathBuf::from);

        let pastebin = match (
            get("PASTEBIN_DEV_KEY"),
            get("PASTEBIN_USERNAME"),
            get("PASTEBIN_PASSWORD"),
        ) {
            (Some(dev_key), Some(username), Some(password)) => Some(PastebinConfig {
                dev_key,
                username,
                password,
                api_base: get("PASTEBIN_API_BASE")
                    .unwrap_or_else(|| "https://pastebin.com".to_string()),
            }),
            (None, None, None) => None,
            _ => {
                return Err(Error::Config(
                    "PASTEBIN_DEV_KEY, PASTEBIN_USERNAME and PASTEBIN_PASSWORD must be set together"
                        .to_string(),
                ))
            }
        };

        let discord = match (get("DISCORD_BOT_TOKEN"), get("DISCORD_REPORT_CHANNEL_ID")) {
            (Some(bot_token), Some(channel)) => Some(DiscordConfig {
                bot_token,
                channel_id: parse_num(&channel, "DISCORD_REPORT_CHANNEL_ID")?,
                api_base: get("DISCORD_API_BASE")
                    .unwrap_or_else(|| "https://discord.com/api/v10".to_string()),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "DISCORD_BOT_TOKEN and DISCORD_REPORT_CHANNEL_ID must be set together"
                        .to_string(),
                ))
            }
        };

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_REPORT_CHAT_ID")) {
            (Some(bot_token), Some(chat)) => Some(TelegramConfig {
                bot_token,
                chat_id: parse_num(&chat, "TELEGRAM_REPORT_CHAT_ID")?,
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "TELEGRAM_BOT_TOKEN and TELEGRAM_REPORT_CHAT_ID must be set together"
                        .to_string(),
                ))
            }
        };

        let attachment_limit_bytes = get("REPORT_ATTACHMENT_LIMIT_BYTES")
            .map(|v| parse_num(&v, "REPORT_ATTACHMENT_LIMIT_BYTES"))
            .transpose()?;
        let encryption_cooldown = Duration::from_secs(
            get("ENCRYPTION_COOLDOWN_SECS")
                .map(|v| parse_num(&v, "ENCRYPTION_COOLDOWN_SECS"))
                .transpose()?
                .unwrap_or(300),
        );
        let http_timeout = Duration::from_secs(
            get("HTTP_TIMEOUT_SECS")
                .map(|v| parse_num(&v, "HTTP_TIMEOUT_SECS"))
                .transpose()?
                .unwrap_or(10),
        );

        let fallback_log_path = PathBuf::from(
            get("FALLBACK_LOG_PATH").unwrap_or_else(|| "/tmp/frp-fallback.log".to_string()),
        );
        let fallback_log_json = get("FALLBACK_LOG_JSON")
            .map(|s| parse_bool(&s))
            .unwrap_or(false);

        Ok(Self {
            title_prefix,
            keyset_path,
            pastebin,
            discord,
            telegram,
            attachment_limit_bytes,
            encryption_cooldown,
            http_timeout,
            fallback_log_path,
            fallback_log_json,
        })
    }

    pub fn reporter_config(&self) -> ReporterConfig {
        ReporterConfig {
            title_prefix: self.title_prefix.clone(),
            encryption_cooldown: self.encryption_cooldown,
            fallback_log: FallbackLog::new(self.fallback_log_path.clone(), self.fallback_log_json),
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_num<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{key} must be a number, got {raw:?}")))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
