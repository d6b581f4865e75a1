//! Pastebin adapter (archive uploads).
//!
//! Implements the `frp-core` [`ArchiveUploader`] port over the Pastebin
//! `api_login.php` / `api_post.php` form endpoints.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use frp_core::{
    config::PastebinConfig,
    errors::Error,
    ports::{ArchiveUploader, PasteExpiration, PasteRequest, PasteVisibility},
    Result,
};

const BAD_REQUEST_PREFIX: &str = "Bad API request";
const INVALID_USER_KEY: &str = "invalid api_user_key";

pub struct PastebinClient {
    cfg: PastebinConfig,
    http: reqwest::Client,
    user_key: RwLock<Option<String>>,
    // Serializes logins; the key itself is read without it.
    login_lock: Mutex<()>,
}

impl PastebinClient {
    pub fn new(cfg: PastebinConfig, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build");
        Self {
            cfg,
            http,
            user_key: RwLock::new(None),
            login_lock: Mutex::new(()),
        }
    }

    fn endpoint(&self, script: &str) -> String {
        format!("{}/api/{script}", self.cfg.api_base.trim_end_matches('/'))
    }

    async fn post_form(&self, script: &str, form: &[(&str, &str)]) -> Result<String> {
        let resp = self
            .http
            .post(self.endpoint(script))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::External(format!("pastebin request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("pastebin read error: {e}")))?;
        let body = body.trim().to_string();

        if !status.is_success() {
            return Err(Error::External(format!(
                "pastebin {script} failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        if body.starts_with(BAD_REQUEST_PREFIX) {
            return Err(Error::External(format!("pastebin {script}: {body}")));
        }
        Ok(body)
    }

    async fn fetch_user_key(&self) -> Result<String> {
        tracing::debug!(username = %self.cfg.username, "logging in to pastebin");
        let key = self
            .post_form(
                "api_login.php",
                &[
                    ("api_dev_key", self.cfg.dev_key.as_str()),
                    ("api_user_name", self.cfg.username.as_str()),
                    ("api_user_password", self.cfg.password.as_str()),
                ],
            )
            .await?;
        if key.is_empty() {
            return Err(Error::External(
                "pastebin login returned an empty session key".to_string(),
            ));
        }
        Ok(key)
    }

    /// Cached session key, logging in at most once across concurrent callers.
    pub async fn user_key(&self) -> Result<String> {
        if let Some(key) = self.user_key.read().await.as_ref() {
            return Ok(key.clone());
        }

        let _guard = self.login_lock.lock().await;
        // Another caller may have logged in while we waited.
        if let Some(key) = self.user_key.read().await.as_ref() {
            return Ok(key.clone());
        }

        let key = self.fetch_user_key().await?;
        *self.user_key.write().await = Some(key.clone());
        Ok(key)
    }

    async fn forget_user_key(&self) {
        tracing::warn!("pastebin session key rejected; it will be refreshed on the next upload");
        *self.user_key.write().await = None;
    }
}

fn visibility_code(v: PasteVisibility) -> &'static str {
    match v {
        PasteVisibility::Public => "0",
        PasteVisibility::Unlisted => "1",
        PasteVisibility::Private => "2",
    }
}

fn expiration_code(e: PasteExpiration) -> &'static str {
    match e {
        PasteExpiration::Never => "N",
        PasteExpiration::OneDay => "1D",
        PasteExpiration::OneMonth => "1M",
    }
}

#[async_trait]
impl ArchiveUploader for PastebinClient {
    async fn upload(&self, paste: &PasteRequest) -> Result<String> {
        let user_key = self.user_key().await?;
        let res = self
            .post_form(
                "api_post.php",
                &[
                    ("api_dev_key", self.cfg.dev_key.as_str()),
                    ("api_option", "paste"),
                    ("api_user_key", user_key.as_str()),
                    ("api_paste_code", paste.content.as_str()),
                    ("api_paste_name", paste.title.as_str()),
                    ("api_paste_format", "text"),
                    ("api_paste_private", visibility_code(paste.visibility)),
                    ("api_paste_expire_date", expiration_code(paste.expiration)),
                ],
            )
            .await;

        match res {
            Ok(url) => Ok(url),
            Err(e) => {
                if e.to_string().contains(INVALID_USER_KEY) {
                    self.forget_user_key().await;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(base: String) -> PastebinClient {
        PastebinClient::new(
            PastebinConfig {
                dev_key: "devkey".to_string(),
                username: "sushi".to_string(),
                password: "hunter2".to_string(),
                api_base: base,
            },
            Duration::from_secs(5),
        )
    }

    fn paste() -> PasteRequest {
        PasteRequest {
            title: "AppErr:00000000000000000042-0000000007".to_string(),
            content: "payload".to_string(),
            visibility: PasteVisibility::Private,
            expiration: PasteExpiration::Never,
        }
    }

    #[tokio::test]
    async fn upload_logs_in_once_and_posts_private_paste() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST)
                .path("/api/api_login.php")
                .body_includes("api_dev_key=devkey")
                .body_includes("api_user_name=sushi");
            then.status(200).body("session123");
        });
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/api/api_post.php")
                .body_includes("api_option=paste")
                .body_includes("api_user_key=session123")
                .body_includes("api_paste_private=2")
                .body_includes("api_paste_expire_date=N")
                .body_includes("api_paste_format=text")
                .body_includes("api_paste_code=payload");
            then.status(200).body("https://pastebin.com/Xk2bQ9rT\n");
        });

        let c = client(server.base_url());
        assert_eq!(c.upload(&paste()).await.unwrap(), "https://pastebin.com/Xk2bQ9rT");
        assert_eq!(c.upload(&paste()).await.unwrap(), "https://pastebin.com/Xk2bQ9rT");
        login.assert_calls(1);
        post.assert_calls(2);
    }

    #[tokio::test]
    async fn concurrent_uploads_share_one_login() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/api/api_login.php");
            then.status(200).body("session123");
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/api_post.php");
            then.status(200).body("https://pastebin.com/abc");
        });

        let c = std::sync::Arc::new(client(server.base_url()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = c.clone();
            handles.push(tokio::spawn(async move { c.upload(&paste()).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        login.assert_calls(1);
    }

    #[tokio::test]
    async fn bad_api_request_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/api_login.php");
            then.status(200).body("session123");
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/api_post.php");
            then.status(200)
                .body("Bad API request, maximum number of 25 unlisted pastes for your free account");
        });

        let err = client(server.base_url()).upload(&paste()).await.unwrap_err();
        assert!(matches!(err, Error::External(_)));
        assert!(err.to_string().contains("maximum number of 25"));
    }

    #[tokio::test]
    async fn invalid_user_key_forces_fresh_login() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/api/api_login.php");
            then.status(200).body("stale");
        });
        let post = server.mock(|when, then| {
            when.method(POST).path("/api/api_post.php");
            then.status(200).body("Bad API request, invalid api_user_key");
        });

        let c = client(server.base_url());
        assert!(c.upload(&paste()).await.is_err());
        assert!(c.user_key.read().await.is_none());
        assert!(c.upload(&paste()).await.is_err());
        login.assert_calls(2);
        post.assert_calls(2);
    }

    #[tokio::test]
    async fn failed_login_is_reported_and_not_cached() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/api/api_login.php");
            then.status(200).body("Bad API request, invalid login");
        });
        let post = server.mock(|when, then| {
            when.method(POST).path("/api/api_post.php");
            then.status(200).body("https://pastebin.com/abc");
        });

        let c = client(server.base_url());
        let err = c.upload(&paste()).await.unwrap_err();
        assert!(err.to_string().contains("invalid login"));
        assert!(c.user_key.read().await.is_none());
        login.assert_calls(1);
        post.assert_calls(0);
    }

    #[tokio::test]
    async fn server_errors_map_to_external() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/api_login.php");
            then.status(503).body("upstream down");
        });

        let err = client(server.base_url()).upload(&paste()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("upstream down"));
    }
}
