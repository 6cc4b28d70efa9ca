//! Bearer token acquisition.
//!
//! Resolution order: in-memory slot, then the locally cached token file,
//! then the platform session endpoint. The first token found is kept in the
//! slot for the life of the client and never refreshed mid-flow.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Deserialize;
use url::Url;

use super::PlatformError;

/// Token payload as written to the cache file or returned by the session endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    #[serde(alias = "token", alias = "access_token")]
    access_token: String,
}

pub struct TokenStore {
    cache_path: PathBuf,
    session_url: Url,
    slot: RwLock<Option<String>>,
}

impl TokenStore {
    pub fn new(cache_path: PathBuf, session_url: Url) -> Self {
        Self {
            cache_path,
            session_url,
            slot: RwLock::new(None),
        }
    }

    pub fn preloaded(self, token: &str) -> Self {
        *self.slot.write() = Some(token.to_string());
        self
    }

    /// Current cached token, if one was already resolved.
    pub fn peek(&self) -> Option<String> {
        self.slot.read().clone()
    }

    /// Resolve a bearer token or fail with `AuthenticationRequired`.
    pub async fn bearer(&self, http: &reqwest::Client) -> Result<String, PlatformError> {
        if let Some(token) = self.peek() {
            return Ok(token);
        }

        let token = match load_cached_token(&self.cache_path) {
            Some(token) => token,
            None => match fetch_session_token(http, &self.session_url).await {
                Ok(token) => token,
                Err(e) => {
                    log::warn!("Session token lookup failed: {}", e);
                    return Err(PlatformError::AuthenticationRequired);
                }
            },
        };

        *self.slot.write() = Some(token.clone());
        Ok(token)
    }
}

/// Read the cached token file without propagating errors.
fn load_cached_token(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            log::debug!("Token cache {} unreadable: {}", path.display(), e);
            return None;
        }
    };
    parse_token(&content)
}

fn parse_token(content: &str) -> Option<String> {
    serde_json::from_str::<TokenPayload>(content)
        .ok()
        .map(|p| p.access_token)
        .filter(|t| !t.trim().is_empty())
}

async fn fetch_session_token(http: &reqwest::Client, url: &Url) -> Result<String, PlatformError> {
    let resp = http.get(url.clone()).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(PlatformError::Api {
            status: status.as_u16(),
            message,
        });
    }
    let body = resp.text().await?;
    parse_token(&body)
        .ok_or_else(|| PlatformError::InvalidResponse("session carried no token".to_string()))
}
