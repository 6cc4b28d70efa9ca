//! Personal-data platform client.
//!
//! Thin, bearer-authenticated REST adapters. No retries and no result
//! caching happen here; orchestration above decides how each failure is
//! treated.
//!
//! Modules:
//! - token_store: bearer token acquisition (local cache, then session endpoint)
//! - calendar: event query/create and universal search (CalendarPort)
//! - documents: hospital/donor directory and invitation persistence
//! - llm: generative prompt endpoints (GenerativeContentPort)

pub mod calendar;
pub mod documents;
pub mod llm;
pub mod token_store;

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::PlatformConfig;
use token_store::TokenStore;

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("No usable platform token")]
    AuthenticationRequired,
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid platform URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("{kind} {id} not found")]
    DocumentNotFound { kind: &'static str, id: String },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// Document store envelopes
// ============================================================================

/// `POST /ds/query/{schema}` request body.
#[derive(Debug, Serialize)]
pub(crate) struct QueryRequest<'a, F: Serialize> {
    pub query: &'a F,
    pub options: &'a QueryOptions,
}

/// Sort and limit for document queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl QueryOptions {
    /// Oldest first by `startDate`.
    pub fn chronological(limit: Option<u32>) -> Self {
        Self {
            sort: Some(serde_json::json!({ "startDate": 1 })),
            limit,
        }
    }

    pub fn first() -> Self {
        Self {
            sort: None,
            limit: Some(1),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse<T> {
    #[serde(default = "Vec::new", alias = "items")]
    pub documents: Vec<T>,
}

/// `POST /ds/save/{schema}` request body: the document plus its schema URL.
#[derive(Debug, Serialize)]
pub(crate) struct SaveRequest<'a, T: Serialize> {
    pub document: SchemaDocument<'a, T>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SchemaDocument<'a, T: Serialize> {
    #[serde(flatten)]
    pub body: &'a T,
    pub schema: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveResponse<T> {
    pub document: T,
}

/// Path segment identifying a schema: URL-safe base64 without padding.
pub fn encode_schema(schema_url: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(schema_url.as_bytes())
}

// ============================================================================
// Client
// ============================================================================

/// Shared HTTP client for every platform endpoint.
///
/// Timeouts are whatever reqwest defaults to; nothing here cancels or retries.
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: TokenStore,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;
        let session_url = Self::join(&base_url, &config.session_path)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            tokens: TokenStore::new(config.resolved_token_path(), session_url),
        })
    }

    /// Use a token issued out of band instead of the cache/session lookup.
    pub fn with_token(mut self, token: &str) -> Self {
        self.tokens = self.tokens.preloaded(token);
        self
    }

    fn join(base: &Url, path: &str) -> Result<Url, PlatformError> {
        let base = base.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }

    /// POST a JSON body to `path` with bearer auth and decode the JSON reply.
    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, PlatformError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.tokens.bearer(&self.http).await?;
        let url = Self::join(&self.base_url, path)?;

        let resp = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(PlatformError::AuthenticationRequired);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PlatformError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    pub(crate) async fn query_documents<F, T>(
        &self,
        schema_url: &str,
        filter: &F,
        options: &QueryOptions,
    ) -> Result<Vec<T>, PlatformError>
    where
        F: Serialize,
        T: DeserializeOwned,
    {
        let path = format!("/ds/query/{}", encode_schema(schema_url));
        let body = QueryRequest {
            query: filter,
            options,
        };
        let resp: QueryResponse<T> = self.post_json(&path, &body).await?;
        Ok(resp.documents)
    }

    pub(crate) async fn save_document<T>(&self, schema_url: &str, document: &T) -> Result<T, PlatformError>
    where
        T: Serialize + DeserializeOwned,
    {
        let path = format!("/ds/save/{}", encode_schema(schema_url));
        let body = SaveRequest {
            document: SchemaDocument {
                body: document,
                schema: schema_url,
            },
        };
        let resp: SaveResponse<T> = self.post_json(&path, &body).await?;
        Ok(resp.document)
    }
}

// ============================================================================
// Tests
// ============================================================================
