//! # Remote Authority
//!
//! The seam to the excluded API layer. The engine and service only ever see
//! the [`RemoteAuthority`] trait; the production implementation speaks
//! HTTP/JSON with a bearer token attached per request.
//!
//! ## REST Surface
//! ```text
//! GET    /api/<collection>        -> authoritative record list (hydration)
//! POST   /api/<collection>        -> { "id": ..., ...record } on success
//! PUT    /api/<collection>/<id>   -> updated record on success
//! DELETE /api/<collection>/<id>   -> acknowledgment
//! ```
//!
//! ## Status Mapping
//! - 2xx: success
//! - 401: `Unauthorized` - abandoned, token refresh is someone else's job
//! - other 4xx: `RemoteRejected` - abandoned, the document itself is bad
//! - 5xx / transport / timeout: `Network` / `Timeout` - retried with backoff

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use stockline_core::id::Identifier;
use stockline_core::types::CollectionName;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Token Provider
// =============================================================================

/// Supplies the bearer token attached to each authority request.
///
/// Token acquisition and refresh belong to the excluded auth layer; the sync
/// layer only reads whatever the provider currently holds.
pub trait TokenProvider: Send + Sync {
    /// The current bearer token, if any.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token, handed over at construction.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// No authentication (local development against an open authority).
pub struct NoAuth;

impl TokenProvider for NoAuth {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

// =============================================================================
// Remote Authority Trait
// =============================================================================

/// The remote authority the sync engine drains against.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Lists the authoritative records of a collection (hydration).
    async fn list(&self, collection: &CollectionName) -> SyncResult<Vec<serde_json::Value>>;

    /// Creates a record; returns the server-issued identifier.
    async fn create(
        &self,
        collection: &CollectionName,
        payload: &serde_json::Value,
    ) -> SyncResult<Identifier>;

    /// Replaces a record's document.
    async fn update(
        &self,
        collection: &CollectionName,
        id: &Identifier,
        payload: &serde_json::Value,
    ) -> SyncResult<()>;

    /// Deletes a record.
    async fn delete(&self, collection: &CollectionName, id: &Identifier) -> SyncResult<()>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// Production authority client: reqwest, JSON bodies, bearer auth, bounded
/// per-request timeout from the sync config.
pub struct HttpAuthority {
    client: reqwest::Client,
    base: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpAuthority {
    /// Builds a client against `config.authority_url`.
    pub fn new(config: &SyncConfig, tokens: Arc<dyn TokenProvider>) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Internal(format!("http client build failed: {e}")))?;
        let base = Url::parse(&config.authority_url)?;

        Ok(HttpAuthority {
            client,
            base,
            tokens,
        })
    }

    /// `<base>/api/<collection>[/<id>]`
    fn endpoint(&self, collection: &CollectionName, id: Option<&Identifier>) -> SyncResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SyncError::InvalidUrl("authority URL cannot be a base".into()))?;
            segments.pop_if_empty().push("api").push(collection.as_str());
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut request = self.client.request(method, url);
        if let Some(token) = self.tokens.bearer_token() {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn check(response: Response) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 401 {
            return Err(SyncError::Unauthorized);
        }
        if status.is_client_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::RemoteRejected {
                status: status.as_u16(),
                message,
            });
        }
        // 5xx and anything else unexpected: the authority is unwell, retry
        Err(SyncError::Network(format!("authority returned {status}")))
    }
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn list(&self, collection: &CollectionName) -> SyncResult<Vec<serde_json::Value>> {
        let url = self.endpoint(collection, None)?;
        debug!(%url, "GET collection");

        let response = self.request(Method::GET, url).send().await?;
        let response = Self::check(response).await?;
        let documents: Vec<serde_json::Value> = response.json().await?;
        Ok(documents)
    }

    async fn create(
        &self,
        collection: &CollectionName,
        payload: &serde_json::Value,
    ) -> SyncResult<Identifier> {
        let url = self.endpoint(collection, None)?;
        debug!(%url, "POST record");

        let response = self.request(Method::POST, url).json(payload).send().await?;
        let response = Self::check(response).await?;

        let document: serde_json::Value = response.json().await?;
        document
            .get("id")
            .and_then(|v| v.as_str())
            .map(Identifier::remote)
            .ok_or_else(|| SyncError::Serialization("create response missing id".into()))
    }

    async fn update(
        &self,
        collection: &CollectionName,
        id: &Identifier,
        payload: &serde_json::Value,
    ) -> SyncResult<()> {
        let url = self.endpoint(collection, Some(id))?;
        debug!(%url, "PUT record");

        let response = self.request(Method::PUT, url).json(payload).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, collection: &CollectionName, id: &Identifier) -> SyncResult<()> {
        let url = self.endpoint(collection, Some(id))?;
        debug!(%url, "DELETE record");

        let response = self.request(Method::DELETE, url).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
