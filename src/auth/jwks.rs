// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching.
//!
//! ## Behaviour
//!
//! - One HTTPS `GET` per call, with `Accept: application/json`
//! - Every call is bounded by the configured timeout
//! - No retries: a failed fetch is reported to the caller as-is
//!
//! Caching lives one layer up, in [`KeyResolver`](super::resolver::KeyResolver).

use std::future::Future;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{error, info};
use url::Url;

/// Default upper bound for a single JWKS request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while fetching a key set.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The endpoint did not answer within the configured timeout.
    #[error("JWKS fetch from {uri} timed out after {}ms", timeout.as_millis())]
    Timeout { uri: String, timeout: Duration },
    /// Transport error, non-success status or unparsable body.
    #[error("JWKS fetch from {uri} failed: {reason}")]
    Failed { uri: String, reason: String },
}

/// A key set as served by the endpoint.
///
/// Entries are kept as raw JSON so that one key of an unsupported type does
/// not make the whole set unusable, and so the exact published entry can be
/// shown back for auditing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeySet {
    pub keys: Vec<serde_json::Value>,
}

impl KeySet {
    /// Find the entry whose `kid` equals `key_id`.
    pub fn find(&self, key_id: &str) -> Option<&serde_json::Value> {
        self.keys
            .iter()
            .find(|key| key.get("kid").and_then(|kid| kid.as_str()) == Some(key_id))
    }
}

/// Source of key sets for the resolver.
///
/// The HTTP implementation is [`HttpKeySetFetcher`]; tests substitute their
/// own sources to observe how often the resolver goes remote.
pub trait KeySetFetcher: Send + Sync + 'static {
    /// Identifier of where keys come from (the JWKS URI), shown in results.
    fn source(&self) -> &str;

    /// Fetch the full current key set.
    fn fetch_key_set(&self) -> impl Future<Output = Result<KeySet, FetchError>> + Send;
}

/// Fetches a key set over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
    jwks_uri: Url,
    timeout: Duration,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for `jwks_uri` (e.g. `https://<team>.cloudflareaccess.com/cdn-cgi/access/certs`).
    pub fn new(jwks_uri: Url, timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), jwks_uri, timeout)
    }

    /// Create a fetcher that shares an existing HTTP client.
    pub fn with_client(client: reqwest::Client, jwks_uri: Url, timeout: Duration) -> Self {
        Self {
            client,
            jwks_uri,
            timeout,
        }
    }
}

impl KeySetFetcher for HttpKeySetFetcher {
    fn source(&self) -> &str {
        self.jwks_uri.as_str()
    }

    async fn fetch_key_set(&self) -> Result<KeySet, FetchError> {
        fetch_key_set(&self.client, &self.jwks_uri, self.timeout).await
    }
}

/// Fetch the key set at `uri`, giving up after `timeout`.
pub async fn fetch_key_set(
    client: &reqwest::Client,
    uri: &Url,
    timeout: Duration,
) -> Result<KeySet, FetchError> {
    info!(jwks_uri = %uri, "Fetching JWKS");

    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            FetchError::Timeout {
                uri: uri.to_string(),
                timeout,
            }
        } else {
            FetchError::Failed {
                uri: uri.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client
        .get(uri.clone())
        .header(ACCEPT, "application/json")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            error!(jwks_uri = %uri, error = %e, "JWKS request failed");
            classify(e)
        })?;

    if !response.status().is_success() {
        error!(jwks_uri = %uri, status = %response.status(), "JWKS endpoint returned error status");
        return Err(FetchError::Failed {
            uri: uri.to_string(),
            reason: format!("HTTP {} from JWKS endpoint", response.status()),
        });
    }

    let key_set: KeySet = response.json().await.map_err(|e| {
        error!(jwks_uri = %uri, error = %e, "Failed to parse JWKS body");
        classify(e)
    })?;

    info!(jwks_uri = %uri, key_count = key_set.keys.len(), "Fetched JWKS");
    Ok(key_set)
}
