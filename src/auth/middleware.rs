// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! [`require_cf_access`] guards a router subtree: it extracts the token,
//! verifies it, and either attaches a [`VerifiedIdentity`] to the request
//! extensions and calls the next handler, or short-circuits with the
//! [`AuthError`] response. Nothing is attached on failure.
//!
//! ```rust,ignore
//! let guard = Arc::new(AccessGuard::from_config(&access_config)?);
//!
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .route_layer(axum::middleware::from_fn_with_state(
//!         guard,
//!         require_cf_access,
//!     ));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, info, warn};

use super::extractor::TokenExtractor;
use super::jwks::{HttpKeySetFetcher, KeySetFetcher};
use super::resolver::KeyResolver;
use super::verifier::{TokenVerifier, VerifierSettings};
use super::{AuthError, VerifiedIdentity};
use crate::config::{AccessConfig, ConfigError};

/// Token extraction plus verification, shared by every guarded route.
pub struct AccessGuard<F = HttpKeySetFetcher> {
    extractor: TokenExtractor,
    verifier: TokenVerifier<F>,
}

impl AccessGuard<HttpKeySetFetcher> {
    /// Build a guard that fetches keys over HTTPS as configured.
    pub fn from_config(config: &AccessConfig) -> Result<Self, ConfigError> {
        let extractor = TokenExtractor::new(
            &config.token_header,
            config.token_cookie.clone(),
            config.allow_cookie_fallback,
        )
        .map_err(|_| ConfigError::InvalidHeaderName(config.token_header.clone()))?;

        let fetcher = HttpKeySetFetcher::new(config.jwks_uri.clone(), config.fetch_timeout);
        let resolver = KeyResolver::new(fetcher, config.cache_ttl);
        let settings = VerifierSettings {
            issuer: config.issuer.clone(),
            audiences: config.audiences.clone(),
            algorithms: config.algorithms.clone(),
            clock_skew: config.clock_skew,
        };

        info!(
            jwks_uri = %config.jwks_uri,
            issuer = ?config.issuer,
            audiences = ?config.audiences,
            algorithms = ?config.algorithms,
            cookie_fallback = config.allow_cookie_fallback,
            "Cloudflare Access guard configured"
        );

        Ok(Self::new(extractor, TokenVerifier::new(resolver, settings)))
    }
}

impl<F: KeySetFetcher> AccessGuard<F> {
    pub fn new(extractor: TokenExtractor, verifier: TokenVerifier<F>) -> Self {
        Self {
            extractor,
            verifier,
        }
    }

    pub fn extractor(&self) -> &TokenExtractor {
        &self.extractor
    }

    pub fn verifier(&self) -> &TokenVerifier<F> {
        &self.verifier
    }

    /// Extract and verify the token carried by `headers`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<VerifiedIdentity, AuthError> {
        let extracted = self
            .extractor
            .extract(headers)
            .ok_or_else(|| AuthError::TokenMissing {
                expected: self.extractor.expected_sources(),
            })?;

        let result = self.verifier.verify(&extracted.token).await?;
        Ok(VerifiedIdentity {
            result,
            source: extracted.source,
        })
    }
}

/// Authentication middleware function.
pub async fn require_cf_access<F: KeySetFetcher>(
    State(guard): State<Arc<AccessGuard<F>>>,
    mut request: Request,
    next: Next,
) -> Response {
    match guard.authenticate(request.headers()).await {
        Ok(identity) => {
            debug!(
                sub = ?identity.claims().sub,
                source = %identity.source,
                path = %request.uri().path(),
                "Request authenticated"
            );
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => {
            let path = request.uri().path();
            match &err {
                AuthError::TokenMissing { .. } => {
                    debug!(path = %path, "Request carried no access token");
                }
                AuthError::JwksUnavailable(reason) => {
                    warn!(path = %path, reason = %reason, "Cannot verify token, JWKS unavailable");
                }
                other => {
                    info!(
                        path = %path,
                        error_code = other.error_code(),
                        error = %other,
                        "Access token rejected"
                    );
                }
            }
            err.into_response()
        }
    }
}
