// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Locating the access token in a request, and handing the verified identity
//! to handlers.
//!
//! Cloudflare Access injects the token as the `Cf-Access-Jwt-Assertion`
//! header on every proxied request; a client cannot forge that header past
//! the proxy, so it always wins. The `CF_Authorization` cookie carries the
//! same token and is only consulted when cookie fallback is enabled.
//!
//! Handlers behind the middleware take the identity with `CfAccess`:
//!
//! ```rust,ignore
//! async fn my_handler(CfAccess(identity): CfAccess) -> impl IntoResponse {
//!     // identity.claims().sub, identity.source, ...
//! }
//! ```

use std::fmt;

use axum::{
    extract::FromRequestParts,
    http::{header::COOKIE, request::Parts, HeaderMap, HeaderName},
};

use super::{AuthError, VerifiedIdentity};

/// Header Cloudflare Access injects in front of the origin.
pub const DEFAULT_TOKEN_HEADER: &str = "Cf-Access-Jwt-Assertion";

/// Cookie Cloudflare Access sets on the application domain.
pub const DEFAULT_TOKEN_COOKIE: &str = "CF_Authorization";

/// Where a token was found, kept for audit output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Header(String),
    Cookie(String),
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Header(name) => write!(f, "header:{name}"),
            TokenSource::Cookie(name) => write!(f, "cookie:{name}"),
        }
    }
}

/// A raw token together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedToken {
    pub token: String,
    pub source: TokenSource,
}

/// Header-then-cookie token lookup policy.
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    header: HeaderName,
    header_label: String,
    cookie: String,
    allow_cookie_fallback: bool,
}

impl Default for TokenExtractor {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static("cf-access-jwt-assertion"),
            header_label: DEFAULT_TOKEN_HEADER.to_string(),
            cookie: DEFAULT_TOKEN_COOKIE.to_string(),
            allow_cookie_fallback: true,
        }
    }
}

impl TokenExtractor {
    pub fn new(
        header: &str,
        cookie: impl Into<String>,
        allow_cookie_fallback: bool,
    ) -> Result<Self, axum::http::header::InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::from_bytes(header.as_bytes())?,
            header_label: header.to_string(),
            cookie: cookie.into(),
            allow_cookie_fallback,
        })
    }

    pub fn header_name(&self) -> &str {
        &self.header_label
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie
    }

    /// Find the token. Absence is a normal outcome, not an error.
    pub fn extract(&self, headers: &HeaderMap) -> Option<ExtractedToken> {
        let from_header = headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty());
        if let Some(token) = from_header {
            return Some(ExtractedToken {
                token: token.to_string(),
                source: TokenSource::Header(self.header_label.clone()),
            });
        }

        if !self.allow_cookie_fallback {
            return None;
        }

        cookie_value(headers, &self.cookie)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| ExtractedToken {
                token: token.to_string(),
                source: TokenSource::Cookie(self.cookie.clone()),
            })
    }

    /// The `detail` text for a missing-token response.
    pub fn expected_sources(&self) -> String {
        if self.allow_cookie_fallback {
            format!(
                "Expected {} header (preferred) or {} cookie (fallback).",
                self.header_label, self.cookie
            )
        } else {
            format!("Expected {} header.", self.header_label)
        }
    }
}

/// Iterate over all `name=value` pairs of every `Cookie` header.
pub fn cookies(headers: &HeaderMap) -> impl Iterator<Item = (&str, &str)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim(), value.trim().trim_matches('"')))
        })
}

/// Value of the first cookie called `name`.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    cookies(headers).find_map(|(key, value)| (key == name).then_some(value))
}

/// Extractor for the identity attached by the access middleware.
///
/// Rejects with `401` if the route is not behind the middleware.
pub struct CfAccess(pub VerifiedIdentity);

impl<S: Send + Sync> FromRequestParts<S> for CfAccess {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedIdentity>()
            .cloned()
            .map(CfAccess)
            .ok_or_else(|| AuthError::TokenMissing {
                expected: "Request was not authenticated by the access middleware.".to_string(),
            })
    }
}
