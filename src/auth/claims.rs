// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims, decoded header, and the verified identity handed to handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cache::KeyRecord;
use super::extractor::TokenSource;

/// `aud` claim: Cloudflare Access sends an array, other issuers a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }

    /// Comma-separated rendering for display.
    pub fn joined(&self) -> String {
        match self {
            Audience::Single(aud) => aud.clone(),
            Audience::Multiple(auds) => auds.join(", "),
        }
    }
}

/// Claims carried by an access token.
///
/// Registered claims get typed fields; everything else the issuer adds
/// (`email`, `type`, `identity_nonce`, `country`, ...) is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer (the team domain, e.g. `https://<team>.cloudflareaccess.com`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience (application AUD tag)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Subject (user ID)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issued at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiration timestamp (required; enforced by the verifier)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not before timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0))
    }

    /// The `email` claim Cloudflare Access adds for user identities.
    pub fn email(&self) -> Option<&str> {
        self.extra.get("email").and_then(|email| email.as_str())
    }
}

/// The token's JOSE header, decoded without any signature check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    #[serde(rename = "alg")]
    pub algorithm: String,
    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(rename = "typ", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub claims: Claims,
    pub header: TokenHeader,
    /// The exact key the signature was checked against.
    pub signing_key: Arc<KeyRecord>,
    /// JWKS URI the key was resolved from.
    pub jwks_source: String,
}

/// What the middleware attaches to a request once the token verified.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub result: VerificationResult,
    pub source: TokenSource,
}

impl VerifiedIdentity {
    pub fn claims(&self) -> &Claims {
        &self.result.claims
    }
}
