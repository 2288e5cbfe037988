// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every failure of the verification pipeline ends up as an [`AuthError`].
//! This is the only place where a failure kind is mapped to an HTTP status:
//! credential problems are `401`, JWKS infrastructure problems are `503`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::jwks::FetchError;
use super::resolver::ResolveError;

/// Which claim check rejected an otherwise authentic token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimsViolation {
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("token issuer does not match")]
    IssuerMismatch,
    #[error("token audience does not match")]
    AudienceMismatch,
    #[error("required claim {0:?} is missing")]
    MissingClaim(String),
}

/// Authentication error type.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Neither the trusted header nor the fallback cookie carried a token.
    #[error("no access token was presented")]
    TokenMissing {
        /// Human-readable list of the places that were searched.
        expected: String,
    },
    /// The credential is not a well-formed JWS compact token.
    #[error("token is malformed: {0}")]
    MalformedToken(String),
    /// The token header carries no `kid`.
    #[error("token header has no key id (kid)")]
    KidMissing,
    /// The token's algorithm is outside the allow-list.
    #[error("token algorithm {0:?} is not allowed")]
    AlgorithmNotAllowed(String),
    /// The key set was fetched but has no key with this id.
    #[error("no key with kid {kid:?} in JWKS")]
    KeyNotFound { kid: String },
    /// The key set could not be obtained or is unusable.
    #[error("JWKS unavailable: {0}")]
    JwksUnavailable(String),
    /// The signature does not verify against the resolved key.
    #[error("token signature is invalid")]
    SignatureInvalid,
    /// Signature is fine, claims are not.
    #[error("token claims are invalid: {0}")]
    ClaimsInvalid(#[from] ClaimsViolation),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    detail: String,
    error_code: &'static str,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::TokenMissing { .. } => "token_missing",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::KidMissing => "kid_missing",
            AuthError::AlgorithmNotAllowed(_) => "algorithm_not_allowed",
            AuthError::KeyNotFound { .. } => "key_not_found",
            AuthError::JwksUnavailable(_) => "jwks_unavailable",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::ClaimsInvalid(ClaimsViolation::Expired) => "token_expired",
            AuthError::ClaimsInvalid(ClaimsViolation::NotYetValid) => "token_not_yet_valid",
            AuthError::ClaimsInvalid(ClaimsViolation::IssuerMismatch) => "invalid_issuer",
            AuthError::ClaimsInvalid(ClaimsViolation::AudienceMismatch) => "invalid_audience",
            AuthError::ClaimsInvalid(ClaimsViolation::MissingClaim(_)) => "missing_claim",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::JwksUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::TokenMissing { .. }
            | AuthError::MalformedToken(_)
            | AuthError::KidMissing
            | AuthError::AlgorithmNotAllowed(_)
            | AuthError::KeyNotFound { .. }
            | AuthError::SignatureInvalid
            | AuthError::ClaimsInvalid(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::JwksUnavailable(_))
    }

    fn summary(&self) -> &'static str {
        match self {
            AuthError::TokenMissing { .. } => "Missing Cloudflare Access token",
            AuthError::JwksUnavailable(_) => "JWKS unavailable, retry later",
            _ => "Invalid token",
        }
    }
}

impl From<FetchError> for AuthError {
    fn from(err: FetchError) -> Self {
        AuthError::JwksUnavailable(err.to_string())
    }
}

impl From<ResolveError> for AuthError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Fetch(fetch) => fetch.into(),
            ResolveError::KeyNotFound { kid } => AuthError::KeyNotFound { kid },
            ResolveError::AlgorithmMismatch {
                header_algorithm, ..
            } => AuthError::AlgorithmNotAllowed(header_algorithm),
            err @ ResolveError::UnusableKey { .. } => AuthError::JwksUnavailable(err.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = match &self {
            AuthError::TokenMissing { expected } => expected.clone(),
            other => other.to_string(),
        };
        let body = Json(AuthErrorBody {
            error: self.summary().to_string(),
            detail,
            error_code: self.error_code(),
        });
        (status, body).into_response()
    }
}
