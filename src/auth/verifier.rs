// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access token verification.
//!
//! ## Pipeline
//!
//! 1. Decode the JOSE header without trusting it
//! 2. Require a `kid` (no "try every key" fallback)
//! 3. Reject any `alg` outside the allow-list before touching keys
//! 4. Resolve the signing key through the [`KeyResolver`]
//! 5. Verify the signature, then `exp`/`nbf`/`iss`/`aud`
//!
//! The allow-list check comes before key resolution so that a token claiming
//! `none` or a symmetric algorithm is refused even when its `kid` names a
//! published key.

use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use tracing::{debug, warn};

use super::claims::{Claims, TokenHeader, VerificationResult};
use super::error::{AuthError, ClaimsViolation};
use super::jwks::{HttpKeySetFetcher, KeySetFetcher};
use super::resolver::KeyResolver;

/// Default clock skew tolerance (60 seconds).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Claim and algorithm policy applied to every token.
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    /// Expected `iss`; not checked when `None`.
    pub issuer: Option<String>,
    /// Accepted `aud` values; not checked when empty.
    pub audiences: Vec<String>,
    /// Algorithm allow-list.
    pub algorithms: Vec<Algorithm>,
    /// Leeway applied to `exp` and `nbf`.
    pub clock_skew: Duration,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            issuer: None,
            audiences: Vec::new(),
            algorithms: vec![Algorithm::RS256],
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }
}

/// Verifies access tokens against keys from a [`KeyResolver`].
pub struct TokenVerifier<F = HttpKeySetFetcher> {
    resolver: KeyResolver<F>,
    settings: VerifierSettings,
}

impl<F: KeySetFetcher> TokenVerifier<F> {
    pub fn new(resolver: KeyResolver<F>, settings: VerifierSettings) -> Self {
        Self { resolver, settings }
    }

    pub fn resolver(&self) -> &KeyResolver<F> {
        &self.resolver
    }

    /// Verify `token` and return its claims together with the key that signed it.
    pub async fn verify(&self, token: &str) -> Result<VerificationResult, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::TokenMissing {
                expected: "Token is empty.".to_string(),
            });
        }

        let header = decode_header(token)?;
        let kid = header
            .key_id
            .clone()
            .filter(|kid| !kid.is_empty())
            .ok_or(AuthError::KidMissing)?;
        let algorithm = self.allowed_algorithm(&header.algorithm)?;

        let signing_key = self.resolver.resolve_key(&kid, &header.algorithm).await?;

        let token_data = decode::<Claims>(token, &signing_key.decoding_key, &self.validation(algorithm))
            .map_err(|e| classify_jwt_error(e.kind(), &kid, &header.algorithm))?;

        debug!(kid = %kid, sub = ?token_data.claims.sub, "Access token verified");

        Ok(VerificationResult {
            claims: token_data.claims,
            header,
            signing_key,
            jwks_source: self.resolver.source().to_string(),
        })
    }

    fn allowed_algorithm(&self, name: &str) -> Result<Algorithm, AuthError> {
        match Algorithm::from_str(name) {
            Ok(algorithm) if self.settings.algorithms.contains(&algorithm) => Ok(algorithm),
            _ => {
                warn!(alg = %name, "Rejected token with disallowed algorithm");
                Err(AuthError::AlgorithmNotAllowed(name.to_string()))
            }
        }
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.settings.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);

        if let Some(ref issuer) = self.settings.issuer {
            validation.set_issuer(&[issuer]);
        }

        if self.settings.audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.settings.audiences);
        }

        validation
    }
}

/// Decode the (unverified) JOSE header of a compact JWS.
pub fn decode_header(token: &str) -> Result<TokenHeader, AuthError> {
    let mut segments = token.split('.');
    let (Some(header), Some(_), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("header is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("header is not a JOSE header: {e}")))
}

fn classify_jwt_error(kind: &ErrorKind, kid: &str, algorithm: &str) -> AuthError {
    match kind {
        ErrorKind::InvalidSignature => {
            warn!(kid = %kid, "Signature verification failed; possible forged access token");
            AuthError::SignatureInvalid
        }
        ErrorKind::ExpiredSignature => ClaimsViolation::Expired.into(),
        ErrorKind::ImmatureSignature => ClaimsViolation::NotYetValid.into(),
        ErrorKind::InvalidIssuer => ClaimsViolation::IssuerMismatch.into(),
        ErrorKind::InvalidAudience => ClaimsViolation::AudienceMismatch.into(),
        ErrorKind::MissingRequiredClaim(claim) => ClaimsViolation::MissingClaim(claim.clone()).into(),
        ErrorKind::InvalidAlgorithm => AuthError::AlgorithmNotAllowed(algorithm.to_string()),
        ErrorKind::InvalidKeyFormat | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey => {
            AuthError::JwksUnavailable(format!("published key {kid:?} is unusable: {kind:?}"))
        }
        other => AuthError::MalformedToken(format!("{other:?}")),
    }
}
