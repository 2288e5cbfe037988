// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Verification of Cloudflare Access JWTs for applications sitting behind an
//! Access policy.
//!
//! ## Auth Flow
//!
//! 1. Cloudflare Access authenticates the user at the edge
//! 2. Access forwards the request with `Cf-Access-Jwt-Assertion: <JWT>`
//!    (the `CF_Authorization` cookie carries the same token)
//! 3. This service:
//!    - Decodes the untrusted header and checks `alg` against the allow-list
//!    - Resolves the signing key by `kid` (cache, then JWKS over HTTPS)
//!    - Verifies signature, expiry, not-before, issuer, audience
//!    - Attaches the verified claims to the request
//!
//! ## Security
//!
//! - Tokens without a `kid` are rejected; there is no "try every key" fallback
//! - `none` and symmetric algorithms never reach key resolution
//! - A JWKS outage is reported as `503`, never as an invalid credential
//! - Keys are cached per `kid` with a TTL; concurrent misses share one fetch
//! - Clock skew tolerance is 60 seconds by default

pub mod cache;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod resolver;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{KeyCache, KeyRecord};
pub use claims::{Audience, Claims, TokenHeader, VerificationResult, VerifiedIdentity};
pub use error::{AuthError, ClaimsViolation};
pub use extractor::{CfAccess, ExtractedToken, TokenExtractor, TokenSource};
pub use jwks::{FetchError, HttpKeySetFetcher, KeySet, KeySetFetcher};
pub use middleware::{require_cf_access, AccessGuard};
pub use resolver::{KeyResolver, ResolveError};
pub use verifier::{TokenVerifier, VerifierSettings};
