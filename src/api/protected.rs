// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::auth::{CfAccess, Claims, KeyRecord, TokenHeader};

/// Everything known about the caller and how their token was verified.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedPage {
    pub title: &'static str,
    pub subject: Option<String>,
    pub issuer: Option<String>,
    /// `aud` values joined with `", "`.
    pub audience: Option<String>,
    pub email: Option<String>,
    pub expires_at: Option<String>,
    pub issued_at: Option<String>,
    pub now_utc: String,
    /// JWKS endpoint the signing key came from.
    pub jwks_uri: String,
    pub signing_key: KeyRecord,
    pub jwt_header: TokenHeader,
    pub token_source: String,
    pub claims: Claims,
}

/// Show the verified identity of the caller.
///
/// Only reachable through `require_cf_access`.
pub async fn protected(CfAccess(identity): CfAccess) -> Json<ProtectedPage> {
    let result = identity.result;
    let claims = result.claims;

    Json(ProtectedPage {
        title: "Protected",
        subject: claims.sub.clone(),
        issuer: claims.iss.clone(),
        audience: claims.aud.as_ref().map(|aud| aud.joined()),
        email: claims.email().map(str::to_string),
        expires_at: claims.expires_at().map(iso),
        issued_at: claims.issued_at().map(iso),
        now_utc: iso(Utc::now()),
        jwks_uri: result.jwks_source,
        signing_key: KeyRecord::clone(&result.signing_key),
        jwt_header: result.header,
        token_source: identity.source.to_string(),
        claims,
    })
}

/// ISO-8601 in UTC with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`.
fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
