// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::{header::COOKIE, HeaderMap},
    Json,
};
use serde::Serialize;

use crate::auth::extractor::{cookie_value, cookies};
use crate::state::AppState;

/// What Cloudflare Access put on the request, as seen by the origin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenView {
    pub cf_access_jwt_assertion_header: Option<String>,
    pub cf_authorization_cookie: Option<String>,
    pub has_cf_authorization_cookie: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugHeadersResponse {
    pub cloudflare_access: AccessTokenView,
    /// Every header except `cookie`, repeated headers joined with `", "`.
    pub headers: BTreeMap<String, String>,
    pub raw_cookie_header: Option<String>,
    pub cookies: BTreeMap<String, String>,
}

/// Echo request headers and cookies for troubleshooting an Access setup.
///
/// Tokens are shown as received and never verified here.
pub async fn debug_headers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<DebugHeadersResponse> {
    let extractor = state.guard.extractor();

    let token_header = headers
        .get(extractor.header_name())
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let token_cookie = cookie_value(&headers, extractor.cookie_name()).map(str::to_string);

    let mut visible = BTreeMap::new();
    for name in headers.keys().filter(|name| *name != COOKIE) {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        visible.insert(name.as_str().to_string(), joined);
    }

    let raw_cookie_header = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>();

    Json(DebugHeadersResponse {
        cloudflare_access: AccessTokenView {
            has_cf_authorization_cookie: token_cookie.is_some(),
            cf_access_jwt_assertion_header: token_header,
            cf_authorization_cookie: token_cookie,
        },
        headers: visible,
        raw_cookie_header: (!raw_cookie_header.is_empty()).then(|| raw_cookie_header.join("; ")),
        cookies: cookies(&headers)
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
    })
}
