// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::state::AppState;

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub timestamp: String,
}

/// Process status for operators.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub title: String,
    pub uptime_seconds: i64,
    pub version: String,
    pub environment: String,
    pub timestamp: String,
    /// Number of signing keys currently cached.
    pub cached_keys: usize,
}

/// Static landing content for the public pages.
#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub async fn home() -> Json<PageResponse> {
    Json(PageResponse {
        title: "Home".to_string(),
        message: Some("Welcome to the Cloudflare Access guarded app".to_string()),
        description: None,
    })
}

pub async fn about() -> Json<PageResponse> {
    Json(PageResponse {
        title: "About".to_string(),
        message: None,
        description: Some(
            "An Axum service behind Cloudflare Tunnel that verifies Cloudflare Access tokens."
                .to_string(),
        ),
    })
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running. Does not check the JWKS
/// endpoint; an outage there shows up as 503s on guarded routes instead.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Service is healthy".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// Uptime, build version and key cache size.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let now = Utc::now();
    Json(StatusResponse {
        title: "App Status".to_string(),
        uptime_seconds: (now - state.started_at).num_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment.clone(),
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        cached_keys: state.guard.verifier().resolver().cache().len(),
    })
}
