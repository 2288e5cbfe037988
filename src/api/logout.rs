// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::State,
    http::{
        header::{LOCATION, SET_COOKIE},
        StatusCode,
    },
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use crate::error::ApiError;
use crate::state::AppState;

/// Log the user out of Cloudflare Access.
///
/// Clears the token cookie on this origin and redirects to Access's logout
/// endpoint, which revokes the session and then sends the browser to the
/// configured redirect.
pub async fn logout(State(state): State<AppState>) -> Result<Response, ApiError> {
    let logout_url = state
        .logout_target
        .logout_url(&state.logout_redirect)
        .map_err(|e| {
            error!(error = %e, target = ?state.logout_target, "Cannot build logout URL");
            ApiError::internal("Logout is misconfigured")
        })?;

    let cookie = expired_cookie(state.guard.extractor().cookie_name());

    info!(location = %logout_url, "Redirecting to Cloudflare Access logout");

    Ok((
        StatusCode::FOUND,
        [
            (LOCATION, logout_url.to_string()),
            (SET_COOKIE, cookie),
        ],
    )
        .into_response())
}

fn expired_cookie(name: &str) -> String {
    format!("{name}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT")
}
