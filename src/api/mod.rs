// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderName, HeaderValue},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::{
    auth::{require_cf_access, HttpKeySetFetcher},
    error::ApiError,
    state::AppState,
};

pub mod debug;
pub mod health;
pub mod logout;
pub mod protected;

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/protected", get(protected::protected))
        .route_layer(from_fn_with_state(
            state.guard.clone(),
            require_cf_access::<HttpKeySetFetcher>,
        ));

    Router::new()
        .merge(protected_routes)
        .route("/", get(health::home))
        .route("/about", get(health::about))
        .route("/logout", get(logout::logout))
        .route("/debug/headers", get(debug::debug_headers))
        .route("/health", get(health::health))
        .route("/status", get(health::status))
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(security_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                .layer(security_header(header::X_FRAME_OPTIONS, "SAMEORIGIN"))
                .layer(security_header(header::REFERRER_POLICY, "no-referrer"))
                .layer(security_header(
                    HeaderName::from_static("cross-origin-resource-policy"),
                    "cross-origin",
                )),
        )
}

/// Baseline header added to every response a handler did not already set it on.
fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}

async fn not_found() -> impl IntoResponse {
    ApiError::not_found("Not Found")
}
