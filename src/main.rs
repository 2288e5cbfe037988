// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use cf_access_guard::{
    api::router,
    auth::AccessGuard,
    config::{AccessConfig, ServerConfig, LOG_FORMAT_ENV},
    state::AppState,
};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let access = match AccessConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid access configuration");
            return ExitCode::FAILURE;
        }
    };
    let server = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid server configuration");
            return ExitCode::FAILURE;
        }
    };
    let guard = match AccessGuard::from_config(&access) {
        Ok(guard) => guard,
        Err(e) => {
            error!(error = %e, "Cannot build access guard");
            return ExitCode::FAILURE;
        }
    };

    let app = router(AppState::new(guard, &server));

    let addr = server.bind_address();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %addr, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %addr, environment = %server.environment, "cf-access-guard listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
