// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::AccessGuard;
use crate::config::{LogoutTarget, ServerConfig};

#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<AccessGuard>,
    pub logout_target: LogoutTarget,
    pub logout_redirect: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(guard: AccessGuard, server: &ServerConfig) -> Self {
        Self {
            guard: Arc::new(guard),
            logout_target: server.logout_target.clone(),
            logout_redirect: server.logout_redirect.clone(),
            environment: server.environment.clone(),
            started_at: Utc::now(),
        }
    }
}
