// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! cf-access-guard - Cloudflare Access JWT verification
//!
//! This crate verifies the identity token Cloudflare Access attaches to every
//! proxied request, using the team's published (and rotating) JWKS, and
//! exposes the result to Axum handlers.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers (protected page, logout, debug, health)
//! - `auth` - Token extraction, key resolution, verification, middleware
//! - `config` - Environment-driven configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
