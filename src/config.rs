// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the typed configuration they are
//! parsed into at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CF_JWKS_URI` | Cloudflare Access JWKS endpoint (`https://<team>.cloudflareaccess.com/cdn-cgi/access/certs`) | Required |
//! | `CF_JWT_ISSUER` | Expected `iss` claim | Not checked |
//! | `CF_JWT_AUDIENCE` | Accepted `aud` values, comma-separated (application AUD tags) | Not checked |
//! | `CF_JWT_ALGORITHMS` | Algorithm allow-list, comma-separated | `RS256` |
//! | `CF_JWKS_FETCH_TIMEOUT_MS` | JWKS request timeout | `5000` |
//! | `CF_JWKS_CACHE_TTL_MS` | Per-key cache lifetime | `600000` |
//! | `CF_ALLOW_COOKIE_FALLBACK` | Accept the `CF_Authorization` cookie | `true` |
//! | `CF_CLOCK_SKEW_SECS` | Leeway for `exp`/`nbf` | `60` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` / `APP_PORT` | Server bind port | `3000` |
//! | `APP_DOMAIN` | Application origin, used for logout | One of these |
//! | `CF_TEAM_NAME` | Cloudflare Access team name, used for logout | is required |
//! | `LOGOUT_REDIRECT` | Where Access sends the user after logout | `/` |
//! | `APP_ENV` | Environment label reported by `/status` | `development` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

use crate::auth::extractor::{DEFAULT_TOKEN_COOKIE, DEFAULT_TOKEN_HEADER};
use crate::auth::jwks::DEFAULT_FETCH_TIMEOUT;
use crate::auth::resolver::DEFAULT_CACHE_TTL;
use crate::auth::verifier::DEFAULT_CLOCK_SKEW;

/// Environment variable name for the JWKS endpoint.
pub const JWKS_URI_ENV: &str = "CF_JWKS_URI";

/// Environment variable name for the expected issuer.
pub const ISSUER_ENV: &str = "CF_JWT_ISSUER";

/// Environment variable name for the accepted audiences.
pub const AUDIENCE_ENV: &str = "CF_JWT_AUDIENCE";

/// Environment variable name for the algorithm allow-list.
pub const ALGORITHMS_ENV: &str = "CF_JWT_ALGORITHMS";

/// Environment variable name for the JWKS fetch timeout in milliseconds.
pub const FETCH_TIMEOUT_ENV: &str = "CF_JWKS_FETCH_TIMEOUT_MS";

/// Environment variable name for the key cache TTL in milliseconds.
pub const CACHE_TTL_ENV: &str = "CF_JWKS_CACHE_TTL_MS";

/// Environment variable name for the cookie fallback switch.
pub const COOKIE_FALLBACK_ENV: &str = "CF_ALLOW_COOKIE_FALLBACK";

/// Environment variable name for the clock skew tolerance in seconds.
pub const CLOCK_SKEW_ENV: &str = "CF_CLOCK_SKEW_SECS";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const APP_PORT_ENV: &str = "APP_PORT";
pub const APP_DOMAIN_ENV: &str = "APP_DOMAIN";
pub const TEAM_NAME_ENV: &str = "CF_TEAM_NAME";
pub const LOGOUT_REDIRECT_ENV: &str = "LOGOUT_REDIRECT";
pub const APP_ENV_ENV: &str = "APP_ENV";

/// Environment variable name for the log output format.
///
/// `json` for structured output, anything else for human-readable output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LOGOUT_REDIRECT: &str = "/";
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{name} is not a valid URL: {reason}")]
    InvalidUrl { name: &'static str, reason: String },
    #[error("{name} must be an absolute http(s) URL, got scheme {scheme:?}")]
    UnsupportedScheme { name: &'static str, scheme: String },
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be true or false, got {value:?}")]
    InvalidBool { name: &'static str, value: String },
    #[error("unknown JWT algorithm {0:?}")]
    UnknownAlgorithm(String),
    #[error("the algorithm allow-list is empty")]
    NoAlgorithms,
    #[error("invalid token header name {0:?}")]
    InvalidHeaderName(String),
    #[error("either APP_DOMAIN or CF_TEAM_NAME is required for logout")]
    MissingLogoutTarget,
}

/// Everything the access guard needs to verify tokens.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub jwks_uri: Url,
    pub issuer: Option<String>,
    pub audiences: Vec<String>,
    pub algorithms: Vec<Algorithm>,
    pub fetch_timeout: Duration,
    pub cache_ttl: Duration,
    pub allow_cookie_fallback: bool,
    pub clock_skew: Duration,
    pub token_header: String,
    pub token_cookie: String,
}

impl AccessConfig {
    /// Defaults for everything except the JWKS endpoint.
    pub fn new(jwks_uri: Url) -> Self {
        Self {
            jwks_uri,
            issuer: None,
            audiences: Vec::new(),
            algorithms: vec![Algorithm::RS256],
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            allow_cookie_fallback: true,
            clock_skew: DEFAULT_CLOCK_SKEW,
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            token_cookie: DEFAULT_TOKEN_COOKIE.to_string(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to read variables. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let jwks_uri = get(JWKS_URI_ENV).ok_or(ConfigError::Missing(JWKS_URI_ENV))?;
        let mut config = Self::new(parse_http_url(JWKS_URI_ENV, &jwks_uri)?);

        config.issuer = get(ISSUER_ENV).map(|issuer| issuer.trim().to_string());
        if let Some(audiences) = get(AUDIENCE_ENV) {
            config.audiences = split_list(&audiences);
        }
        if let Some(algorithms) = get(ALGORITHMS_ENV) {
            config.algorithms = parse_algorithms(&algorithms)?;
        }
        if let Some(value) = get(FETCH_TIMEOUT_ENV) {
            config.fetch_timeout = Duration::from_millis(parse_number(FETCH_TIMEOUT_ENV, &value)?);
        }
        if let Some(value) = get(CACHE_TTL_ENV) {
            config.cache_ttl = Duration::from_millis(parse_number(CACHE_TTL_ENV, &value)?);
        }
        if let Some(value) = get(COOKIE_FALLBACK_ENV) {
            config.allow_cookie_fallback = parse_bool(COOKIE_FALLBACK_ENV, &value)?;
        }
        if let Some(value) = get(CLOCK_SKEW_ENV) {
            config.clock_skew = Duration::from_secs(parse_number(CLOCK_SKEW_ENV, &value)?);
        }

        Ok(config)
    }
}

/// Where `/logout` sends the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutTarget {
    /// The application's own origin; Access intercepts `/cdn-cgi/access/logout`.
    AppDomain(Url),
    /// The team's Access domain.
    Team(String),
}

impl LogoutTarget {
    /// Full logout URL, with `redirect` as the post-logout destination.
    pub fn logout_url(&self, redirect: &str) -> Result<Url, url::ParseError> {
        let mut url = match self {
            LogoutTarget::AppDomain(origin) => origin.join("/cdn-cgi/access/logout")?,
            LogoutTarget::Team(team) => Url::parse(&format!(
                "https://{team}.cloudflareaccess.com/cdn-cgi/access/logout"
            ))?,
        };
        url.query_pairs_mut().append_pair("redirect_url", redirect);
        Ok(url)
    }
}

/// Listener and surrounding-app configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub logout_target: LogoutTarget,
    pub logout_redirect: String,
    pub environment: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let port_value = get(PORT_ENV)
            .map(|value| (PORT_ENV, value))
            .or_else(|| get(APP_PORT_ENV).map(|value| (APP_PORT_ENV, value)));
        let port = match port_value {
            Some((name, value)) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { name, value })?,
            None => DEFAULT_PORT,
        };

        let logout_target = match (get(APP_DOMAIN_ENV), get(TEAM_NAME_ENV)) {
            (Some(domain), _) => LogoutTarget::AppDomain(parse_http_url(APP_DOMAIN_ENV, &domain)?),
            (None, Some(team)) => LogoutTarget::Team(team.trim().to_string()),
            (None, None) => return Err(ConfigError::MissingLogoutTarget),
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            logout_target,
            logout_redirect: get(LOGOUT_REDIRECT_ENV)
                .unwrap_or_else(|| DEFAULT_LOGOUT_REDIRECT.to_string()),
            environment: get(APP_ENV_ENV).unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_http_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| ConfigError::InvalidUrl {
        name,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme {
            name,
            scheme: other.to_string(),
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let algorithms = split_list(value)
        .iter()
        .map(|name| {
            Algorithm::from_str(&name.to_ascii_uppercase())
                .map_err(|_| ConfigError::UnknownAlgorithm(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if algorithms.is_empty() {
        return Err(ConfigError::NoAlgorithms);
    }
    Ok(algorithms)
}

fn parse_number(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}
