// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key resolution: cache first, JWKS on miss, one fetch per `kid` at a time.
//!
//! A burst of requests for a key that is not cached yet (cold start, or the
//! identity provider just rotated) must not turn into a burst of JWKS
//! requests. Concurrent misses for the same `kid` therefore join a single
//! in-flight fetch and all observe its outcome. Misses for different key
//! identifiers proceed in parallel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::DecodingKey;
use tracing::{debug, info, warn};

use super::cache::{KeyCache, KeyRecord};
use super::jwks::{FetchError, KeySetFetcher};

/// Default key cache TTL (10 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Errors raised while resolving a signing key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    /// The key set could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The key set was fetched but has no entry for this `kid`.
    #[error("no key with kid {kid:?} in JWKS")]
    KeyNotFound { kid: String },
    /// The key entry declares an algorithm other than the token header's.
    #[error("key {kid:?} is published for {key_algorithm} but the token uses {header_algorithm}")]
    AlgorithmMismatch {
        kid: String,
        key_algorithm: String,
        header_algorithm: String,
    },
    /// The key entry exists but cannot be turned into a verification key.
    #[error("key {kid:?} cannot be used for verification: {reason}")]
    UnusableKey { kid: String, reason: String },
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<KeyRecord>, ResolveError>>>;

/// Registry marker for a running fetch. `id` lets the fetch clear its own
/// marker without touching one registered after it.
struct InFlightFetch {
    id: u64,
    fetch: SharedFetch,
}

/// Resolves `kid`s to verification keys, owning its cache and in-flight registry.
pub struct KeyResolver<F> {
    fetcher: Arc<F>,
    cache: Arc<KeyCache>,
    in_flight: Arc<DashMap<String, InFlightFetch>>,
    next_fetch_id: AtomicU64,
    cache_ttl: Duration,
}

impl<F: KeySetFetcher> KeyResolver<F> {
    pub fn new(fetcher: F, cache_ttl: Duration) -> Self {
        Self::with_cache(fetcher, Arc::new(KeyCache::new()), cache_ttl)
    }

    /// Build a resolver around an existing cache.
    pub fn with_cache(fetcher: F, cache: Arc<KeyCache>, cache_ttl: Duration) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            cache,
            in_flight: Arc::new(DashMap::new()),
            next_fetch_id: AtomicU64::new(0),
            cache_ttl,
        }
    }

    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Where keys come from (the JWKS URI).
    pub fn source(&self) -> &str {
        self.fetcher.source()
    }

    /// Resolve the key for `kid`, checking it is usable with `header_algorithm`.
    pub async fn resolve_key(
        &self,
        kid: &str,
        header_algorithm: &str,
    ) -> Result<Arc<KeyRecord>, ResolveError> {
        let record = match self.cache.get(kid) {
            Some(record) => {
                debug!(kid = %kid, "JWKS key served from cache");
                record
            }
            None => self.join_or_start_fetch(kid).await?,
        };

        check_algorithm(&record, header_algorithm)?;
        Ok(record)
    }

    async fn join_or_start_fetch(&self, kid: &str) -> Result<Arc<KeyRecord>, ResolveError> {
        let fetch = match self.in_flight.entry(kid.to_owned()) {
            Entry::Occupied(entry) => {
                debug!(kid = %kid, "Joining in-flight JWKS fetch");
                entry.get().fetch.clone()
            }
            Entry::Vacant(entry) => {
                // A fetch for this kid may have settled between the cache
                // miss and taking the entry lock.
                if let Some(record) = self.cache.get(kid) {
                    return Ok(record);
                }
                let marker = self.start_fetch(kid.to_owned());
                let fetch = marker.fetch.clone();
                entry.insert(marker);
                fetch
            }
        };

        fetch.await
    }

    /// Spawn the remote fetch on its own task so it settles (and clears its
    /// in-flight marker) even if every waiter goes away.
    fn start_fetch(&self, kid: String) -> InFlightFetch {
        let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let fetcher = Arc::clone(&self.fetcher);
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let ttl = self.cache_ttl;

        let task = tokio::spawn(async move {
            let outcome = fetch_record(&*fetcher, &kid).await;
            if let Ok(record) = &outcome {
                cache.put(kid.clone(), Arc::clone(record), ttl);
            }
            in_flight.remove_if(&kid, |_, marker| marker.id == id);
            outcome
        });

        let fetch = async move {
            task.await.unwrap_or_else(|join_error| {
                Err(ResolveError::Fetch(FetchError::Failed {
                    uri: String::new(),
                    reason: format!("JWKS fetch task aborted: {join_error}"),
                }))
            })
        }
        .boxed()
        .shared();

        InFlightFetch { id, fetch }
    }
}

async fn fetch_record<F: KeySetFetcher>(
    fetcher: &F,
    kid: &str,
) -> Result<Arc<KeyRecord>, ResolveError> {
    let key_set = fetcher.fetch_key_set().await?;
    let fetched_at = Utc::now();

    let Some(raw) = key_set.find(kid) else {
        warn!(kid = %kid, jwks_uri = %fetcher.source(), "kid not present in freshly fetched JWKS");
        return Err(ResolveError::KeyNotFound {
            kid: kid.to_owned(),
        });
    };

    let record = build_record(kid, raw.clone(), fetched_at)?;
    info!(kid = %kid, alg = ?record.algorithm, "Cached JWKS key");
    Ok(Arc::new(record))
}

/// Turn a raw JWK entry into a [`KeyRecord`].
fn build_record(
    kid: &str,
    raw: serde_json::Value,
    fetched_at: chrono::DateTime<Utc>,
) -> Result<KeyRecord, ResolveError> {
    let unusable = |reason: String| ResolveError::UnusableKey {
        kid: kid.to_owned(),
        reason,
    };

    let jwk: Jwk = serde_json::from_value(raw.clone()).map_err(|e| unusable(e.to_string()))?;
    let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| unusable(e.to_string()))?;
    let algorithm = raw
        .get("alg")
        .and_then(|alg| alg.as_str())
        .map(str::to_owned);

    Ok(KeyRecord {
        key_id: kid.to_owned(),
        algorithm,
        jwk: raw,
        decoding_key,
        fetched_at,
    })
}

fn check_algorithm(record: &KeyRecord, header_algorithm: &str) -> Result<(), ResolveError> {
    match &record.algorithm {
        Some(key_algorithm) if key_algorithm != header_algorithm => {
            Err(ResolveError::AlgorithmMismatch {
                kid: record.key_id.clone(),
                key_algorithm: key_algorithm.clone(),
                header_algorithm: header_algorithm.to_owned(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{rsa_jwk, StubFetcher, KID};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn miss_fetches_and_caches() {
        let fetcher = StubFetcher::with_keys(vec![rsa_jwk(KID)]);
        let calls = fetcher.calls();
        let resolver = KeyResolver::new(fetcher, DEFAULT_CACHE_TTL);

        let record = resolver.resolve_key(KID, "RS256").await.unwrap();

        assert_eq!(record.key_id, KID);
        assert_eq!(record.algorithm.as_deref(), Some("RS256"));
        assert_eq!(record.jwk, rsa_jwk(KID));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(resolver.cache().get(KID).is_some());
    }

    #[tokio::test]
    async fn repeated_calls_within_ttl_fetch_once() {
        let fetcher = StubFetcher::with_keys(vec![rsa_jwk(KID)]);
        let calls = fetcher.calls();
        let resolver = KeyResolver::new(fetcher, DEFAULT_CACHE_TTL);

        for _ in 0..10 {
            resolver.resolve_key(KID, "RS256").await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_triggers_exactly_one_new_fetch() {
        let fetcher = StubFetcher::with_keys(vec![rsa_jwk(KID)]);
        let calls = fetcher.calls();
        let resolver = KeyResolver::new(fetcher, Duration::from_secs(600));

        resolver.resolve_key(KID, "RS256").await.unwrap();
        tokio::time::advance(Duration::from_secs(601)).await;
        resolver.resolve_key(KID, "RS256").await.unwrap();
        resolver.resolve_key(KID, "RS256").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_fetch() {
        let mut fetcher = StubFetcher::with_keys(vec![rsa_jwk(KID)]);
        fetcher.delay = Duration::from_millis(100);
        let calls = fetcher.calls();
        let resolver = Arc::new(KeyResolver::new(fetcher, DEFAULT_CACHE_TTL));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.resolve_key(KID, "RS256").await })
            })
            .collect();

        let records: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(records.iter().all(|r| Arc::ptr_eq(r, &records[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_failure() {
        let mut fetcher = StubFetcher::with_keys(vec![]);
        fetcher.delay = Duration::from_millis(100);
        fetcher.fail = true;
        let calls = fetcher.calls();
        let resolver = Arc::new(KeyResolver::new(fetcher, DEFAULT_CACHE_TTL));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.resolve_key(KID, "RS256").await })
            })
            .collect();

        for joined in futures::future::join_all(handles).await {
            let err = joined.unwrap().unwrap_err();
            assert!(matches!(err, ResolveError::Fetch(FetchError::Timeout { .. })));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(resolver.in_flight.is_empty());
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn settled_fetch_keeps_a_newer_marker() {
        let mut fetcher = StubFetcher::with_keys(vec![rsa_jwk(KID)]);
        fetcher.delay = Duration::from_secs(1);
        let resolver = Arc::new(KeyResolver::new(fetcher, Duration::ZERO));

        let pending = tokio::spawn({
            let resolver = Arc::clone(&resolver);
            async move { resolver.resolve_key(KID, "RS256").await }
        });
        while !resolver.in_flight.contains_key(KID) {
            tokio::task::yield_now().await;
        }

        // Another fetch registers for the same kid before the first settles.
        let newer = InFlightFetch {
            id: u64::MAX,
            fetch: futures::future::pending().boxed().shared(),
        };
        resolver.in_flight.insert(KID.to_string(), newer);

        assert!(pending.await.unwrap().is_ok());
        assert_eq!(
            resolver.in_flight.get(KID).map(|marker| marker.id),
            Some(u64::MAX)
        );
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let mut fetcher = StubFetcher::with_keys(vec![rsa_jwk(KID)]);
        fetcher.fail = true;
        let calls = fetcher.calls();
        let resolver = KeyResolver::new(fetcher, DEFAULT_CACHE_TTL);

        assert!(resolver.resolve_key(KID, "RS256").await.is_err());
        assert!(resolver.resolve_key(KID, "RS256").await.is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_kid_is_key_not_found() {
        let fetcher = StubFetcher::with_keys(vec![rsa_jwk(KID)]);
        let resolver = KeyResolver::new(fetcher, DEFAULT_CACHE_TTL);

        let err = resolver.resolve_key("rotated-away", "RS256").await.unwrap_err();

        assert!(matches!(err, ResolveError::KeyNotFound { ref kid } if kid == "rotated-away"));
        assert!(resolver.cache().get("rotated-away").is_none());
    }

    #[tokio::test]
    async fn declared_algorithm_must_match_header() {
        let fetcher = StubFetcher::with_keys(vec![rsa_jwk(KID)]);
        let resolver = KeyResolver::new(fetcher, DEFAULT_CACHE_TTL);

        let err = resolver.resolve_key(KID, "RS512").await.unwrap_err();

        assert!(matches!(err, ResolveError::AlgorithmMismatch { .. }));
    }

    #[tokio::test]
    async fn key_without_alg_accepts_header_algorithm() {
        let mut jwk = rsa_jwk(KID);
        jwk.as_object_mut().unwrap().remove("alg");
        let resolver = KeyResolver::new(StubFetcher::with_keys(vec![jwk]), DEFAULT_CACHE_TTL);

        let record = resolver.resolve_key(KID, "RS384").await.unwrap();

        assert!(record.algorithm.is_none());
    }

    #[tokio::test]
    async fn garbage_key_entry_is_unusable() {
        let jwk = json!({ "kid": KID, "kty": "RSA", "alg": "RS256" });
        let resolver = KeyResolver::new(StubFetcher::with_keys(vec![jwk]), DEFAULT_CACHE_TTL);

        let err = resolver.resolve_key(KID, "RS256").await.unwrap_err();

        assert!(matches!(err, ResolveError::UnusableKey { .. }));
    }
}
