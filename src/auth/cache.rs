// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Time-bounded in-memory store of resolved signing keys.
//!
//! The cache is pure bookkeeping: it never talks to the network and never
//! touches key material beyond holding it. Entries are keyed by `kid` and
//! become invisible once their TTL has elapsed; an expired entry is evicted
//! the next time somebody asks for it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jsonwebtoken::DecodingKey;
use serde::Serialize;
use tokio::time::Instant;

/// A public key taken from the JWKS, ready for signature verification.
///
/// Records are immutable once stored. A refresh replaces the whole record.
#[derive(Clone, Serialize)]
pub struct KeyRecord {
    /// Key identifier (`kid`) as published in the key set.
    pub key_id: String,
    /// Algorithm declared by the key entry (`alg`), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// The raw JWK exactly as served by the JWKS endpoint.
    pub jwk: serde_json::Value,
    /// Verification key derived from `jwk`.
    #[serde(skip)]
    pub decoding_key: DecodingKey,
    /// When the key set containing this key was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

struct CacheEntry {
    record: Arc<KeyRecord>,
    /// `None` means the TTL was too large to represent and the entry never expires.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// Per-`kid` key cache with lazy TTL eviction.
///
/// Backed by a sharded map, so lookups for unrelated key identifiers never
/// contend on a single lock.
#[derive(Default)]
pub struct KeyCache {
    entries: DashMap<String, CacheEntry>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live record. Expired entries are evicted and reported as absent.
    pub fn get(&self, key_id: &str) -> Option<Arc<KeyRecord>> {
        let now = Instant::now();
        match self.entries.get(key_id) {
            Some(entry) if entry.is_live(now) => return Some(Arc::clone(&entry.record)),
            Some(_) => {}
            None => return None,
        }

        // The read guard is released above; re-check under the write lock in
        // case a fresh record was stored in between.
        if self
            .entries
            .remove_if(key_id, |_, entry| !entry.is_live(now))
            .is_some()
        {
            tracing::debug!(kid = %key_id, "evicted expired JWKS key");
        }
        None
    }

    /// Store `record` under `key_id`, replacing any previous entry.
    pub fn put(&self, key_id: impl Into<String>, record: Arc<KeyRecord>, ttl: Duration) {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries
            .insert(key_id.into(), CacheEntry { record, expires_at });
    }

    /// Drop every entry. Intended for tests and operator resets.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
