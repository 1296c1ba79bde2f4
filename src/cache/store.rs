//! In-memory TTL store shared by every request handler
//!
//! Provides a `Cache` that maps composite string keys to values with an optional
//! absolute expiry. Expiry is checked lazily on access; `purge_expired` exists for
//! the periodic janitor.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default expiration for entries written with `Ttl::Default`
pub const DEFAULT_TTL_MINUTES: i64 = 15;

/// How long an entry stays valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Use the cache's default expiration
    Default,
    /// Never expires (static reference data)
    Never,
    /// Expires after the given duration
    After(std::time::Duration),
}

impl From<std::time::Duration> for Ttl {
    /// A zero duration is the "never expires" sentinel.
    fn from(duration: std::time::Duration) -> Self {
        if duration.is_zero() {
            Ttl::Never
        } else {
            Ttl::After(duration)
        }
    }
}

/// One memoized value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The cached value
    pub value: V,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
    /// Absolute expiry, `None` for entries that never expire
    pub expires_at: Option<DateTime<Utc>>,
}

impl<V> CacheEntry<V> {
    /// Creates an entry written at `created_at` that lives for `ttl`
    pub fn new_at(value: V, created_at: DateTime<Utc>, ttl: Ttl, default_ttl: Duration) -> Self {
        let expires_at = match ttl {
            Ttl::Never => None,
            Ttl::Default => Some(created_at + default_ttl),
            // Durations past chrono's range never expire.
            Ttl::After(d) => Duration::from_std(d)
                .ok()
                .and_then(|d| created_at.checked_add_signed(d)),
        };
        Self {
            value,
            created_at,
            expires_at,
        }
    }

    /// Whether the entry is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// Process-wide key/value store with per-entry expiration
///
/// Every operation takes the lock once and releases it before returning, so
/// individual calls are atomic but batches are not. Values are cloned out; the
/// cache keeps exclusive ownership of its entries.
#[derive(Debug)]
pub struct Cache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Cache<V> {
    /// Creates an empty cache with the default 15 minute expiration
    pub fn new() -> Self {
        Self::with_default_ttl(Duration::minutes(DEFAULT_TTL_MINUTES))
    }

    /// Creates an empty cache with a custom default expiration
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Seeds a cache from previously captured entries (see `snapshot`)
    ///
    /// Entries are taken as-is; ones that expired in the meantime are reported
    /// as misses on first access.
    pub fn from_entries(entries: HashMap<String, CacheEntry<V>>) -> Self {
        Self {
            entries: RwLock::new(entries),
            default_ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
        }
    }

    /// Inserts or overwrites `key`
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Ttl) {
        let entry = CacheEntry::new_at(value, Utc::now(), ttl, self.default_ttl);
        self.entries.write().insert(key.into(), entry);
    }

    /// Inserts `key` only if it is absent or expired
    ///
    /// Returns `true` when the value was stored.
    pub fn add(&self, key: impl Into<String>, value: V, ttl: Ttl) -> bool {
        let now = Utc::now();
        let key = key.into();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&key) {
            if !existing.is_expired_at(now) {
                return false;
            }
        }
        entries.insert(key, CacheEntry::new_at(value, now, ttl, self.default_ttl));
        true
    }

    /// Removes `key`, returning whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Removes every key starting with `prefix` and returns how many were removed
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Drops every expired entry and returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V: Clone> Cache<V> {
    /// Returns a copy of the value under `key` if present and unexpired
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_with_expiration(key).map(|(value, _)| value)
    }

    /// Like `get`, also returning the entry's absolute expiry
    pub fn get_with_expiration(&self, key: &str) -> Option<(V, Option<DateTime<Utc>>)> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.is_expired_at(Utc::now()) {
            return None;
        }
        Some((entry.value.clone(), entry.expires_at))
    }

    /// Copies out every unexpired entry
    pub fn items(&self) -> HashMap<String, CacheEntry<V>> {
        let now = Utc::now();
        self.entries
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }
}
