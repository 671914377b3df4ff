//! A thread-safe in-memory cache of evaluation responses with per-entry expiry.
//!
//! [`ResponseCache`] maps an evaluation context to the [`EvaluationResponse`] previously fetched
//! for it. Entries are replaced wholesale and never mutated, so readers get a shared snapshot
//! (`Arc`) that is unaffected by later writes.
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::{
    config::{CacheConfig, CacheKeyFn},
    error::ConversionError,
    CachePayload, ContextNormalizer, EvaluationContext, EvaluationResponse,
};

const DEFAULT_SHARD_COUNT: usize = 16;

/// Derive the default cache key for a normalized context: base64 of the SHA-256 digest of its
/// canonical JSON (always 44 characters).
///
/// Any change to any payload field changes the key, so entries never need explicit invalidation.
pub fn default_cache_key(payload: &CachePayload) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_canonical_json());
    BASE64.encode(hasher.finalize())
}

enum KeyStrategy {
    /// Hash of the normalized payload.
    Payload(ContextNormalizer),
    Custom(CacheKeyFn),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<EvaluationResponse>,
    expires_at: DateTime<Utc>,
}

/// Memoizes evaluation responses per context for a fixed time-to-live.
///
/// An unbounded cache spreads keys over independently locked shards, so operations on different
/// keys rarely contend. A bounded cache is a single LRU list holding at most `max_entries`
/// responses. Expired entries are removed lazily when read.
pub struct ResponseCache {
    shards: Box<[Mutex<LruCache<String, CacheEntry>>]>,
    ttl: TimeDelta,
    key_strategy: KeyStrategy,
}

impl ResponseCache {
    /// Create a cache. `normalizer` is used to derive default keys unless the config provides a
    /// custom key function.
    pub fn new(config: &CacheConfig, normalizer: ContextNormalizer) -> ResponseCache {
        // A bounded cache keeps a single shard so that `max_entries` is an exact limit and
        // eviction order is global. A zero bound is treated as one entry.
        let shards = match config.max_entries {
            Some(max) => {
                let capacity = NonZeroUsize::new(max).unwrap_or(NonZeroUsize::MIN);
                vec![Mutex::new(LruCache::new(capacity))].into_boxed_slice()
            }
            None => (0..DEFAULT_SHARD_COUNT)
                .map(|_| Mutex::new(LruCache::unbounded()))
                .collect(),
        };

        let key_strategy = match &config.key_fn {
            Some(key_fn) => KeyStrategy::Custom(key_fn.clone()),
            None => KeyStrategy::Payload(normalizer),
        };

        ResponseCache {
            shards,
            ttl: TimeDelta::from_std(config.ttl).unwrap_or(TimeDelta::MAX),
            key_strategy,
        }
    }

    /// Compute the cache key for `context`.
    pub fn cache_key(&self, context: &EvaluationContext) -> Result<String, ConversionError> {
        match &self.key_strategy {
            KeyStrategy::Payload(normalizer) => {
                Ok(default_cache_key(&normalizer.normalize(context)?))
            }
            KeyStrategy::Custom(key_fn) => Ok(key_fn(context)),
        }
    }

    /// Cache key for `context` given its normalized `payload`, without normalizing again.
    pub(crate) fn key_for(&self, context: &EvaluationContext, payload: &CachePayload) -> String {
        match &self.key_strategy {
            KeyStrategy::Payload(_) => default_cache_key(payload),
            KeyStrategy::Custom(key_fn) => key_fn(context),
        }
    }

    /// Get the cached response for `context`, or `None` if there is none or it has expired.
    pub fn get(
        &self,
        context: &EvaluationContext,
    ) -> Result<Option<Arc<EvaluationResponse>>, ConversionError> {
        let key = self.cache_key(context)?;
        Ok(self.get_at(&key, Utc::now()))
    }

    /// Store `response` for `context`, replacing any previous entry.
    pub fn set(
        &self,
        context: &EvaluationContext,
        response: Arc<EvaluationResponse>,
    ) -> Result<(), ConversionError> {
        let key = self.cache_key(context)?;
        self.insert_at(key, response, Utc::now());
        Ok(())
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| lock(shard).len()).sum()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Arc<EvaluationResponse>> {
        let mut shard = lock(self.shard(key));
        let entry = shard.get(key)?;
        if now >= entry.expires_at {
            shard.pop(key);
            log::debug!(target: "hyphen", cache_key = key; "evicted expired cache entry");
            return None;
        }
        Some(entry.value.clone())
    }

    pub(crate) fn insert_at(&self, key: String, value: Arc<EvaluationResponse>, now: DateTime<Utc>) {
        // Constructing new value before requesting the lock to minimize lock span.
        let entry = CacheEntry {
            value,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        lock(self.shard(&key)).put(key, entry);
    }

    fn shard(&self, key: &str) -> &Mutex<LruCache<String, CacheEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % self.shards.len()]
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // Err() is possible only if a thread panicked while holding the lock, which should never
    // happen as no user code runs under it.
    mutex
        .lock()
        .expect("thread holding cache lock should not panic")
}
