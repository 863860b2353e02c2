//! Expiring in-memory key/value cache.
//!
//! Expired entries are never returned: reads check the age of the entry and
//! drop it lazily. A background sweeper additionally removes expired entries
//! on a fixed interval so memory stays bounded when nobody reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::constants::CACHE_SWEEP_INTERVAL;
use crate::utils::clock::Clock;

/// Per-entry options for [`TtlCache::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Entries older than this are treated as absent. `None` (or zero) never expires.
    pub max_age: Option<Duration>,
}

impl CacheOptions {
    pub fn max_age(max_age: Duration) -> Self {
        Self {
            max_age: Some(max_age),
        }
    }
}

struct CacheEntry<V> {
    value: V,
    timestamp: DateTime<Utc>,
    max_age: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn ttl(&self) -> Option<Duration> {
        self.max_age.filter(|age| !age.is_zero())
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl() else {
            return false;
        };
        match (now - self.timestamp).to_std() {
            Ok(elapsed) => elapsed > ttl,
            // Clock moved backwards; the entry is younger than zero.
            Err(_) => false,
        }
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.ttl()?).ok()?;
        self.timestamp.checked_add_signed(ttl)
    }
}

/// Diagnostic view of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryStats {
    pub key: String,
    pub age: Duration,
    /// `None` means the entry never expires.
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<CacheEntryStats>,
}

pub struct TtlCache<V> {
    store: Mutex<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
    sweeper: Mutex<Option<CancellationToken>>,
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            clock,
            sweeper: Mutex::new(None),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value`, replacing whatever was under `key`.
    pub fn set(&self, key: impl Into<String>, value: V, options: CacheOptions) {
        let entry = CacheEntry {
            value,
            timestamp: self.clock.now(),
            max_age: options.max_age,
        };
        self.entries().insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn delete(&self, key: &str) {
        self.entries().remove(key);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.entries();
        let mut stats: Vec<CacheEntryStats> = entries
            .iter()
            .map(|(key, entry)| CacheEntryStats {
                key: key.clone(),
                age: (now - entry.timestamp).to_std().unwrap_or_default(),
                expires: entry.expires_at(),
            })
            .collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        CacheStats {
            size: entries.len(),
            entries: stats,
        }
    }

    /// Starts the periodic sweep on the current tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        self.spawn_sweeper_every(CACHE_SWEEP_INTERVAL);
    }

    /// Like [`spawn_sweeper`](Self::spawn_sweeper) with a custom period.
    /// Does nothing if a sweeper is already running.
    pub fn spawn_sweeper_every(self: &Arc<Self>, period: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available; cache sweeper not started");
            return;
        };

        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *sweeper = Some(token.clone());

        let cache: Weak<Self> = Arc::downgrade(self);
        runtime.spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        cache.sweep();
                    }
                }
            }
            debug!("Cache sweeper stopped");
        });
    }

    /// Stops the background sweep. Entries are left untouched.
    pub fn destroy(&self) {
        if let Some(token) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}

impl<V> Drop for TtlCache<V> {
    fn drop(&mut self) {
        if let Some(token) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}
