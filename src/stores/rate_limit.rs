//! Fixed-window, per-identifier request quota that survives restarts.
//!
//! Each identifier gets a counter and a reset instant. The first request
//! after the reset instant opens a new window with `count = 1`. Because the
//! window is fixed rather than sliding, a burst straddling a boundary can see
//! up to `2 * max_requests` admissions in quick succession.
//!
//! State is written through to storage on every admitted request and on
//! explicit clears; a background task also re-persists the map every 30 s and
//! drops elapsed windows every 60 s.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::constants::{
    DEFAULT_MAX_REQUESTS, DEFAULT_TIME_WINDOW, RATE_LIMITS_KEY, RATE_LIMIT_FLUSH_INTERVAL,
    RATE_LIMIT_SWEEP_INTERVAL,
};
use crate::storage::{self, KeyValueStore};
use crate::utils::clock::{from_millis, Clock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            time_window: DEFAULT_TIME_WINDOW,
        }
    }
}

/// Counter for one identifier. Only meaningful while `now < reset_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEntry {
    pub count: u32,
    /// Epoch milliseconds at which the window closes.
    pub reset_time: i64,
}

impl RateLimitEntry {
    fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.reset_time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitStat {
    pub identifier: String,
    pub remaining: u32,
    /// Seconds until the window closes, never negative.
    pub resets_in: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitStats {
    pub active_limits: usize,
    pub limits: Vec<LimitStat>,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    limits: Mutex<HashMap<String, RateLimitEntry>>,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    maintenance: Mutex<Option<CancellationToken>>,
}

impl RateLimiter {
    /// Creates the limiter and restores any unexpired windows from storage.
    pub fn new(
        config: RateLimitConfig,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = Self {
            config,
            limits: Mutex::new(HashMap::new()),
            storage,
            clock,
            maintenance: Mutex::new(None),
        };
        limiter.load_limits();
        limiter
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    fn limits(&self) -> MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        self.limits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn window_millis(&self) -> i64 {
        i64::try_from(self.config.time_window.as_millis()).unwrap_or(i64::MAX)
    }

    fn load_limits(&self) {
        let stored: HashMap<String, RateLimitEntry> =
            match storage::read_json(self.storage.as_ref(), RATE_LIMITS_KEY) {
                Ok(Some(stored)) => stored,
                Ok(None) => return,
                Err(err) => {
                    error!("Error loading rate limits: {err}");
                    return;
                }
            };

        let now = self.clock.now_millis();
        let mut limits = self.limits();
        limits.extend(stored.into_iter().filter(|(_, entry)| entry.is_live(now)));
        debug!(restored = limits.len(), "Loaded rate limits");
    }

    fn persist(&self, limits: &HashMap<String, RateLimitEntry>) {
        if let Err(err) = storage::write_json(self.storage.as_ref(), RATE_LIMITS_KEY, limits) {
            error!("Error saving rate limits: {err}");
        }
    }

    /// Admits or denies one request for `identifier`.
    pub fn check_limit(&self, identifier: &str) -> bool {
        let now = self.clock.now_millis();
        let mut limits = self.limits();

        match limits.get_mut(identifier) {
            Some(entry) if entry.is_live(now) => {
                if entry.count >= self.config.max_requests {
                    debug!(identifier, "Rate limit reached");
                    return false;
                }
                entry.count += 1;
            }
            _ => {
                limits.insert(
                    identifier.to_string(),
                    RateLimitEntry {
                        count: 1,
                        reset_time: now.saturating_add(self.window_millis()),
                    },
                );
            }
        }

        self.persist(&limits);
        true
    }

    pub fn remaining_requests(&self, identifier: &str) -> u32 {
        let now = self.clock.now_millis();
        match self.limits().get(identifier) {
            Some(entry) if entry.is_live(now) => {
                self.config.max_requests.saturating_sub(entry.count)
            }
            _ => self.config.max_requests,
        }
    }

    /// When the current window for `identifier` closes; `None` if there is no live window.
    pub fn reset_time(&self, identifier: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now_millis();
        self.limits()
            .get(identifier)
            .filter(|entry| entry.is_live(now))
            .map(|entry| from_millis(entry.reset_time))
    }

    pub fn clear_limit(&self, identifier: &str) {
        let mut limits = self.limits();
        limits.remove(identifier);
        self.persist(&limits);
    }

    pub fn clear_all_limits(&self) {
        self.limits().clear();
        if let Err(err) = self.storage.remove_item(RATE_LIMITS_KEY) {
            error!("Error clearing rate limits: {err}");
        }
    }

    /// Writes the whole in-memory map to storage.
    pub fn flush(&self) {
        let limits = self.limits();
        self.persist(&limits);
    }

    /// Drops every elapsed window and re-persists the reduced map.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let mut limits = self.limits();
        let before = limits.len();
        limits.retain(|_, entry| entry.is_live(now));
        let removed = before - limits.len();
        if removed > 0 {
            debug!(removed, "Swept expired rate limits");
        }
        self.persist(&limits);
        removed
    }

    pub fn limit_stats(&self) -> LimitStats {
        let now = self.clock.now_millis();
        let limits = self.limits();
        let mut stats: Vec<LimitStat> = limits
            .iter()
            .map(|(identifier, entry)| LimitStat {
                identifier: identifier.clone(),
                remaining: self.config.max_requests.saturating_sub(entry.count),
                resets_in: (entry.reset_time - now).max(0) as f64 / 1000.0,
            })
            .collect();
        stats.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        LimitStats {
            active_limits: limits.len(),
            limits: stats,
        }
    }

    /// Starts the periodic flush and sweep on the current tokio runtime.
    pub fn spawn_maintenance(self: &Arc<Self>) {
        self.spawn_maintenance_every(RATE_LIMIT_FLUSH_INTERVAL, RATE_LIMIT_SWEEP_INTERVAL);
    }

    pub fn spawn_maintenance_every(self: &Arc<Self>, flush_every: Duration, sweep_every: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available; rate limit maintenance not started");
            return;
        };

        let mut maintenance = self
            .maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if maintenance.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *maintenance = Some(token.clone());

        let limiter: Weak<Self> = Arc::downgrade(self);
        runtime.spawn(async move {
            let start = tokio::time::Instant::now();
            let mut flush = tokio::time::interval_at(start + flush_every, flush_every);
            let mut sweep = tokio::time::interval_at(start + sweep_every, sweep_every);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = flush.tick() => {
                        let Some(limiter) = limiter.upgrade() else { break };
                        limiter.flush();
                    }
                    _ = sweep.tick() => {
                        let Some(limiter) = limiter.upgrade() else { break };
                        limiter.sweep();
                    }
                }
            }
            debug!("Rate limit maintenance stopped");
        });
    }

    /// Stops the background flush and sweep.
    pub fn shutdown(&self) {
        if let Some(token) = self
            .maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_helpers::FlakyStore;
    use crate::storage::MemoryStore;
    use crate::utils::clock::ManualClock;

    fn small_config() -> RateLimitConfig {
        RateLimitConfig {
            max_requests: 3,
            time_window: Duration::from_secs(60),
        }
    }

    fn limiter() -> (Arc<ManualClock>, Arc<MemoryStore>, RateLimiter) {
        let clock = Arc::new(ManualClock::starting_now());
        let storage = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(small_config(), storage.clone(), clock.clone());
        (clock, storage, limiter)
    }

    fn stored(storage: &MemoryStore) -> HashMap<String, RateLimitEntry> {
        storage::read_json(storage, RATE_LIMITS_KEY)
            .unwrap()
            .unwrap_or_default()
    }

    #[test]
    fn admits_up_to_max_then_denies() {
        let (_clock, _storage, limiter) = limiter();
        let results: Vec<bool> = (0..4).map(|_| limiter.check_limit("x")).collect();
        assert_eq!(results, vec![true, true, true, false]);
        assert_eq!(limiter.remaining_requests("x"), 0);
    }

    #[test]
    fn window_reset_restores_quota() {
        let (clock, _storage, limiter) = limiter();
        for _ in 0..4 {
            limiter.check_limit("x");
        }
        let reset = limiter.reset_time("x").expect("live window");

        clock.set(reset);
        assert_eq!(limiter.reset_time("x"), None);
        assert!(limiter.check_limit("x"));
        assert_eq!(limiter.remaining_requests("x"), 2);
        assert_eq!(
            limiter.reset_time("x"),
            Some(reset + chrono::Duration::seconds(60))
        );
    }

    #[test]
    fn identifiers_are_independent() {
        let (_clock, _storage, limiter) = limiter();
        for _ in 0..3 {
            assert!(limiter.check_limit("a"));
        }
        assert!(!limiter.check_limit("a"));
        assert!(limiter.check_limit("b"));
        assert_eq!(limiter.remaining_requests("b"), 2);
        assert_eq!(limiter.remaining_requests("unknown"), 3);
        assert_eq!(limiter.reset_time("unknown"), None);
    }

    #[test]
    fn admitted_requests_are_written_through() {
        let (clock, storage, limiter) = limiter();
        limiter.check_limit("x");
        limiter.check_limit("x");

        let entry = stored(&storage)["x"];
        assert_eq!(entry.count, 2);
        assert_eq!(entry.reset_time, clock.now_millis() + 60_000);
    }

    #[test]
    fn denied_requests_do_not_mutate_or_persist() {
        let clock = Arc::new(ManualClock::starting_now());
        let storage = Arc::new(FlakyStore::new());
        let limiter = RateLimiter::new(small_config(), storage.clone(), clock);
        for _ in 0..3 {
            limiter.check_limit("x");
        }
        let writes = storage.write_count();

        assert!(!limiter.check_limit("x"));
        assert_eq!(storage.write_count(), writes);
        assert_eq!(limiter.limit_stats().limits[0].remaining, 0);
    }

    #[test]
    fn state_survives_reconstruction() {
        let (clock, storage, limiter) = limiter();
        limiter.check_limit("x");
        limiter.check_limit("x");
        drop(limiter);

        let reloaded = RateLimiter::new(small_config(), storage.clone(), clock.clone());
        assert_eq!(reloaded.remaining_requests("x"), 1);
        assert!(reloaded.check_limit("x"));
        assert!(!reloaded.check_limit("x"));
    }

    #[test]
    fn expired_windows_are_not_restored() {
        let (clock, storage, limiter) = limiter();
        limiter.check_limit("old");
        clock.advance(chrono::Duration::seconds(30));
        limiter.check_limit("fresh");
        drop(limiter);

        clock.advance(chrono::Duration::seconds(31));
        let reloaded = RateLimiter::new(small_config(), storage, clock);
        let stats = reloaded.limit_stats();
        assert_eq!(stats.active_limits, 1);
        assert_eq!(stats.limits[0].identifier, "fresh");
    }

    #[test]
    fn fixed_window_allows_boundary_burst() {
        let (clock, _storage, limiter) = limiter();
        assert!(limiter.check_limit("x"));
        clock.advance(chrono::Duration::seconds(59));
        assert!(limiter.check_limit("x"));
        assert!(limiter.check_limit("x"));
        clock.advance(chrono::Duration::seconds(1));
        // New window: another full quota right away.
        assert!(limiter.check_limit("x"));
        assert!(limiter.check_limit("x"));
        assert!(limiter.check_limit("x"));
        assert!(!limiter.check_limit("x"));
    }

    #[test]
    fn clear_limit_and_clear_all_persist() {
        let (_clock, storage, limiter) = limiter();
        limiter.check_limit("a");
        limiter.check_limit("b");

        limiter.clear_limit("a");
        assert_eq!(limiter.remaining_requests("a"), 3);
        let persisted = stored(&storage);
        assert!(!persisted.contains_key("a"));
        assert!(persisted.contains_key("b"));

        limiter.clear_all_limits();
        assert_eq!(limiter.limit_stats().active_limits, 0);
        assert!(storage.get_item(RATE_LIMITS_KEY).unwrap().is_none());
    }

    #[test]
    fn sweep_drops_elapsed_windows_and_persists() {
        let (clock, storage, limiter) = limiter();
        limiter.check_limit("old");
        clock.advance(chrono::Duration::seconds(45));
        limiter.check_limit("fresh");
        clock.advance(chrono::Duration::seconds(20));

        assert_eq!(limiter.sweep(), 1);
        let persisted = stored(&storage);
        assert_eq!(persisted.len(), 1);
        assert!(persisted.contains_key("fresh"));
    }

    #[test]
    fn stats_report_remaining_and_seconds_until_reset() {
        let (clock, _storage, limiter) = limiter();
        limiter.check_limit("x");
        limiter.check_limit("x");
        clock.advance(chrono::Duration::milliseconds(15_500));

        let stats = limiter.limit_stats();
        assert_eq!(stats.active_limits, 1);
        assert_eq!(
            stats.limits,
            vec![LimitStat {
                identifier: "x".to_string(),
                remaining: 1,
                resets_in: 44.5,
            }]
        );
    }

    #[test]
    fn corrupt_storage_starts_empty() {
        let clock = Arc::new(ManualClock::starting_now());
        let storage = Arc::new(MemoryStore::new());
        storage.set_item(RATE_LIMITS_KEY, "[[[").unwrap();

        let limiter = RateLimiter::new(small_config(), storage, clock);
        assert_eq!(limiter.limit_stats().active_limits, 0);
        assert!(limiter.check_limit("x"));
    }

    #[test]
    fn failing_storage_never_blocks_admission() {
        let clock = Arc::new(ManualClock::starting_now());
        let limiter = RateLimiter::new(small_config(), Arc::new(FlakyStore::failing()), clock);

        assert!(limiter.check_limit("x"));
        limiter.clear_limit("x");
        limiter.clear_all_limits();
        limiter.flush();
        assert_eq!(limiter.sweep(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_flushes_and_sweeps_until_shutdown() {
        let clock = Arc::new(ManualClock::starting_now());
        let storage = Arc::new(MemoryStore::new());
        let limiter = Arc::new(RateLimiter::new(
            small_config(),
            storage.clone(),
            clock.clone(),
        ));
        limiter.check_limit("x");
        limiter.spawn_maintenance();

        // Wipe storage behind the limiter's back; the 30 s flush restores it.
        storage.remove_item(RATE_LIMITS_KEY).unwrap();
        tokio::time::sleep(RATE_LIMIT_FLUSH_INTERVAL + Duration::from_millis(10)).await;
        assert!(stored(&storage).contains_key("x"));

        clock.advance(chrono::Duration::seconds(61));
        tokio::time::sleep(RATE_LIMIT_SWEEP_INTERVAL).await;
        assert_eq!(limiter.limit_stats().active_limits, 0);

        limiter.shutdown();
        limiter.check_limit("y");
        storage.remove_item(RATE_LIMITS_KEY).unwrap();
        tokio::time::sleep(RATE_LIMIT_SWEEP_INTERVAL * 3).await;
        assert!(storage.get_item(RATE_LIMITS_KEY).unwrap().is_none());
    }
}
