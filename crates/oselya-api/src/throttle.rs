//! Login throttling on top of a small expiring-counter store.
//!
//! Two independent limits apply to every login attempt:
//! a per-IP attempt budget over a short window, and a per-(IP, username)
//! failure counter that locks that pair out for a while once it fills up.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::clock::Clock;

/// Expiring integer counters keyed by string.
///
/// Expired keys read as absent. `incr` is atomic per key and re-arms the
/// key's expiry on every call.
pub trait CounterStore: Send + Sync {
    fn get(&self, key: &str) -> u64;
    fn incr(&self, key: &str, ttl_secs: u64) -> u64;
    fn set(&self, key: &str, value: u64, ttl_secs: u64);
    fn delete(&self, key: &str);
}

struct Counter {
    value: u64,
    expires_at: DateTime<Utc>,
}

/// Process-local counter store.
pub struct MemoryCounterStore {
    entries: DashMap<String, Counter>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, counter| counter.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn expiry(now: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    now + Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1000))
}

impl CounterStore for MemoryCounterStore {
    fn get(&self, key: &str) -> u64 {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|counter| counter.expires_at > now)
            .map(|counter| counter.value)
            .unwrap_or(0)
    }

    fn incr(&self, key: &str, ttl_secs: u64) -> u64 {
        let now = self.clock.now();
        let mut counter = self.entries.entry(key.to_string()).or_insert(Counter {
            value: 0,
            expires_at: now,
        });
        if counter.expires_at <= now {
            counter.value = 0;
        }
        counter.value += 1;
        counter.expires_at = expiry(now, ttl_secs);
        counter.value
    }

    fn set(&self, key: &str, value: u64, ttl_secs: u64) {
        let now = self.clock.now();
        self.entries.insert(
            key.to_string(),
            Counter {
                value,
                expires_at: expiry(now, ttl_secs),
            },
        );
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThrottlePolicy {
    pub max_attempts_per_ip: u64,
    pub window_secs: u64,
    pub max_failures: u64,
    pub lock_secs: u64,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_ip: 5,
            window_secs: 60,
            max_failures: 10,
            lock_secs: 15 * 60,
        }
    }
}

pub struct LoginThrottle {
    store: Arc<dyn CounterStore>,
    policy: ThrottlePolicy,
}

/// Lower-cased, trimmed username used in counter keys.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

impl LoginThrottle {
    pub fn new(store: Arc<dyn CounterStore>, policy: ThrottlePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    /// Count one attempt from `ip`. Returns false once the IP has used up
    /// its budget for the current window; refused attempts leave the window
    /// as it is.
    pub fn allow_attempt(&self, ip: &str) -> bool {
        let key = window_key(ip);
        let attempts = self.store.get(&key);
        if attempts >= self.policy.max_attempts_per_ip {
            debug!("Login attempt budget exhausted for {} ({} attempts)", ip, attempts);
            return false;
        }
        self.store.incr(&key, self.policy.window_secs);
        true
    }

    pub fn is_locked(&self, ip: &str, username: &str) -> bool {
        self.store.get(&lock_key(ip, username)) > 0
    }

    /// Record a failed login for the pair, locking it when the failure
    /// count reaches the limit.
    pub fn register_failure(&self, ip: &str, username: &str) {
        let failures = self
            .store
            .incr(&fail_key(ip, username), self.policy.lock_secs);
        if failures >= self.policy.max_failures {
            self.store
                .set(&lock_key(ip, username), 1, self.policy.lock_secs);
            warn!(
                "Locked logins for {:?} from {} after {} failures",
                normalize_username(username),
                ip,
                failures
            );
        }
    }

    /// Forget failures and any lock for the pair after a successful login.
    pub fn clear(&self, ip: &str, username: &str) {
        self.store.delete(&fail_key(ip, username));
        self.store.delete(&lock_key(ip, username));
    }

    pub fn failures(&self, ip: &str, username: &str) -> u64 {
        self.store.get(&fail_key(ip, username))
    }
}

fn window_key(ip: &str) -> String {
    format!("auth:window:{ip}")
}

fn fail_key(ip: &str, username: &str) -> String {
    format!("auth:fail:{ip}:{}", normalize_username(username))
}

fn lock_key(ip: &str, username: &str) -> String {
    format!("auth:lock:{ip}:{}", normalize_username(username))
}

/// Periodically evict expired counters so idle keys don't accumulate.
pub async fn run_sweep_loop(store: Arc<MemoryCounterStore>, every_secs: u64) {
    let mut interval = tokio::time::interval(StdDuration::from_secs(every_secs.max(1)));

    loop {
        interval.tick().await;
        let removed = store.evict_expired();
        if removed > 0 {
            debug!("Throttle sweep evicted {} expired counters", removed);
        }
    }
}
