//! Fixed-window admission control for the free tier.
//!
//! Each caller identity gets a counter that resets a fixed duration after its
//! first request. [`RateLimiter::check`] is the single entry point: it never
//! fails, and every admission decision is an ordinary return value. The
//! backing store is injected so the in-memory default can be swapped for an
//! external cache without touching the admission logic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Free-tier request allowance per identity per window.
pub const DEFAULT_LIMIT: u32 = 5;

/// Window length after which an identity's count resets.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Bucket used when the caller's identity cannot be determined.
///
/// Degrades to one shared allowance instead of failing closed.
pub const FALLBACK_IDENTITY: &str = "unknown";

const DEFAULT_STORE_CAPACITY: usize = 4096;

/// Limiter tuning, configurable without code changes.
#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    pub limit: u32,
    pub window: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// Epoch milliseconds at which the window resets.
    pub reset_at: u64,
}

/// Per-identity counter state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRecord {
    pub count: u32,
    pub reset_at: u64,
}

/// Backing store for quota records.
///
/// `get`/`set` is the whole contract: the limiter owns all interpretation of
/// the records, so an external cache only has to round-trip them.
pub trait QuotaStore: Send {
    fn get(&mut self, identity: &str) -> Option<QuotaRecord>;
    fn set(&mut self, identity: &str, record: QuotaRecord);
}

/// In-memory store capped at a fixed number of identities.
///
/// When full, the least recently touched entry is evicted. An unbounded map
/// would grow with every distinct caller address for the life of the process.
pub struct BoundedStore {
    capacity: usize,
    tick: u64,
    entries: HashMap<String, (QuotaRecord, u64)>,
}

impl BoundedStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, (_, touched))| *touched)
            .map(|(identity, _)| identity.clone());
        if let Some(identity) = oldest {
            tracing::debug!(%identity, "evicting quota record");
            self.entries.remove(&identity);
        }
    }
}

impl Default for BoundedStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_CAPACITY)
    }
}

impl QuotaStore for BoundedStore {
    fn get(&mut self, identity: &str) -> Option<QuotaRecord> {
        let tick = self.next_tick();
        let (record, touched) = self.entries.get_mut(identity)?;
        *touched = tick;
        Some(record.clone())
    }

    fn set(&mut self, identity: &str, record: QuotaRecord) {
        let tick = self.next_tick();
        if !self.entries.contains_key(identity) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(identity.to_string(), (record, tick));
    }
}

/// Time source, injectable so tests can advance a simulated clock.
pub trait Clock: Send + Sync {
    /// Current time as epoch milliseconds.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Free-tier limiter with a fixed window per identity.
///
/// The read-check-increment sequence for one identity runs under a single
/// lock, so two concurrent calls racing for the last slot cannot both win.
pub struct RateLimiter {
    config: QuotaConfig,
    clock: Arc<dyn Clock>,
    store: Mutex<Box<dyn QuotaStore>>,
}

impl RateLimiter {
    pub fn new(config: QuotaConfig) -> Self {
        Self::with_parts(config, Box::new(BoundedStore::default()), Arc::new(SystemClock))
    }

    /// Build with an explicit store and clock.
    pub fn with_parts(
        config: QuotaConfig,
        store: Box<dyn QuotaStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            clock,
            store: Mutex::new(store),
        }
    }

    pub fn limit(&self) -> u32 {
        self.config.limit
    }

    /// Current time from the limiter's clock, for countdown display.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Admission check for one request from `identity`.
    ///
    /// Never fails: an empty identity falls back to a shared bucket, and a
    /// poisoned lock is recovered rather than propagated. The slot is spent
    /// here, before any upstream call the caller goes on to make.
    pub fn check(&self, identity: &str) -> Decision {
        let identity = if identity.is_empty() {
            FALLBACK_IDENTITY
        } else {
            identity
        };
        let now = self.clock.now_ms();
        let limit = self.config.limit;

        let mut store = self
            .store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match store.get(identity) {
            // Within the window: deny at the limit, otherwise count the call.
            Some(record) if now <= record.reset_at => {
                if record.count >= limit {
                    tracing::debug!(identity, reset_at = record.reset_at, "quota exhausted");
                    return Decision {
                        allowed: false,
                        remaining: 0,
                        reset_at: record.reset_at,
                    };
                }
                let count = record.count + 1;
                let reset_at = record.reset_at;
                store.set(identity, QuotaRecord { count, reset_at });
                Decision {
                    allowed: true,
                    remaining: limit - count,
                    reset_at,
                }
            }
            // First sighting, or the window lapsed: start a fresh record.
            _ => {
                let reset_at = now + self.config.window.as_millis() as u64;
                store.set(identity, QuotaRecord { count: 1, reset_at });
                Decision {
                    allowed: true,
                    remaining: limit.saturating_sub(1),
                    reset_at,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn at(ms: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(ms)))
        }

        fn advance(&self, ms: u64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn limiter_at(clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::with_parts(
            QuotaConfig::default(),
            Box::new(BoundedStore::default()),
            clock,
        )
    }

    #[test]
    fn remaining_counts_down_to_zero() {
        let limiter = limiter_at(ManualClock::at(1_000));

        for expected in [4, 3, 2, 1, 0] {
            let decision = limiter.check("10.0.0.1");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
        }

        let denied = limiter.check("10.0.0.1");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn window_reset_restores_allowance() {
        let clock = ManualClock::at(1_000);
        let limiter = limiter_at(clock.clone());

        for _ in 0..5 {
            assert!(limiter.check("10.0.0.2").allowed);
        }
        assert!(!limiter.check("10.0.0.2").allowed);

        clock.advance(DEFAULT_WINDOW.as_millis() as u64 + 1);

        let decision = limiter.check("10.0.0.2");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn denial_does_not_extend_the_window() {
        let clock = ManualClock::at(1_000);
        let limiter = limiter_at(clock.clone());

        for _ in 0..5 {
            limiter.check("10.0.0.3");
        }
        let first_denial = limiter.check("10.0.0.3");
        clock.advance(60_000);
        let second_denial = limiter.check("10.0.0.3");

        assert!(!first_denial.allowed);
        assert!(!second_denial.allowed);
        assert_eq!(first_denial.reset_at, second_denial.reset_at);
    }

    #[test]
    fn concurrent_checks_admit_exactly_the_limit() {
        let limiter = Arc::new(limiter_at(ManualClock::at(1_000)));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.check("10.0.0.4").allowed)
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&allowed| allowed)
            .count();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn empty_identity_uses_the_fallback_bucket() {
        let limiter = limiter_at(ManualClock::at(1_000));

        assert_eq!(limiter.check("").remaining, 4);
        // Same bucket as the named fallback.
        assert_eq!(limiter.check(FALLBACK_IDENTITY).remaining, 3);
        assert_eq!(limiter.check("").remaining, 2);
    }

    #[test]
    fn identities_do_not_share_buckets() {
        let limiter = limiter_at(ManualClock::at(1_000));

        for _ in 0..5 {
            assert!(limiter.check("10.0.0.5").allowed);
        }
        assert!(!limiter.check("10.0.0.5").allowed);
        assert!(limiter.check("10.0.0.6").allowed);
    }

    #[test]
    fn full_window_lifecycle() {
        let clock = ManualClock::at(50_000);
        let limiter = limiter_at(clock.clone());

        let remaining: Vec<u32> = (0..5).map(|_| limiter.check("1.2.3.4").remaining).collect();
        assert_eq!(remaining, [4, 3, 2, 1, 0]);

        let sixth = limiter.check("1.2.3.4");
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);

        clock.advance(DEFAULT_WINDOW.as_millis() as u64 + 1);

        let seventh = limiter.check("1.2.3.4");
        assert!(seventh.allowed);
        assert_eq!(seventh.remaining, 4);
    }

    #[test]
    fn bounded_store_evicts_least_recently_touched() {
        let mut store = BoundedStore::new(2);
        let record = QuotaRecord {
            count: 1,
            reset_at: 10,
        };

        store.set("a", record.clone());
        store.set("b", record.clone());
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(store.get("a").is_some());
        store.set("c", record);

        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert!(store.get("c").is_some());
    }
}
