//! Process-local session state.
//!
//! Two maps survive across lifecycle events: the set of threads that already
//! received recalled context, and the last triage time per thread. Both live
//! here, owned by one [`PolicyEngine`](crate::PolicyEngine), so tests can build
//! isolated instances. The maps are mutex-guarded because hosts may dispatch
//! events concurrently, and each check-then-record transition
//! ([`SessionState::claim_recall`], [`SessionState::try_begin_triage`]) runs
//! under a single lock acquisition.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

/// Cooldown entries older than this are dropped by the sweep.
pub const COOLDOWN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The sweep runs once the cooldown map grows past this many entries.
pub const COOLDOWN_SWEEP_THRESHOLD: usize = 512;

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Millisecond wall clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Real time via `chrono`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Start at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self { now: AtomicU64::new(start_ms) }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let _ = self.now.fetch_add(millis(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionState
// ─────────────────────────────────────────────────────────────────────────────

fn cooling(map: &HashMap<String, u64>, thread_id: &str, now_ms: u64, interval: Duration) -> bool {
    map.get(thread_id)
        .is_some_and(|&last| now_ms.saturating_sub(last) < millis(interval))
}

/// Recalled-thread set and triage cooldown map.
#[derive(Debug, Default)]
pub struct SessionState {
    recalled: Mutex<HashSet<String>>,
    cooldowns: Mutex<HashMap<String, u64>>,
}

impl SessionState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether context was already injected into `thread_id`.
    pub fn was_recalled(&self, thread_id: &str) -> bool {
        self.recalled.lock().contains(thread_id)
    }

    /// Claim `thread_id` for recall. Returns `false` if it was already
    /// claimed, by an earlier turn or by one still in flight.
    pub fn claim_recall(&self, thread_id: &str) -> bool {
        self.recalled.lock().insert(thread_id.to_string())
    }

    /// Give back a claim whose recall injected nothing.
    pub fn release_recall(&self, thread_id: &str) {
        let _ = self.recalled.lock().remove(thread_id);
    }

    /// Number of threads marked recalled.
    pub fn recalled_len(&self) -> usize {
        self.recalled.lock().len()
    }

    /// Whether `thread_id` was triaged less than `interval` before `now_ms`.
    pub fn in_cooldown(&self, thread_id: &str, now_ms: u64, interval: Duration) -> bool {
        cooling(&self.cooldowns.lock(), thread_id, now_ms, interval)
    }

    /// Start a triage for `thread_id` unless it is in cooldown.
    ///
    /// Returns `true` and records `now_ms` when the caller may triage; at most
    /// one of several concurrent callers for the same thread gets `true`.
    pub fn try_begin_triage(&self, thread_id: &str, now_ms: u64, interval: Duration) -> bool {
        let mut map = self.cooldowns.lock();
        if cooling(&map, thread_id, now_ms, interval) {
            return false;
        }
        let _ = map.insert(thread_id.to_string(), now_ms);
        if map.len() > COOLDOWN_SWEEP_THRESHOLD {
            let ttl = millis(COOLDOWN_TTL);
            let before = map.len();
            map.retain(|_, &mut last| now_ms.saturating_sub(last) < ttl);
            debug!(evicted = before - map.len(), remaining = map.len(), "cooldown sweep");
        }
        true
    }

    /// Number of cooldown entries.
    pub fn cooldown_len(&self) -> usize {
        self.cooldowns.lock().len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
