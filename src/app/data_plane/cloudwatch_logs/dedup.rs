//! Event deduplication
//!
//! Overlapping filter queries return the same events again and again. The
//! [`Deduplicator`] remembers every event identifier it has let through for
//! one session and answers whether a freshly fetched event should be
//! delivered.
//!
//! `observe` only decides; it never delivers. Callers build and send the
//! event after the call returns, so a blocking channel send never happens
//! while the dedup lock is held.

#![warn(clippy::all, rust_2018_idioms)]

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default number of identifiers after which old entries are swept
pub const DEFAULT_SIZE_LIMIT: usize = 50_000;

/// Default age after which an entry may be swept
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct DedupState {
    ids: HashMap<String, i64>,
    last_timestamp: i64,
}

/// Time-limited set of seen event identifiers
///
/// The size limit is a soft bound: once the map is about to reach it, every
/// entry older than the TTL is swept, but entries younger than the TTL are
/// kept even if that leaves the map above the limit.
#[derive(Debug)]
pub struct Deduplicator {
    size_limit: usize,
    ttl: Duration,
    state: Mutex<DedupState>,
}

impl Deduplicator {
    /// Create a deduplicator; non-positive limits fall back to the defaults
    pub fn new(size_limit: i64, ttl: Duration) -> Self {
        let size_limit = if size_limit <= 0 {
            DEFAULT_SIZE_LIMIT
        } else {
            usize::try_from(size_limit).unwrap_or(DEFAULT_SIZE_LIMIT)
        };
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };

        Self {
            size_limit,
            ttl,
            state: Mutex::new(DedupState::default()),
        }
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record `event_id` if unseen; returns whether it was newly recorded
    pub fn observe(&self, event_id: &str, timestamp: i64) -> bool {
        self.observe_at(event_id, timestamp, chrono::Utc::now().timestamp_millis())
    }

    /// [`observe`](Self::observe) with an explicit wall clock (Unix milliseconds)
    pub fn observe_at(&self, event_id: &str, timestamp: i64, now_ms: i64) -> bool {
        let mut state = self.lock();
        if state.ids.contains_key(event_id) {
            return false;
        }

        if state.ids.len() + 1 >= self.size_limit {
            let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
            let oldest_alive = now_ms.saturating_sub(ttl_ms);
            let before = state.ids.len();
            state.ids.retain(|_, seen| *seen > oldest_alive);
            trace_trace!(
                "Dedup sweep evicted {} of {} entries",
                before - state.ids.len(),
                before
            );
        }

        state.ids.insert(event_id.to_string(), timestamp);
        if timestamp > state.last_timestamp {
            state.last_timestamp = timestamp;
        }
        true
    }

    /// High-water mark: the latest event timestamp recorded so far (0 if none)
    pub fn last_timestamp(&self) -> i64 {
        self.lock().last_timestamp
    }

    /// Whether `event_id` is currently remembered
    pub fn contains(&self, event_id: &str) -> bool {
        self.lock().ids.contains_key(event_id)
    }

    pub fn len(&self) -> usize {
        self.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().ids.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, DedupState> {
        // The state is consistent after every statement, so a panic in
        // another holder leaves nothing half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_LIMIT as i64, DEFAULT_TTL)
    }
}
