//! Consecutive-denial tracking per (origin, subject) pair.
//!
//! Escalation is scoped to "identified but unauthorized" events: a subject
//! the matcher recognized who has no grant for the device's zone. Outcomes
//! where no subject was identified never touch the tracker.
//!
//! The map is sharded so same-key transitions are linearized under one lock
//! while unrelated keys proceed in parallel. Entries live only in process
//! memory and are evicted after a configurable idle window.

use crate::types::SubjectId;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// Consecutive denials that fire an alert.
pub const DEFAULT_ALERT_THRESHOLD: u32 = 3;

/// Idle window after which an entry may be evicted.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const SHARD_COUNT: usize = 16;

/// Tracker key. Keyed by origin AND subject: one device's failures never
/// count against the same subject at another device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    pub origin: String,
    pub subject: SubjectId,
}

impl AttemptKey {
    pub fn new(origin: impl Into<String>, subject: SubjectId) -> Self {
        Self {
            origin: origin.into(),
            subject,
        }
    }
}

/// Escalation state observed by one recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No consecutive denials on record.
    Clear,
    /// Some denials, still under the alert threshold.
    Warning(u32),
    /// The threshold was reached by this event. A pulse, not a lockout:
    /// the stored count is already back at zero.
    AlertTriggered,
}

struct Entry {
    count: u32,
    touched: Instant,
}

/// Sharded in-memory attempt counter map.
pub struct AttemptTracker {
    shards: Vec<Mutex<HashMap<AttemptKey, Entry>>>,
    threshold: u32,
    idle_ttl: Duration,
}

impl AttemptTracker {
    pub fn new(threshold: u32, idle_ttl: Duration) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            shards,
            // A zero threshold would make every denial an alert before the
            // first warning; clamp to at least one.
            threshold: threshold.max(1),
            idle_ttl,
        }
    }

    fn shard(&self, key: &AttemptKey) -> &Mutex<HashMap<AttemptKey, Entry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Record one denial for the key.
    ///
    /// Returns the state after the event and the consecutive count the
    /// event observed. Reaching the threshold reports `AlertTriggered` and
    /// resets the stored count to zero in the same critical section, so a
    /// fourth consecutive denial starts a fresh count at one.
    pub fn record_denial(&self, key: &AttemptKey, now: Instant) -> (TrackerState, u32) {
        let mut shard = self.shard(key).lock();
        let entry = shard.entry(key.clone()).or_insert(Entry {
            count: 0,
            touched: now,
        });
        entry.count += 1;
        entry.touched = now;

        if entry.count >= self.threshold {
            let observed = entry.count;
            entry.count = 0;
            tracing::warn!(
                origin = %key.origin,
                subject = key.subject,
                observed,
                "consecutive denials reached alert threshold"
            );
            (TrackerState::AlertTriggered, observed)
        } else {
            (TrackerState::Warning(entry.count), entry.count)
        }
    }

    /// A grant wipes the slate for the key, from any state.
    pub fn reset(&self, key: &AttemptKey) {
        self.shard(key).lock().remove(key);
    }

    /// Current state for a key, without recording anything.
    pub fn state(&self, key: &AttemptKey) -> TrackerState {
        match self.shard(key).lock().get(key).map(|e| e.count) {
            None | Some(0) => TrackerState::Clear,
            Some(n) => TrackerState::Warning(n),
        }
    }

    /// Drop entries idle past the TTL. Returns how many were removed.
    ///
    /// Holds one shard lock at a time, so eviction can never interleave
    /// with a transition on the same key.
    pub fn evict_stale(&self, now: Instant) -> usize {
        let mut evicted = 0;
        for shard in &self.shards {
            let mut map = shard.lock();
            let before = map.len();
            map.retain(|_, entry| now.duration_since(entry.touched) < self.idle_ttl);
            evicted += before - map.len();
        }
        evicted
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }
}

impl Default for AttemptTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_THRESHOLD, DEFAULT_IDLE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(origin: &str, subject: SubjectId) -> AttemptKey {
        AttemptKey::new(origin, subject)
    }

    #[test]
    fn test_three_denials_escalate_and_reset() {
        let tracker = AttemptTracker::default();
        let k = key("10.0.0.5", 42);
        let now = Instant::now();

        assert_eq!(tracker.state(&k), TrackerState::Clear);
        assert_eq!(
            tracker.record_denial(&k, now),
            (TrackerState::Warning(1), 1)
        );
        assert_eq!(
            tracker.record_denial(&k, now),
            (TrackerState::Warning(2), 2)
        );
        assert_eq!(
            tracker.record_denial(&k, now),
            (TrackerState::AlertTriggered, 3)
        );

        // The pulse reset the count: the next denial starts at one again.
        assert_eq!(tracker.state(&k), TrackerState::Clear);
        assert_eq!(
            tracker.record_denial(&k, now),
            (TrackerState::Warning(1), 1)
        );
    }

    #[test]
    fn test_grant_resets_from_any_state() {
        let tracker = AttemptTracker::default();
        let k = key("10.0.0.5", 42);
        let now = Instant::now();

        tracker.record_denial(&k, now);
        tracker.record_denial(&k, now);
        assert_eq!(tracker.state(&k), TrackerState::Warning(2));

        tracker.reset(&k);
        assert_eq!(tracker.state(&k), TrackerState::Clear);
        assert_eq!(tracker.tracked_keys(), 0);
    }

    #[test]
    fn test_keys_are_isolated_by_origin() {
        let tracker = AttemptTracker::default();
        let a = key("10.0.0.5", 42);
        let b = key("10.0.0.6", 42);
        let now = Instant::now();

        tracker.record_denial(&a, now);
        tracker.record_denial(&a, now);

        assert_eq!(tracker.state(&a), TrackerState::Warning(2));
        assert_eq!(tracker.state(&b), TrackerState::Clear);
        assert_eq!(
            tracker.record_denial(&b, now),
            (TrackerState::Warning(1), 1)
        );
    }

    #[test]
    fn test_threshold_one_pulses_every_denial() {
        let tracker = AttemptTracker::new(1, DEFAULT_IDLE_TTL);
        let k = key("10.0.0.5", 1);
        let now = Instant::now();

        assert_eq!(
            tracker.record_denial(&k, now),
            (TrackerState::AlertTriggered, 1)
        );
        assert_eq!(
            tracker.record_denial(&k, now),
            (TrackerState::AlertTriggered, 1)
        );
    }

    #[test]
    fn test_eviction_drops_only_stale_entries() {
        let tracker = AttemptTracker::new(3, Duration::from_secs(60));
        let stale = key("10.0.0.5", 1);
        let fresh = key("10.0.0.5", 2);

        let past = Instant::now();
        tracker.record_denial(&stale, past);

        let later = past + Duration::from_secs(120);
        tracker.record_denial(&fresh, later);

        assert_eq!(tracker.evict_stale(later), 1);
        assert_eq!(tracker.state(&stale), TrackerState::Clear);
        assert_eq!(tracker.state(&fresh), TrackerState::Warning(1));
    }

    #[test]
    fn test_concurrent_same_key_denials_lose_nothing() {
        // 4 threads x 9 denials on one key with threshold 3: every
        // increment must land, giving exactly 12 pulses and no leftover.
        let tracker = Arc::new(AttemptTracker::new(3, DEFAULT_IDLE_TTL));
        let k = key("10.0.0.5", 42);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let k = k.clone();
                std::thread::spawn(move || {
                    let mut pulses = 0;
                    for _ in 0..9 {
                        if tracker.record_denial(&k, Instant::now()).0
                            == TrackerState::AlertTriggered
                        {
                            pulses += 1;
                        }
                    }
                    pulses
                })
            })
            .collect();

        let pulses: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(pulses, 12);
        assert_eq!(tracker.state(&k), TrackerState::Clear);
    }
}
