//! Service-wide counters, shared across threads through atomics.
//!
//! The counter block is the only mutable state visible outside the service
//! loop: reservoirs increment it from inside the schedule run, and external
//! observers take [StatsSnapshot] copies whenever they like. The
//! conservation law `spawned == waiting + picked_up + expired +
//! dropped_over_cap` holds at every observation point because every
//! transition updates both sides before returning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bevy_ecs::prelude::Resource;

#[derive(Debug, Default)]
struct Counters {
    spawned: AtomicU64,
    picked_up: AtomicU64,
    expired: AtomicU64,
    waiting: AtomicU64,
    dropped_over_cap: AtomicU64,
    dropped_disconnected: AtomicU64,
    dropped_invalid_location: AtomicU64,
    spawn_rejected: AtomicU64,
    bus_events_dropped: AtomicU64,
    record_writes_dropped: AtomicU64,
    callback_failures: AtomicU64,
}

/// Cheaply clonable handle to the shared counter block.
#[derive(Debug, Clone, Default, Resource)]
pub struct SharedStats {
    counters: Arc<Counters>,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub spawned: u64,
    pub picked_up: u64,
    pub expired: u64,
    pub waiting: u64,
    pub dropped_over_cap: u64,
    pub dropped_disconnected: u64,
    pub dropped_invalid_location: u64,
    pub spawn_rejected: u64,
    pub bus_events_dropped: u64,
    pub record_writes_dropped: u64,
    pub callback_failures: u64,
}

impl SharedStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a spawn that entered a reservoir container.
    pub fn record_spawn(&self) {
        self.counters.spawned.fetch_add(1, Ordering::Relaxed);
        self.counters.waiting.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a spawn that was counted but dropped at the global cap.
    pub fn record_spawn_over_cap(&self) {
        self.counters.spawned.fetch_add(1, Ordering::Relaxed);
        self.counters.dropped_over_cap.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pickup(&self) {
        self.counters.picked_up.fetch_add(1, Ordering::Relaxed);
        self.counters.waiting.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.counters.expired.fetch_add(1, Ordering::Relaxed);
        self.counters.waiting.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_disconnected_drop(&self) {
        self.counters
            .dropped_disconnected
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_location(&self) {
        self.counters
            .dropped_invalid_location
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spawn_rejected(&self) {
        self.counters.spawn_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bus_event_dropped(&self) {
        self.counters
            .bus_events_dropped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_dropped(&self) {
        self.counters
            .record_writes_dropped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_callback_failure(&self) {
        self.counters
            .callback_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current number of waiting commuters across both reservoirs.
    pub fn waiting(&self) -> u64 {
        self.counters.waiting.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.counters;
        StatsSnapshot {
            spawned: c.spawned.load(Ordering::Relaxed),
            picked_up: c.picked_up.load(Ordering::Relaxed),
            expired: c.expired.load(Ordering::Relaxed),
            waiting: c.waiting.load(Ordering::Relaxed),
            dropped_over_cap: c.dropped_over_cap.load(Ordering::Relaxed),
            dropped_disconnected: c.dropped_disconnected.load(Ordering::Relaxed),
            dropped_invalid_location: c.dropped_invalid_location.load(Ordering::Relaxed),
            spawn_rejected: c.spawn_rejected.load(Ordering::Relaxed),
            bus_events_dropped: c.bus_events_dropped.load(Ordering::Relaxed),
            record_writes_dropped: c.record_writes_dropped.load(Ordering::Relaxed),
            callback_failures: c.callback_failures.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// The conservation law every observation must satisfy.
    pub fn is_balanced(&self) -> bool {
        self.spawned == self.waiting + self.picked_up + self.expired + self.dropped_over_cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_transitions() {
        let stats = SharedStats::new();
        stats.record_spawn();
        stats.record_spawn();
        stats.record_spawn();
        stats.record_pickup();
        stats.record_expiration();

        let snap = stats.snapshot();
        assert_eq!(snap.spawned, 3);
        assert_eq!(snap.picked_up, 1);
        assert_eq!(snap.expired, 1);
        assert_eq!(snap.waiting, 1);
        assert!(snap.is_balanced());
    }

    #[test]
    fn over_cap_spawns_keep_the_balance() {
        let stats = SharedStats::new();
        stats.record_spawn();
        stats.record_spawn_over_cap();

        let snap = stats.snapshot();
        assert_eq!(snap.spawned, 2);
        assert_eq!(snap.waiting, 1);
        assert_eq!(snap.dropped_over_cap, 1);
        assert!(snap.is_balanced());
    }

    #[test]
    fn clones_share_one_counter_block() {
        let stats = SharedStats::new();
        let observer = stats.clone();
        stats.record_spawn();
        assert_eq!(observer.snapshot().spawned, 1);
        assert_eq!(observer.waiting(), 1);
    }
}
