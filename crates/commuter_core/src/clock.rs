//! Service time: millisecond-scale timeline with a real-world epoch.
//!
//! All timestamps and `clock.now()` are in **service milliseconds**. Time 0 is
//! mapped to a real-world datetime via `epoch_ms`. The timeline advances by
//! popping the next scheduled event; events at the same millisecond are
//! ordered by `EventKind`, which is what guarantees that an inbound pickup
//! notification is processed before an expiration sweep scheduled for the
//! same instant.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::Resource;

/// One second in service milliseconds.
pub const ONE_SEC_MS: u64 = 1000;
/// One minute in service milliseconds.
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;
/// One hour in service milliseconds.
pub const ONE_HOUR_MS: u64 = 60 * ONE_MIN_MS;

/// Event kinds, in same-millisecond processing order.
///
/// `BusInboundPoll` sorts before both expiration ticks: when a pickup request
/// and an expiration sweep land on the same millisecond, the pickup wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    ServiceStarted,
    BusInboundPoll,
    DepotSpawnTick,
    RouteSpawnTick,
    DepotExpirationTick,
    RouteExpirationTick,
    RecordStoreFlush,
    ConfigRefresh,
    StatsReport,
}

/// Scheduled event. `timestamp` is in **milliseconds** (service time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by timestamp; same timestamp ordered by kind for determinism.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event currently being dispatched, inserted by the runner before each
/// schedule pass.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

/// Service clock: time in **milliseconds**, advances to the next scheduled
/// event. Time 0 maps to a real-world datetime via `epoch_ms`.
#[derive(Debug, Clone, Resource)]
pub struct ServiceClock {
    /// Current service time in ms (updated when an event is popped).
    now: u64,
    /// Real-world ms corresponding to service time 0 (Unix epoch offset).
    epoch_ms: i64,
    events: BinaryHeap<Event>,
}

impl Default for ServiceClock {
    fn default() -> Self {
        Self {
            now: 0,
            epoch_ms: 0,
            events: BinaryHeap::new(),
        }
    }
}

impl ServiceClock {
    /// Clock with time 0 mapped to the given real-world ms.
    pub fn with_epoch(epoch_ms: i64) -> Self {
        Self {
            now: 0,
            epoch_ms,
            events: BinaryHeap::new(),
        }
    }

    /// Current service time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Current service time in seconds (now / 1000).
    pub fn now_secs(&self) -> u64 {
        self.now / ONE_SEC_MS
    }

    /// Real-world ms that corresponds to service time 0.
    pub fn epoch_ms(&self) -> i64 {
        self.epoch_ms
    }

    pub fn set_epoch_ms(&mut self, epoch_ms: i64) {
        self.epoch_ms = epoch_ms;
    }

    /// Convert service ms to real-world ms (epoch_ms + service_ms).
    pub fn sim_to_real_ms(&self, service_ms: u64) -> i64 {
        self.epoch_ms.saturating_add(service_ms as i64)
    }

    /// Real-world ms for the current service time.
    pub fn now_real_ms(&self) -> i64 {
        self.sim_to_real_ms(self.now)
    }

    /// Schedule an event at a specific service timestamp (ms).
    pub fn schedule_at(&mut self, at_ms: u64, kind: EventKind) {
        self.schedule(Event {
            timestamp: at_ms,
            kind,
        });
    }

    /// Schedule an event at `now + delta_ms` (relative, in ms).
    pub fn schedule_in(&mut self, delta_ms: u64, kind: EventKind) {
        self.schedule_at(self.now.saturating_add(delta_ms), kind);
    }

    /// Schedule an event in **delta_secs** seconds from now.
    pub fn schedule_in_secs(&mut self, delta_secs: u64, kind: EventKind) {
        self.schedule_in(delta_secs.saturating_mul(ONE_SEC_MS), kind);
    }

    /// Schedule a full event (timestamp must be in ms, >= now).
    pub fn schedule(&mut self, event: Event) {
        debug_assert!(
            event.timestamp >= self.now,
            "event timestamp must be >= current time"
        );
        self.events.push(event);
    }

    /// Pop the next event (earliest timestamp; same-ms order by kind).
    /// Advances `now` to that timestamp.
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    /// Timestamp of the next scheduled event without popping it.
    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|event| event.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events still in the queue (for tests and shutdown checks).
    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }
}

/// Hour of day (0-23, UTC) for a real-world millisecond timestamp.
pub fn hour_of_day_utc(real_ms: i64) -> u8 {
    let total_secs = real_ms.div_euclid(1000);
    let secs_in_day = total_secs.rem_euclid(86_400);
    (secs_in_day / 3600) as u8
}

/// RFC 3339 (ISO-8601) UTC string for a real-world millisecond timestamp,
/// as used in record-store payloads and bus envelopes.
pub fn rfc3339_utc(real_ms: i64) -> String {
    time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(real_ms) * 1_000_000)
        .ok()
        .and_then(|dt| dt.format(&time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}
