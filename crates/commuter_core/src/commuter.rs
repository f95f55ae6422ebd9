//! Core commuter data: identifiers, travel direction, trip purposes, and the
//! commuter record itself.
//!
//! A [Commuter] is owned by exactly one reservoir container (a depot FIFO or
//! a route-grid segment) for its whole in-memory lifetime. Everything that
//! leaves a reservoir -- query results, event payloads -- is a cloned value,
//! never a reference into the container.

use std::fmt;

use bevy_ecs::prelude::Resource;

use crate::clock::ONE_MIN_MS;
use crate::geo::GeoPoint;

/// Unique commuter identifier, e.g. `COM-000001F3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommuterId(String);

impl CommuterId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommuterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommuterId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Allocates sequential commuter ids. Shared by both reservoirs so ids are
/// unique across the whole service.
#[derive(Debug, Default, Resource)]
pub struct CommuterIdAllocator {
    next: u64,
}

impl CommuterIdAllocator {
    /// Start the sequence at an arbitrary offset (useful for tests that need
    /// to provoke id collisions).
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    pub fn allocate(&mut self) -> CommuterId {
        let id = CommuterId(format!("COM-{:08X}", self.next));
        self.next += 1;
        id
    }
}

/// Travel direction along a route.
///
/// Inbound/outbound are opaque labels carried end-to-end: the spawner picks
/// one from the trip purpose, vehicles filter on it, and nothing in between
/// interprets it geometrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "INBOUND",
            Direction::Outbound => "OUTBOUND",
        }
    }

    /// Parse a wire label, defaulting to outbound for anything unrecognized.
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("INBOUND") {
            Direction::Inbound
        } else {
            Direction::Outbound
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the commuter is traveling. Determines base priority and patience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripPurpose {
    Work,
    Education,
    Shopping,
    Medical,
    Social,
    Recreation,
    Personal,
    General,
}

impl TripPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripPurpose::Work => "work",
            TripPurpose::Education => "education",
            TripPurpose::Shopping => "shopping",
            TripPurpose::Medical => "medical",
            TripPurpose::Social => "social",
            TripPurpose::Recreation => "recreation",
            TripPurpose::Personal => "personal",
            TripPurpose::General => "general",
        }
    }

    /// Base priority in [0, 1] before the rush-hour boost.
    pub fn base_priority(&self) -> f64 {
        match self {
            TripPurpose::Medical => 1.0,
            TripPurpose::Work => 0.9,
            TripPurpose::Education => 0.8,
            TripPurpose::Shopping => 0.6,
            TripPurpose::Personal => 0.5,
            TripPurpose::General => 0.5,
            TripPurpose::Social => 0.4,
            TripPurpose::Recreation => 0.3,
        }
    }

    /// How long this commuter waits before giving up, in milliseconds.
    pub fn max_wait_ms(&self) -> u64 {
        let minutes = match self {
            TripPurpose::Medical => 15,
            TripPurpose::Work => 20,
            TripPurpose::Education => 25,
            TripPurpose::Recreation => 60,
            _ => 30,
        };
        minutes * ONE_MIN_MS
    }
}

impl fmt::Display for TripPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A waiting passenger. Lives inside exactly one reservoir container;
/// cloned on the way out.
#[derive(Debug, Clone, PartialEq)]
pub struct Commuter {
    pub id: CommuterId,
    pub position: GeoPoint,
    pub destination: GeoPoint,
    pub direction: Direction,
    /// Priority in [0, 1]; higher is more urgent.
    pub priority: f64,
    /// Service time (ms) at which the commuter appeared.
    pub spawn_time_ms: u64,
    /// Wait budget after which the commuter expires.
    pub max_wait_ms: u64,
    pub purpose: TripPurpose,
    /// Short name of the route the commuter is waiting for.
    pub route: String,
    /// Depot the commuter is queued at (depot reservoir only).
    pub depot_id: Option<String>,
}

impl Commuter {
    /// Whether the commuter's wait budget has run out at service time `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.spawn_time_ms) > self.max_wait_ms
    }

    /// Seconds waited so far at service time `now_ms`.
    pub fn wait_secs(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.spawn_time_ms) / 1000
    }
}
