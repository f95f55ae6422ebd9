//! Commuter reservoirs: live containers of waiting passengers.
//!
//! Two cooperating reservoirs hold every waiting commuter: the depot
//! reservoir (one FIFO per connected depot-route pair) and the route
//! reservoir (grid-indexed segments along each polyline). Each commuter
//! lives in exactly one container from spawn until its single terminal
//! transition, pickup or expiration.
//!
//! Reservoir methods take a [ReservoirCtx] assembled by the calling system:
//! the clock times, the event bus, the record-store staging queue, and the
//! shared counters. Side effects (events, mirror writes, counters) happen
//! inside the mutation so no observable state is ever half-updated.

pub mod depot;
pub mod route;

#[cfg(test)]
mod tests;

pub use depot::{DepotQueueStats, DepotReservoir, DepotReservoirStats};
pub use route::{RouteReservoir, RouteReservoirStats, RouteSegmentStats};

use crate::commuter::CommuterIdAllocator;
use crate::event_bus::BusClient;
use crate::record_store::RecordStoreQueue;
use crate::stats::SharedStats;
use crate::zones::ZoneCache;

/// Everything a reservoir mutation needs from the surrounding service.
pub struct ReservoirCtx<'a> {
    /// Current service time (ms).
    pub now_ms: u64,
    /// Current wall-clock time (ms since Unix epoch).
    pub real_ms: i64,
    pub bus: &'a BusClient,
    pub records: &'a mut RecordStoreQueue,
    pub stats: &'a SharedStats,
    pub ids: &'a mut CommuterIdAllocator,
    /// For labeling destinations in mirrored records; absent in some tests.
    pub zones: Option<&'a ZoneCache>,
    /// Global cap on waiting commuters across both reservoirs.
    pub max_active: u64,
    /// Wait budget applied when a spawn carries none of its own (the
    /// per-commuter value always wins over this).
    pub default_max_wait_ms: u64,
}

impl<'a> ReservoirCtx<'a> {
    /// Whether the global commuter cap has been reached.
    pub fn at_capacity(&self) -> bool {
        self.stats.waiting() >= self.max_active
    }

    /// Per-commuter wait budget if given, else the configured default.
    pub fn effective_max_wait_ms(&self, max_wait_ms: u64) -> u64 {
        if max_wait_ms == 0 {
            self.default_max_wait_ms
        } else {
            max_wait_ms
        }
    }

    /// Destination label for mirrored records: the nearest amenity within
    /// 100 m, or a generic fallback.
    pub fn destination_name(&self, point: crate::geo::GeoPoint) -> String {
        self.zones
            .and_then(|zones| zones.nearest_amenity_name(point, 100.0))
            .unwrap_or_else(|| "Destination".to_string())
    }
}
