//! Periodic statistics log line, the operator's view into the service.

use bevy_ecs::prelude::{Res, ResMut};
use log::info;

use crate::clock::{CurrentEvent, EventKind, ServiceClock};
use crate::coordinator::Coordinators;
use crate::record_store::RecordStoreQueue;
use crate::reservoir::{DepotReservoir, RouteReservoir};
use crate::stats::SharedStats;

pub fn stats_report_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<ServiceClock>,
    mut coordinators: ResMut<Coordinators>,
    depot_reservoir: Res<DepotReservoir>,
    route_reservoir: Res<RouteReservoir>,
    records: Res<RecordStoreQueue>,
    stats: Res<SharedStats>,
) {
    if event.0.kind != EventKind::StatsReport {
        return;
    }
    if !coordinators.stats_report.is_running() {
        return;
    }

    let snapshot = stats.snapshot();
    info!(
        "stats: spawned={} waiting={} (depot={}, route={}) picked_up={} expired={} \
         dropped: cap={} disconnected={} invalid={} bus={} writes={} | {} writes pending",
        snapshot.spawned,
        snapshot.waiting,
        depot_reservoir.waiting_count(),
        route_reservoir.waiting_count(),
        snapshot.picked_up,
        snapshot.expired,
        snapshot.dropped_over_cap,
        snapshot.dropped_disconnected,
        snapshot.dropped_invalid_location,
        snapshot.bus_events_dropped,
        snapshot.record_writes_dropped,
        records.len()
    );

    coordinators.stats_report.advance(&mut clock);
}
