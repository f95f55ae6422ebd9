//! Inbound bus poll: answer vehicle queries and apply pickup notifications.
//!
//! Runs before the expiration ticks at any shared timestamp (see
//! [crate::clock::EventKind] ordering), so a pickup that races an expiration
//! sweep wins and the commuter sees exactly one terminal event.

use bevy_ecs::prelude::{Res, ResMut};
use log::debug;

use crate::clock::{CurrentEvent, EventKind, ServiceClock};
use crate::commuter::{CommuterId, CommuterIdAllocator, Direction};
use crate::config::ServiceConfig;
use crate::coordinator::Coordinators;
use crate::event_bus::{parse_inbound, BusClient, CommuterQuery, InboundMessage};
use crate::record_store::RecordStoreQueue;
use crate::reservoir::{DepotReservoir, ReservoirCtx, RouteReservoir};
use crate::stats::SharedStats;

/// Cap on commuters returned by one query, matching the vehicle capacity
/// ceiling of the consuming simulator.
const MAX_QUERY_RESULTS: usize = 50;

#[allow(clippy::too_many_arguments)]
pub fn bus_inbound_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<ServiceClock>,
    mut coordinators: ResMut<Coordinators>,
    mut depot_reservoir: ResMut<DepotReservoir>,
    mut route_reservoir: ResMut<RouteReservoir>,
    mut records: ResMut<RecordStoreQueue>,
    mut ids: ResMut<CommuterIdAllocator>,
    bus: Res<BusClient>,
    stats: Res<SharedStats>,
    config: Res<ServiceConfig>,
) {
    if event.0.kind != EventKind::BusInboundPoll {
        return;
    }
    if !coordinators.bus_poll.is_running() {
        return;
    }

    for envelope in bus.poll() {
        match parse_inbound(&envelope) {
            InboundMessage::QueryCommuters(query) => {
                answer_query(
                    &query,
                    &depot_reservoir,
                    &route_reservoir,
                    &bus,
                    &stats,
                    &config,
                    &clock,
                );
            }
            InboundMessage::PickupNotify { commuter_id } => {
                let id = CommuterId::from(commuter_id.as_str());
                let mut ctx = ReservoirCtx {
                    now_ms: clock.now(),
                    real_ms: clock.now_real_ms(),
                    bus: &bus,
                    records: &mut records,
                    stats: &stats,
                    ids: &mut ids,
                    zones: None,
                    max_active: config.spawning.max_active_commuters,
                    default_max_wait_ms: config.reservoir.max_wait_minutes * 60_000,
                };
                let picked = depot_reservoir.mark_picked_up(&mut ctx, &id)
                    || route_reservoir.mark_picked_up(&mut ctx, &id);
                if !picked {
                    debug!("pickup notify for unknown commuter {commuter_id}");
                }
            }
            InboundMessage::InvalidLocation(reason) => {
                stats.record_invalid_location();
                debug!("{reason}");
            }
            InboundMessage::Ignored(reason) => {
                debug!("ignoring inbound message: {reason}");
            }
        }
    }

    coordinators.bus_poll.advance(&mut clock);
}

/// Run the query against the right reservoir and publish the response with
/// the caller's correlation id.
fn answer_query(
    query: &CommuterQuery,
    depot_reservoir: &DepotReservoir,
    route_reservoir: &RouteReservoir,
    bus: &BusClient,
    stats: &SharedStats,
    config: &ServiceConfig,
    clock: &ServiceClock,
) {
    let max_distance_m = query
        .max_distance_m
        .unwrap_or(config.reservoir.default_pickup_distance_m);
    let max_count = query.max_count.unwrap_or(MAX_QUERY_RESULTS).min(MAX_QUERY_RESULTS);

    let commuters = match &query.depot_id {
        Some(depot_id) => depot_reservoir.query_commuters(
            depot_id,
            &query.route,
            query.vehicle_location,
            max_distance_m,
            max_count,
        ),
        None => route_reservoir.query_commuters(
            &query.route,
            query.vehicle_location,
            query.direction.unwrap_or(Direction::Outbound),
            max_distance_m,
            max_count,
        ),
    };

    debug!(
        "query on {} returned {} commuters",
        query.route,
        commuters.len()
    );
    if bus
        .emit_query_response(&commuters, query.correlation_id.clone(), clock.now_real_ms())
        .is_err()
    {
        stats.record_bus_event_dropped();
    }
}
