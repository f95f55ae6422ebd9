//! Expiration ticks: sweep each reservoir for commuters whose wait budget
//! ran out, then stage a server-side cleanup when anything was removed.

use bevy_ecs::prelude::{Res, ResMut};
use log::info;

use crate::clock::{CurrentEvent, EventKind, ServiceClock};
use crate::commuter::CommuterIdAllocator;
use crate::config::ServiceConfig;
use crate::coordinator::Coordinators;
use crate::event_bus::BusClient;
use crate::record_store::{PendingWrite, RecordStoreQueue};
use crate::reservoir::{DepotReservoir, ReservoirCtx, RouteReservoir};
use crate::stats::SharedStats;

#[allow(clippy::too_many_arguments)]
pub fn depot_expiration_tick_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<ServiceClock>,
    mut coordinators: ResMut<Coordinators>,
    mut reservoir: ResMut<DepotReservoir>,
    mut records: ResMut<RecordStoreQueue>,
    mut ids: ResMut<CommuterIdAllocator>,
    bus: Res<BusClient>,
    stats: Res<SharedStats>,
    config: Res<ServiceConfig>,
) {
    if event.0.kind != EventKind::DepotExpirationTick {
        return;
    }
    if !coordinators.depot_expiration.is_running() {
        return;
    }

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
    let expired = reservoir.expire_tick(&mut ctx);
    if expired > 0 {
        info!("depot reservoir expired {expired} commuters");
        if records.push(PendingWrite::CleanupExpired) {
            stats.record_write_dropped();
        }
    }

    coordinators.depot_expiration.advance(&mut clock);
}

#[allow(clippy::too_many_arguments)]
pub fn route_expiration_tick_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<ServiceClock>,
    mut coordinators: ResMut<Coordinators>,
    mut reservoir: ResMut<RouteReservoir>,
    mut records: ResMut<RecordStoreQueue>,
    mut ids: ResMut<CommuterIdAllocator>,
    bus: Res<BusClient>,
    stats: Res<SharedStats>,
    config: Res<ServiceConfig>,
) {
    if event.0.kind != EventKind::RouteExpirationTick {
        return;
    }
    if !coordinators.route_expiration.is_running() {
        return;
    }

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
    let expired = reservoir.expire_tick(&mut ctx);
    if expired > 0 {
        info!("route reservoir expired {expired} commuters");
        if records.push(PendingWrite::CleanupExpired) {
            stats.record_write_dropped();
        }
    }

    coordinators.route_expiration.advance(&mut clock);
}
