//! Spawning ticks: run the Poisson spawner and feed the batch into a
//! reservoir.
//!
//! Each tick re-reads the runtime interval override, draws one batch for a
//! fresh wall-clock `now`, routes every request into its reservoir, then
//! schedules the next tick. The depot and route ticks draw from separated
//! seed streams so the two reservoirs do not replay each other's demand.

use bevy_ecs::prelude::{Res, ResMut};
use log::debug;

use crate::clock::{CurrentEvent, EventKind, ServiceClock};
use crate::commuter::CommuterIdAllocator;
use crate::config::{ServiceConfig, SpawnIntervalOverride};
use crate::coordinator::Coordinators;
use crate::event_bus::BusClient;
use crate::record_store::RecordStoreQueue;
use crate::reservoir::{DepotReservoir, ReservoirCtx, RouteReservoir};
use crate::spawner::PoissonSpawner;
use crate::stats::SharedStats;
use crate::zones::{RouteTable, ZoneCache};

/// Seed-stream separator for the route reservoir's draws.
const ROUTE_SEED_STREAM: u64 = 0x526f_7574;

#[allow(clippy::too_many_arguments)]
pub fn depot_spawn_tick_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<ServiceClock>,
    mut coordinators: ResMut<Coordinators>,
    mut reservoir: ResMut<DepotReservoir>,
    mut records: ResMut<RecordStoreQueue>,
    mut ids: ResMut<CommuterIdAllocator>,
    bus: Res<BusClient>,
    stats: Res<SharedStats>,
    zones: Res<ZoneCache>,
    routes: Res<RouteTable>,
    config: Res<ServiceConfig>,
    interval_override: Res<SpawnIntervalOverride>,
) {
    if event.0.kind != EventKind::DepotSpawnTick {
        return;
    }
    if !coordinators.depot_spawn.is_running() {
        return;
    }
    if let Some(seconds) = interval_override.interval_seconds {
        coordinators.depot_spawn.set_interval_secs(seconds);
    }

    let window_minutes = interval_override
        .window_minutes
        .unwrap_or(config.spawning.window_minutes);
    let requests = PoissonSpawner::new().generate(
        &zones,
        &routes,
        clock.now_real_ms(),
        window_minutes,
        config.prng_seed,
    );
    debug!("depot spawn tick: {} requests", requests.len());

    let mut ctx = ReservoirCtx {
        now_ms: clock.now(),
        real_ms: clock.now_real_ms(),
        bus: &bus,
        records: &mut records,
        stats: &stats,
        ids: &mut ids,
        zones: Some(&zones),
        max_active: config.spawning.max_active_commuters,
        default_max_wait_ms: config.reservoir.max_wait_minutes * 60_000,
    };
    for request in &requests {
        reservoir.spawn_from_request(&mut ctx, request);
    }

    coordinators.depot_spawn.advance(&mut clock);
}

#[allow(clippy::too_many_arguments)]
pub fn route_spawn_tick_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<ServiceClock>,
    mut coordinators: ResMut<Coordinators>,
    mut reservoir: ResMut<RouteReservoir>,
    mut records: ResMut<RecordStoreQueue>,
    mut ids: ResMut<CommuterIdAllocator>,
    bus: Res<BusClient>,
    stats: Res<SharedStats>,
    zones: Res<ZoneCache>,
    routes: Res<RouteTable>,
    config: Res<ServiceConfig>,
    interval_override: Res<SpawnIntervalOverride>,
) {
    if event.0.kind != EventKind::RouteSpawnTick {
        return;
    }
    if !coordinators.route_spawn.is_running() {
        return;
    }
    if let Some(seconds) = interval_override.interval_seconds {
        coordinators.route_spawn.set_interval_secs(seconds);
    }

    let window_minutes = interval_override
        .window_minutes
        .unwrap_or(config.spawning.window_minutes);
    let requests = PoissonSpawner::new().generate(
        &zones,
        &routes,
        clock.now_real_ms(),
        window_minutes,
        config.prng_seed.wrapping_add(ROUTE_SEED_STREAM),
    );
    debug!("route spawn tick: {} requests", requests.len());

    let mut ctx = ReservoirCtx {
        now_ms: clock.now(),
        real_ms: clock.now_real_ms(),
        bus: &bus,
        records: &mut records,
        stats: &stats,
        ids: &mut ids,
        zones: Some(&zones),
        max_active: config.spawning.max_active_commuters,
        default_max_wait_ms: config.reservoir.max_wait_minutes * 60_000,
    };
    for request in &requests {
        reservoir.spawn_from_request(&mut ctx, request);
    }

    coordinators.route_spawn.advance(&mut clock);
}
