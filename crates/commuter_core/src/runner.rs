//! Service runner: advances the clock and routes events into the systems.
//!
//! Clock progression happens here, outside systems. Each step pops the next
//! event, inserts it as [CurrentEvent], then runs the schedule; systems are
//! gated on the event kind so only the relevant ones do work. Tests
//! fast-forward the same loop that [run_realtime] paces against the wall
//! clock in production.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bevy_ecs::prelude::{Res, Resource, Schedule, World};
use bevy_ecs::schedule::IntoSystemConfigs;
use log::{debug, info, warn};

use crate::clock::{CurrentEvent, EventKind, ServiceClock};
use crate::coordinator::Coordinators;
use crate::record_store::{PendingWrite, RecordStoreHandle, RecordStoreQueue};
use crate::stats::SharedStats;
use crate::systems::{
    bus_inbound::bus_inbound_system,
    config_refresh::config_refresh_system,
    expiration::{depot_expiration_tick_system, route_expiration_tick_system},
    record_flush::record_flush_system,
    service_started::service_started_system,
    spawn_tick::{depot_spawn_tick_system, route_spawn_tick_system},
    stats_report::stats_report_system,
};

/// When present, the runner stops before processing any event at or past
/// this service timestamp.
#[derive(Debug, Clone, Copy, Resource)]
pub struct ServiceEndTimeMs(pub u64);

// Condition functions for each event kind.
fn is_service_started(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::ServiceStarted)
        .unwrap_or(false)
}

fn is_bus_inbound_poll(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::BusInboundPoll)
        .unwrap_or(false)
}

fn is_depot_spawn_tick(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::DepotSpawnTick)
        .unwrap_or(false)
}

fn is_route_spawn_tick(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::RouteSpawnTick)
        .unwrap_or(false)
}

fn is_depot_expiration_tick(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::DepotExpirationTick)
        .unwrap_or(false)
}

fn is_route_expiration_tick(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::RouteExpirationTick)
        .unwrap_or(false)
}

fn is_record_store_flush(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::RecordStoreFlush)
        .unwrap_or(false)
}

fn is_config_refresh(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::ConfigRefresh)
        .unwrap_or(false)
}

fn is_stats_report(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::StatsReport)
        .unwrap_or(false)
}

/// Builds the service schedule: every event-reacting system, each gated on
/// its event kind.
pub fn service_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((
        service_started_system.run_if(is_service_started),
        bus_inbound_system.run_if(is_bus_inbound_poll),
        depot_spawn_tick_system.run_if(is_depot_spawn_tick),
        route_spawn_tick_system.run_if(is_route_spawn_tick),
        depot_expiration_tick_system.run_if(is_depot_expiration_tick),
        route_expiration_tick_system.run_if(is_route_expiration_tick),
        record_flush_system.run_if(is_record_store_flush),
        config_refresh_system.run_if(is_config_refresh),
        stats_report_system.run_if(is_stats_report),
    ));
    schedule
}

/// Schedules the ServiceStarted event at time 0. Call after building the
/// service and before running events.
pub fn initialize_service(world: &mut World) {
    let mut clock = world.resource_mut::<ServiceClock>();
    clock.schedule_at(0, EventKind::ServiceStarted);
}

/// Runs one step: pops the next event, inserts it as [CurrentEvent], then
/// runs the schedule. Returns `false` when the clock is empty or the next
/// event is at or past [ServiceEndTimeMs].
pub fn run_next_event(world: &mut World, schedule: &mut Schedule) -> bool {
    let stop_at = world.get_resource::<ServiceEndTimeMs>().map(|e| e.0);
    let next_ts = world
        .get_resource::<ServiceClock>()
        .and_then(|c| c.next_event_time());
    if let (Some(end_ms), Some(ts)) = (stop_at, next_ts) {
        if ts >= end_ms {
            return false;
        }
    }

    let event = match world.resource_mut::<ServiceClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
    true
}

/// Runs steps until the clock is empty, the end time is reached, or
/// `max_steps` have executed. Returns the number of steps.
pub fn run_until_empty(world: &mut World, schedule: &mut Schedule, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && run_next_event(world, schedule) {
        steps += 1;
    }
    steps
}

fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Production loop: sleeps until each event's wall-clock time, then runs it.
/// Returns when `shutdown` is raised or the clock drains, after performing
/// the ordered shutdown.
pub fn run_realtime(world: &mut World, schedule: &mut Schedule, shutdown: &AtomicBool) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let (next, epoch_ms) = {
            let clock = world.resource::<ServiceClock>();
            (clock.next_event_time(), clock.epoch_ms())
        };
        let Some(next) = next else {
            break;
        };
        let target_ms = epoch_ms.saturating_add(next as i64);
        let now_ms = wall_clock_ms();
        if target_ms > now_ms {
            // Sleep in short slices so a shutdown request is honored promptly.
            let wait = Duration::from_millis((target_ms - now_ms) as u64).min(Duration::from_millis(250));
            std::thread::sleep(wait);
            continue;
        }
        if !run_next_event(world, schedule) {
            break;
        }
    }
    shutdown_service(world);
}

/// Ordered shutdown: stop the coordinators first (no new work), drain the
/// bus inbound queue, then flush the record store.
pub fn shutdown_service(world: &mut World) {
    info!("shutting down commuter service");
    if let Some(mut coordinators) = world.get_resource_mut::<Coordinators>() {
        coordinators.stop_all();
    }

    if let Some(bus) = world.get_resource::<crate::event_bus::BusClient>() {
        let pending = bus.poll();
        if !pending.is_empty() {
            debug!("discarding {} inbound bus messages at shutdown", pending.len());
        }
    }

    let stats = world.get_resource::<SharedStats>().cloned();
    let store = world.remove_resource::<RecordStoreHandle>();
    if let (Some(store), Some(mut queue)) = (store, world.get_resource_mut::<RecordStoreQueue>())
    {
        let mut flushed = 0usize;
        while let Some(write) = queue.pop() {
            let result = match &write {
                PendingWrite::Insert(record) => store.store.insert(record),
                PendingWrite::MarkBoarded(id) => store.store.mark_boarded(id),
                PendingWrite::MarkAlighted(id) => store.store.mark_alighted(id),
                PendingWrite::CleanupExpired => store.store.cleanup_expired(),
            };
            match result {
                Ok(()) => flushed += 1,
                Err(err) => {
                    let dropped = queue.len() + 1;
                    warn!("abandoning {dropped} record-store writes at shutdown: {err}");
                    if let Some(stats) = &stats {
                        for _ in 0..dropped {
                            stats.record_write_dropped();
                        }
                    }
                    break;
                }
            }
        }
        if flushed > 0 {
            info!("flushed {flushed} record-store writes at shutdown");
        }
    }
}
