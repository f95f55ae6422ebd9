//! Periodic drivers for reservoir hooks.
//!
//! A [Coordinator] is a small state machine around one recurring clock
//! event: started once, it schedules its first tick and every tick system
//! re-schedules the next one. The coordinator knows nothing about which
//! reservoir it feeds; the tick systems own that wiring. Start and stop are
//! idempotent, and callback failures are counted without stopping the
//! cadence.

use bevy_ecs::prelude::Resource;
use log::info;

use crate::clock::{EventKind, ServiceClock, ONE_SEC_MS};

#[derive(Debug)]
pub struct Coordinator {
    name: &'static str,
    kind: EventKind,
    interval_ms: u64,
    running: bool,
    ticks: u64,
    failures: u64,
}

impl Coordinator {
    pub fn new(name: &'static str, kind: EventKind, interval_secs: u64) -> Self {
        Self {
            name,
            kind,
            interval_ms: interval_secs.max(1) * ONE_SEC_MS,
            running: false,
            ticks: 0,
            failures: 0,
        }
    }

    /// Begin ticking: schedules the first event. Idempotent.
    pub fn start(&mut self, clock: &mut ServiceClock) {
        if self.running {
            return;
        }
        self.running = true;
        clock.schedule_in(self.interval_ms, self.kind);
        info!(
            "{} coordinator started (every {} s)",
            self.name,
            self.interval_ms / ONE_SEC_MS
        );
    }

    /// Stop ticking: pending events still fire but are ignored. Idempotent.
    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            info!("{} coordinator stopped", self.name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Record a fired tick and schedule the next one.
    pub fn advance(&mut self, clock: &mut ServiceClock) {
        self.ticks += 1;
        if self.running {
            clock.schedule_in(self.interval_ms, self.kind);
        }
    }

    /// Change the cadence; takes effect from the next scheduled tick.
    pub fn set_interval_secs(&mut self, interval_secs: u64) {
        let interval_ms = interval_secs.max(1) * ONE_SEC_MS;
        if interval_ms != self.interval_ms {
            info!(
                "{} coordinator interval {} s -> {} s",
                self.name,
                self.interval_ms / ONE_SEC_MS,
                interval_secs.max(1)
            );
            self.interval_ms = interval_ms;
        }
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_ms / ONE_SEC_MS
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

/// All coordinator state in one resource, keyed by concern.
#[derive(Debug, Resource)]
pub struct Coordinators {
    pub depot_spawn: Coordinator,
    pub route_spawn: Coordinator,
    pub depot_expiration: Coordinator,
    pub route_expiration: Coordinator,
    pub bus_poll: Coordinator,
    pub record_flush: Coordinator,
    pub config_refresh: Coordinator,
    pub stats_report: Coordinator,
}

impl Coordinators {
    pub fn from_config(config: &crate::config::ServiceConfig) -> Self {
        Self {
            depot_spawn: Coordinator::new(
                "depot-spawning",
                EventKind::DepotSpawnTick,
                config.spawning.depot_interval_seconds,
            ),
            route_spawn: Coordinator::new(
                "route-spawning",
                EventKind::RouteSpawnTick,
                config.spawning.route_interval_seconds,
            ),
            depot_expiration: Coordinator::new(
                "depot-expiration",
                EventKind::DepotExpirationTick,
                config.reservoir.expiration_check_seconds,
            ),
            route_expiration: Coordinator::new(
                "route-expiration",
                EventKind::RouteExpirationTick,
                config.reservoir.expiration_check_seconds,
            ),
            bus_poll: Coordinator::new(
                "bus-poll",
                EventKind::BusInboundPoll,
                config.event_bus.poll_interval_seconds,
            ),
            record_flush: Coordinator::new(
                "record-flush",
                EventKind::RecordStoreFlush,
                config.event_bus.poll_interval_seconds,
            ),
            config_refresh: Coordinator::new(
                "config-refresh",
                EventKind::ConfigRefresh,
                config.config_refresh_seconds,
            ),
            stats_report: Coordinator::new(
                "stats-report",
                EventKind::StatsReport,
                config.stats_interval_seconds,
            ),
        }
    }

    pub fn start_all(&mut self, clock: &mut ServiceClock) {
        self.depot_spawn.start(clock);
        self.route_spawn.start(clock);
        self.depot_expiration.start(clock);
        self.route_expiration.start(clock);
        self.bus_poll.start(clock);
        self.record_flush.start(clock);
        self.config_refresh.start(clock);
        self.stats_report.start(clock);
    }

    /// Shutdown step one: stop producing new work.
    pub fn stop_all(&mut self) {
        self.depot_spawn.stop();
        self.route_spawn.stop();
        self.depot_expiration.stop();
        self.route_expiration.stop();
        self.bus_poll.stop();
        self.record_flush.stop();
        self.config_refresh.stop();
        self.stats_report.stop();
    }
}
