//! Route reservoir: grid-indexed commuters waiting along route polylines.
//!
//! Commuters are bucketed into [RouteSegment]s keyed by (grid cell, route),
//! with separate inbound and outbound lists. Queries enumerate nearby cells
//! center-out and walk the direction-matching lists in insertion order; the
//! result is a scan order, not a nearest-first sort, which keeps the cost
//! per candidate constant. A side index from commuter id to grid cell makes
//! removal O(1) in the number of cells.

use std::collections::{BTreeMap, HashMap};

use bevy_ecs::prelude::Resource;
use log::debug;

use super::ReservoirCtx;
use crate::commuter::{Commuter, CommuterId, Direction, TripPurpose};
use crate::geo::{grid_cell, haversine_m, nearby_cells, GeoPoint, GridCell};
use crate::record_store::{PassengerRecord, PendingWrite};
use crate::spawner::SpawnRequest;

/// Commuters of one route inside one grid cell.
#[derive(Debug, Default)]
pub struct RouteSegment {
    inbound: Vec<Commuter>,
    outbound: Vec<Commuter>,
    total_spawned: u64,
    total_picked_up: u64,
    total_expired: u64,
}

impl RouteSegment {
    fn push(&mut self, commuter: Commuter) {
        match commuter.direction {
            Direction::Inbound => self.inbound.push(commuter),
            Direction::Outbound => self.outbound.push(commuter),
        }
        self.total_spawned += 1;
    }

    fn remove(&mut self, id: &CommuterId) -> Option<Commuter> {
        if let Some(position) = self.inbound.iter().position(|c| &c.id == id) {
            return Some(self.inbound.remove(position));
        }
        if let Some(position) = self.outbound.iter().position(|c| &c.id == id) {
            return Some(self.outbound.remove(position));
        }
        None
    }

    fn by_direction(&self, direction: Direction) -> &[Commuter] {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }

    fn len(&self) -> usize {
        self.inbound.len() + self.outbound.len()
    }

    fn is_empty(&self) -> bool {
        self.inbound.is_empty() && self.outbound.is_empty()
    }
}

/// Snapshot of one segment's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSegmentStats {
    pub route: String,
    pub cell: GridCell,
    pub waiting_inbound: usize,
    pub waiting_outbound: usize,
    pub total_spawned: u64,
    pub total_picked_up: u64,
    pub total_expired: u64,
}

/// Snapshot of the whole reservoir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReservoirStats {
    pub total_spawned: u64,
    pub total_picked_up: u64,
    pub total_expired: u64,
    pub current_waiting: usize,
    pub uptime_secs: u64,
    pub segments: Vec<RouteSegmentStats>,
}

#[derive(Resource)]
pub struct RouteReservoir {
    /// Segments keyed by grid cell, then route short name.
    grid: BTreeMap<GridCell, BTreeMap<String, RouteSegment>>,
    /// Side index: commuter id -> grid cell, for O(1) removal.
    cells: HashMap<CommuterId, GridCell>,
    /// Routes this reservoir accepts spawns for (routable ones only).
    known_routes: Vec<String>,
    cell_size: f64,
    total_spawned: u64,
    total_picked_up: u64,
    total_expired: u64,
    created_at_ms: u64,
}

impl RouteReservoir {
    pub fn new(route_names: Vec<String>, cell_size: f64) -> Self {
        Self {
            grid: BTreeMap::new(),
            cells: HashMap::new(),
            known_routes: route_names,
            cell_size,
            total_spawned: 0,
            total_picked_up: 0,
            total_expired: 0,
            created_at_ms: 0,
        }
    }

    pub fn knows_route(&self, route: &str) -> bool {
        self.known_routes.iter().any(|r| r == route)
    }

    /// Feed one spawner request into the grid. Requests for routes that were
    /// never loaded are dropped and counted.
    pub fn spawn_from_request(
        &mut self,
        ctx: &mut ReservoirCtx<'_>,
        request: &SpawnRequest,
    ) -> Option<Commuter> {
        self.spawn_commuter(
            ctx,
            &request.route,
            request.spawn_point,
            request.destination,
            request.direction,
            request.priority,
            request.purpose,
            request.max_wait_ms,
        )
    }

    /// Spawn a commuter into the segment for its grid cell.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn_commuter(
        &mut self,
        ctx: &mut ReservoirCtx<'_>,
        route: &str,
        current_location: GeoPoint,
        destination: GeoPoint,
        direction: Direction,
        priority: f64,
        purpose: TripPurpose,
        max_wait_ms: u64,
    ) -> Option<Commuter> {
        if !self.knows_route(route) {
            ctx.stats.record_disconnected_drop();
            debug!("spawn for unknown route {route} dropped");
            return None;
        }
        if ctx.at_capacity() {
            ctx.stats.record_spawn_over_cap();
            debug!("commuter cap reached; dropping spawn on {route}");
            return None;
        }

        let id = ctx.ids.allocate();
        if self.cells.contains_key(&id) {
            ctx.stats.record_spawn_rejected();
            return None;
        }

        let commuter = Commuter {
            id: id.clone(),
            position: current_location,
            destination,
            direction,
            priority: priority.clamp(0.0, 1.0),
            spawn_time_ms: ctx.now_ms,
            max_wait_ms: ctx.effective_max_wait_ms(max_wait_ms),
            purpose,
            route: route.to_string(),
            depot_id: None,
        };

        let cell = grid_cell(current_location, self.cell_size);
        let segment = self
            .grid
            .entry(cell)
            .or_default()
            .entry(route.to_string())
            .or_default();
        segment.push(commuter.clone());
        let segment_size = segment.len();
        self.cells.insert(id, cell);
        self.total_spawned += 1;
        ctx.stats.record_spawn();

        if ctx
            .bus
            .emit_spawned(&commuter, segment_size, ctx.real_ms)
            .is_err()
        {
            ctx.stats.record_bus_event_dropped();
        }
        let record = PassengerRecord::for_spawn(
            &commuter,
            ctx.real_ms,
            ctx.destination_name(commuter.destination),
        );
        if ctx.records.push(PendingWrite::Insert(Box::new(record))) {
            ctx.stats.record_write_dropped();
        }

        debug!("route spawn {} on {route} in cell {cell}", commuter.id);
        Some(commuter)
    }

    /// Commuters of a route near the vehicle, filtered by direction.
    ///
    /// Candidates come back in scan order: insertion order within a cell,
    /// cells enumerated center-out. The scan stops as soon as `max_count`
    /// matches are collected.
    pub fn query_commuters(
        &self,
        route: &str,
        vehicle_location: GeoPoint,
        direction: Direction,
        max_distance_m: f64,
        max_count: usize,
    ) -> Vec<Commuter> {
        let mut matches = Vec::new();
        if max_count == 0 {
            return matches;
        }
        let radius_km = max_distance_m / 1000.0;
        for cell in nearby_cells(vehicle_location, radius_km, self.cell_size) {
            let Some(segments) = self.grid.get(&cell) else {
                continue;
            };
            let Some(segment) = segments.get(route) else {
                continue;
            };
            for commuter in segment.by_direction(direction) {
                if haversine_m(commuter.position, vehicle_location) <= max_distance_m {
                    matches.push(commuter.clone());
                    if matches.len() >= max_count {
                        return matches;
                    }
                }
            }
        }
        matches
    }

    /// Terminal pickup transition, reaching the segment through the side
    /// index. Idempotent: a second call returns false.
    pub fn mark_picked_up(&mut self, ctx: &mut ReservoirCtx<'_>, id: &CommuterId) -> bool {
        let Some(cell) = self.cells.remove(id) else {
            return false;
        };
        let Some(segments) = self.grid.get_mut(&cell) else {
            return false;
        };
        let mut removed = None;
        let mut emptied_route = None;
        for (route, segment) in segments.iter_mut() {
            if let Some(commuter) = segment.remove(id) {
                segment.total_picked_up += 1;
                if segment.is_empty() {
                    emptied_route = Some(route.clone());
                }
                removed = Some(commuter);
                break;
            }
        }
        let Some(commuter) = removed else {
            return false;
        };
        self.prune(cell, emptied_route);
        self.total_picked_up += 1;
        ctx.stats.record_pickup();

        if ctx
            .bus
            .emit_picked_up(id.as_str(), commuter.wait_secs(ctx.now_ms), ctx.real_ms)
            .is_err()
        {
            ctx.stats.record_bus_event_dropped();
        }
        if ctx.records.push(PendingWrite::MarkBoarded(id.to_string())) {
            ctx.stats.record_write_dropped();
        }
        debug!("route pickup {id}");
        true
    }

    /// Remove every commuter whose wait budget ran out. Returns the count.
    pub fn expire_tick(&mut self, ctx: &mut ReservoirCtx<'_>) -> usize {
        let mut expired: Vec<CommuterId> = Vec::new();
        for segments in self.grid.values() {
            for segment in segments.values() {
                for commuter in segment.inbound.iter().chain(segment.outbound.iter()) {
                    if commuter.is_expired(ctx.now_ms) {
                        expired.push(commuter.id.clone());
                    }
                }
            }
        }
        expired.sort();

        for id in &expired {
            let Some(cell) = self.cells.remove(id) else {
                continue;
            };
            let Some(segments) = self.grid.get_mut(&cell) else {
                continue;
            };
            let mut emptied_route = None;
            for (route, segment) in segments.iter_mut() {
                if segment.remove(id).is_some() {
                    segment.total_expired += 1;
                    if segment.is_empty() {
                        emptied_route = Some(route.clone());
                    }
                    break;
                }
            }
            self.prune(cell, emptied_route);
            self.total_expired += 1;
            ctx.stats.record_expiration();
            if ctx.bus.emit_expired(id.as_str(), ctx.real_ms).is_err() {
                ctx.stats.record_bus_event_dropped();
            }
            debug!("route expiration {id}");
        }
        expired.len()
    }

    /// Drop a segment (and its cell entry) once it holds no commuters, so
    /// segments only exist while occupied.
    fn prune(&mut self, cell: GridCell, emptied_route: Option<String>) {
        if let Some(route) = emptied_route {
            if let Some(segments) = self.grid.get_mut(&cell) {
                segments.remove(&route);
                if segments.is_empty() {
                    self.grid.remove(&cell);
                }
            }
        }
    }

    /// How many times a commuter id appears across all segments. Exhaustive
    /// container walk, deliberately ignoring the side index.
    pub fn occurrences(&self, id: &CommuterId) -> usize {
        self.grid
            .values()
            .flat_map(|segments| segments.values())
            .map(|segment| {
                segment
                    .inbound
                    .iter()
                    .chain(segment.outbound.iter())
                    .filter(|c| &c.id == id)
                    .count()
            })
            .sum()
    }

    pub fn waiting_count(&self) -> usize {
        self.grid
            .values()
            .flat_map(|segments| segments.values())
            .map(RouteSegment::len)
            .sum()
    }

    pub fn get_stats(&self, now_ms: u64) -> RouteReservoirStats {
        let segments = self
            .grid
            .iter()
            .flat_map(|(cell, segments)| {
                segments.iter().map(|(route, segment)| RouteSegmentStats {
                    route: route.clone(),
                    cell: *cell,
                    waiting_inbound: segment.inbound.len(),
                    waiting_outbound: segment.outbound.len(),
                    total_spawned: segment.total_spawned,
                    total_picked_up: segment.total_picked_up,
                    total_expired: segment.total_expired,
                })
            })
            .collect();
        RouteReservoirStats {
            total_spawned: self.total_spawned,
            total_picked_up: self.total_picked_up,
            total_expired: self.total_expired,
            current_waiting: self.waiting_count(),
            uptime_secs: now_ms.saturating_sub(self.created_at_ms) / 1000,
            segments,
        }
    }
}
