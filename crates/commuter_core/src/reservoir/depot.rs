//! Depot reservoir: FIFO queues of commuters waiting at depots.
//!
//! One queue exists per connected (depot, route) pair, created lazily on
//! first spawn. Connectivity is decided once at startup: a pair is connected
//! when the depot lies within the configured radius of some route vertex.
//! Spawn requests whose route has no connected depot are dropped and
//! counted; when several depots qualify, the one nearest the spawn point
//! wins.

use std::collections::{BTreeMap, HashMap, VecDeque};

use bevy_ecs::prelude::Resource;
use log::{debug, warn};

use super::ReservoirCtx;
use crate::commuter::{Commuter, CommuterId, Direction, TripPurpose};
use crate::data_source::{Depot, Route};
use crate::geo::{haversine_m, point_to_polyline_m, GeoPoint};
use crate::record_store::{PassengerRecord, PendingWrite};
use crate::spawner::SpawnRequest;

/// FIFO of commuters waiting at one depot for one route.
#[derive(Debug)]
pub struct DepotQueue {
    pub depot_id: String,
    pub route: String,
    pub depot_location: GeoPoint,
    commuters: VecDeque<Commuter>,
    total_spawned: u64,
    total_picked_up: u64,
    total_expired: u64,
    created_at_ms: u64,
}

impl DepotQueue {
    fn new(depot_id: String, route: String, depot_location: GeoPoint, now_ms: u64) -> Self {
        Self {
            depot_id,
            route,
            depot_location,
            commuters: VecDeque::new(),
            total_spawned: 0,
            total_picked_up: 0,
            total_expired: 0,
            created_at_ms: now_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.commuters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commuters.is_empty()
    }

    fn push_back(&mut self, commuter: Commuter) {
        self.commuters.push_back(commuter);
        self.total_spawned += 1;
    }

    fn remove(&mut self, id: &CommuterId) -> Option<Commuter> {
        let position = self.commuters.iter().position(|c| &c.id == id)?;
        self.commuters.remove(position)
    }

    /// Commuters within `max_distance_m` of the vehicle, in FIFO order, up
    /// to `max_count`. Never re-sorted by distance.
    fn available(
        &self,
        vehicle_location: GeoPoint,
        max_distance_m: f64,
        max_count: usize,
    ) -> Vec<Commuter> {
        let mut available = Vec::new();
        if max_count == 0 {
            return available;
        }
        for commuter in &self.commuters {
            if haversine_m(commuter.position, vehicle_location) <= max_distance_m {
                available.push(commuter.clone());
                if available.len() >= max_count {
                    break;
                }
            }
        }
        available
    }

    fn stats(&self, now_ms: u64) -> DepotQueueStats {
        DepotQueueStats {
            depot_id: self.depot_id.clone(),
            route: self.route.clone(),
            waiting: self.commuters.len(),
            total_spawned: self.total_spawned,
            total_picked_up: self.total_picked_up,
            total_expired: self.total_expired,
            uptime_secs: now_ms.saturating_sub(self.created_at_ms) / 1000,
        }
    }
}

/// Snapshot of one queue's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepotQueueStats {
    pub depot_id: String,
    pub route: String,
    pub waiting: usize,
    pub total_spawned: u64,
    pub total_picked_up: u64,
    pub total_expired: u64,
    pub uptime_secs: u64,
}

/// Snapshot of the whole reservoir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepotReservoirStats {
    pub total_spawned: u64,
    pub total_picked_up: u64,
    pub total_expired: u64,
    pub current_waiting: usize,
    pub uptime_secs: u64,
    pub queues: Vec<DepotQueueStats>,
}

#[derive(Resource)]
pub struct DepotReservoir {
    /// Lazily created queues keyed by (depot_id, route short name).
    queues: BTreeMap<(String, String), DepotQueue>,
    /// Which queue currently holds each commuter.
    index: HashMap<CommuterId, (String, String)>,
    depots: Vec<Depot>,
    /// Route short name -> indices into `depots`, for connected pairs only.
    connected: BTreeMap<String, Vec<usize>>,
    total_spawned: u64,
    total_picked_up: u64,
    total_expired: u64,
    created_at_ms: u64,
}

impl DepotReservoir {
    /// Compute the depot-route connectivity gate and set up an empty
    /// reservoir. `connection_radius_km` defaults to 5 in config.
    pub fn new(depots: Vec<Depot>, routes: &[Route], connection_radius_km: f64) -> Self {
        let radius_m = connection_radius_km * 1000.0;
        let mut connected: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for route in routes {
            for (depot_index, depot) in depots.iter().enumerate() {
                let min_dist = point_to_polyline_m(depot.location, &route.geometry);
                if min_dist <= radius_m {
                    connected
                        .entry(route.short_name.clone())
                        .or_default()
                        .push(depot_index);
                }
            }
        }
        Self {
            queues: BTreeMap::new(),
            index: HashMap::new(),
            depots,
            connected,
            total_spawned: 0,
            total_picked_up: 0,
            total_expired: 0,
            created_at_ms: 0,
        }
    }

    pub fn is_connected(&self, depot_id: &str, route: &str) -> bool {
        self.connected
            .get(route)
            .map(|indices| {
                indices
                    .iter()
                    .any(|&i| self.depots[i].depot_id == depot_id)
            })
            .unwrap_or(false)
    }

    pub fn route_has_connected_depot(&self, route: &str) -> bool {
        self.connected.get(route).is_some_and(|d| !d.is_empty())
    }

    /// Nearest connected depot to a point, for routing spawn requests.
    pub fn nearest_connected_depot(&self, route: &str, point: GeoPoint) -> Option<&Depot> {
        self.connected
            .get(route)?
            .iter()
            .map(|&i| (&self.depots[i], haversine_m(point, self.depots[i].location)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(depot, _)| depot)
    }

    /// Feed one spawner request through the connectivity gate. Disconnected
    /// routes are dropped silently (counted); otherwise the commuter spawns
    /// at the nearest connected depot.
    pub fn spawn_from_request(
        &mut self,
        ctx: &mut ReservoirCtx<'_>,
        request: &SpawnRequest,
    ) -> Option<Commuter> {
        let depot = match self.nearest_connected_depot(&request.route, request.spawn_point) {
            Some(depot) => depot.clone(),
            None => {
                ctx.stats.record_disconnected_drop();
                return None;
            }
        };
        self.spawn_commuter(
            ctx,
            &depot.depot_id,
            &request.route,
            depot.location,
            request.destination,
            request.priority,
            request.purpose,
            request.max_wait_ms,
        )
    }

    /// Spawn a commuter at the tail of the (depot, route) FIFO.
    ///
    /// The pair must be connected; otherwise this is a no-op with a warning.
    /// Emits the spawn event, stages the record-store insert, and updates
    /// counters before returning the commuter snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn_commuter(
        &mut self,
        ctx: &mut ReservoirCtx<'_>,
        depot_id: &str,
        route: &str,
        depot_location: GeoPoint,
        destination: GeoPoint,
        priority: f64,
        purpose: TripPurpose,
        max_wait_ms: u64,
    ) -> Option<Commuter> {
        if !self.is_connected(depot_id, route) {
            warn!("spawn for unconnected pair ({depot_id}, {route}) ignored");
            ctx.stats.record_spawn_rejected();
            return None;
        }
        if ctx.at_capacity() {
            ctx.stats.record_spawn_over_cap();
            debug!("commuter cap reached; dropping spawn at {depot_id}/{route}");
            return None;
        }

        let id = ctx.ids.allocate();
        if self.index.contains_key(&id) {
            ctx.stats.record_spawn_rejected();
            return None;
        }

        let commuter = Commuter {
            id: id.clone(),
            position: depot_location,
            destination,
            direction: Direction::Outbound,
            priority: priority.clamp(0.0, 1.0),
            spawn_time_ms: ctx.now_ms,
            max_wait_ms: ctx.effective_max_wait_ms(max_wait_ms),
            purpose,
            route: route.to_string(),
            depot_id: Some(depot_id.to_string()),
        };

        let key = (depot_id.to_string(), route.to_string());
        let queue = self.queues.entry(key.clone()).or_insert_with(|| {
            DepotQueue::new(
                depot_id.to_string(),
                route.to_string(),
                depot_location,
                ctx.now_ms,
            )
        });
        queue.push_back(commuter.clone());
        let queue_size = queue.len();
        self.index.insert(id, key);
        self.total_spawned += 1;
        ctx.stats.record_spawn();

        if ctx.bus.emit_spawned(&commuter, queue_size, ctx.real_ms).is_err() {
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

        debug!(
            "depot spawn {} at {depot_id}/{route}, {queue_size} waiting",
            commuter.id
        );
        Some(commuter)
    }

    /// Commuters available for pickup at a depot, FIFO order preserved.
    /// Returns an empty list when the queue does not exist.
    pub fn query_commuters(
        &self,
        depot_id: &str,
        route: &str,
        vehicle_location: GeoPoint,
        max_distance_m: f64,
        max_count: usize,
    ) -> Vec<Commuter> {
        match self
            .queues
            .get(&(depot_id.to_string(), route.to_string()))
        {
            Some(queue) => queue.available(vehicle_location, max_distance_m, max_count),
            None => Vec::new(),
        }
    }

    /// Terminal pickup transition. Idempotent: a second call returns false.
    pub fn mark_picked_up(&mut self, ctx: &mut ReservoirCtx<'_>, id: &CommuterId) -> bool {
        let Some(key) = self.index.remove(id) else {
            return false;
        };
        let Some(queue) = self.queues.get_mut(&key) else {
            return false;
        };
        let Some(commuter) = queue.remove(id) else {
            return false;
        };
        queue.total_picked_up += 1;
        self.total_picked_up += 1;
        ctx.stats.record_pickup();

        if ctx
            .bus
            .emit_picked_up(id.as_str(), commuter.wait_secs(ctx.now_ms), ctx.real_ms)
            .is_err()
        {
            ctx.stats.record_bus_event_dropped();
        }
        if ctx
            .records
            .push(PendingWrite::MarkBoarded(id.to_string()))
        {
            ctx.stats.record_write_dropped();
        }
        debug!("depot pickup {id}");
        true
    }

    /// Remove every commuter whose wait budget ran out. Returns how many
    /// expired; the caller stages the batch cleanup when the count is
    /// non-zero.
    pub fn expire_tick(&mut self, ctx: &mut ReservoirCtx<'_>) -> usize {
        let mut expired: Vec<(CommuterId, (String, String))> = Vec::new();
        for (key, queue) in &self.queues {
            for commuter in &queue.commuters {
                if commuter.is_expired(ctx.now_ms) {
                    expired.push((commuter.id.clone(), key.clone()));
                }
            }
        }
        expired.sort_by(|a, b| a.0.cmp(&b.0));

        for (id, key) in &expired {
            if let Some(queue) = self.queues.get_mut(key) {
                if queue.remove(id).is_some() {
                    queue.total_expired += 1;
                    self.total_expired += 1;
                    self.index.remove(id);
                    ctx.stats.record_expiration();
                    if ctx.bus.emit_expired(id.as_str(), ctx.real_ms).is_err() {
                        ctx.stats.record_bus_event_dropped();
                    }
                    debug!("depot expiration {id}");
                }
            }
        }
        expired.len()
    }

    /// How many times a commuter id appears across all queues. Exhaustive
    /// container walk, deliberately ignoring the side index.
    pub fn occurrences(&self, id: &CommuterId) -> usize {
        self.queues
            .values()
            .map(|queue| queue.commuters.iter().filter(|c| &c.id == id).count())
            .sum()
    }

    pub fn waiting_count(&self) -> usize {
        self.queues.values().map(DepotQueue::len).sum()
    }

    pub fn get_stats(&self, now_ms: u64) -> DepotReservoirStats {
        DepotReservoirStats {
            total_spawned: self.total_spawned,
            total_picked_up: self.total_picked_up,
            total_expired: self.total_expired,
            current_waiting: self.waiting_count(),
            uptime_secs: now_ms.saturating_sub(self.created_at_ms) / 1000,
            queues: self
                .queues
                .values()
                .map(|queue| queue.stats(now_ms))
                .collect(),
        }
    }
}
