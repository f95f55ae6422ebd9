//! Shared fixtures for unit and scenario tests: an in-memory data source,
//! a recording record store, and a fully wired test world.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bevy_ecs::prelude::World;

use crate::clock::ServiceClock;
use crate::commuter::CommuterIdAllocator;
use crate::config::ServiceConfig;
use crate::data_source::{
    Country, DataSourceError, Depot, LanduseZone, Place, Poi, Region, Route, SpawningOverride,
    TransitDataSource,
};
use crate::event_bus::{BusClient, InProcessBus};
use crate::geo::{polyline_length_m, GeoPoint};
use crate::record_store::{
    PassengerRecord, PassengerRecordStore, RecordStoreError, RecordStoreQueue,
};
use crate::reservoir::{DepotReservoir, ReservoirCtx, RouteReservoir};
use crate::service::{build_service, ServiceParams};
use crate::stats::SharedStats;

/// Main test depot: Bridgetown-ish coordinates used across scenarios.
pub const DEPOT_LOCATION: (f64, f64) = (13.0969, -59.6145);
/// Epoch mapping service time 0 to 08:00 UTC (morning rush).
pub const TEST_EPOCH_MS: i64 = 8 * 3_600_000;

pub fn point(lat: f64, lon: f64) -> GeoPoint {
    GeoPoint::new(lat, lon).expect("valid test point")
}

pub fn make_route(short_name: &str, vertices: Vec<GeoPoint>) -> Route {
    let length_m = polyline_length_m(&vertices);
    Route {
        short_name: short_name.to_string(),
        long_name: format!("{short_name} corridor"),
        geometry: vertices,
        length_m,
    }
}

pub fn make_depot(depot_id: &str, location: GeoPoint) -> Depot {
    Depot {
        depot_id: depot_id.to_string(),
        name: depot_id.to_string(),
        location,
        capacity: 40,
    }
}

/// Route "1A": starts at the test depot and runs north along the coast.
pub fn route_1a() -> Route {
    make_route(
        "1A",
        vec![
            point(DEPOT_LOCATION.0, DEPOT_LOCATION.1),
            point(13.1139, -59.6128),
            point(13.1700, -59.6300),
            point(13.2508, -59.6436),
        ],
    )
}

/// Route "9Z": entirely more than 20 km from the test depot.
pub fn route_9z() -> Route {
    make_route(
        "9Z",
        vec![point(13.3000, -59.5500), point(13.3300, -59.5400)],
    )
}

/// In-memory data source serving a fixed Barbados-flavored fixture.
pub struct FixtureDataSource {
    pub depots: Vec<Depot>,
    pub routes: Vec<Route>,
    pub landuse: Vec<LanduseZone>,
    pub pois: Vec<Poi>,
    pub places: Vec<Place>,
    pub regions: Vec<Region>,
    pub spawning: Option<SpawningOverride>,
    /// When set, country lookups return no match.
    pub country_missing: bool,
    fail: AtomicBool,
}

impl Default for FixtureDataSource {
    fn default() -> Self {
        let residential = LanduseZone {
            id: 1,
            zone_type: "residential".to_string(),
            center: point(13.1150, -59.6140),
            vertices: vec![
                point(13.1100, -59.6180),
                point(13.1200, -59.6180),
                point(13.1200, -59.6100),
                point(13.1100, -59.6100),
            ],
        };
        let pois = vec![
            Poi {
                id: 10,
                name: "Harbour Mall".to_string(),
                poi_type: "commercial".to_string(),
                location: point(13.1700, -59.6290),
            },
            Poi {
                id: 11,
                name: "North Point School".to_string(),
                poi_type: "school".to_string(),
                location: point(13.2500, -59.6430),
            },
            Poi {
                id: 12,
                name: "Coast Clinic".to_string(),
                poi_type: "clinic".to_string(),
                location: point(13.1139, -59.6128),
            },
        ];
        Self {
            depots: vec![make_depot("DEP-MAIN", point(DEPOT_LOCATION.0, DEPOT_LOCATION.1))],
            routes: vec![route_1a(), route_9z()],
            landuse: vec![residential],
            pois,
            places: Vec::new(),
            regions: Vec::new(),
            spawning: None,
            country_missing: false,
            fail: AtomicBool::new(false),
        }
    }
}

impl FixtureDataSource {
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }

    fn check(&self) -> Result<(), DataSourceError> {
        if self.fail.load(Ordering::Relaxed) {
            Err(DataSourceError::Unavailable { attempts: 3 })
        } else {
            Ok(())
        }
    }
}

impl TransitDataSource for FixtureDataSource {
    fn list_depots(&self) -> Result<Vec<Depot>, DataSourceError> {
        self.check()?;
        Ok(self.depots.clone())
    }

    fn list_routes(&self) -> Result<Vec<Route>, DataSourceError> {
        self.check()?;
        Ok(self.routes.clone())
    }

    fn list_landuse_zones(&self, _country_id: i64) -> Result<Vec<LanduseZone>, DataSourceError> {
        self.check()?;
        Ok(self.landuse.clone())
    }

    fn list_pois(&self, _country_id: i64) -> Result<Vec<Poi>, DataSourceError> {
        self.check()?;
        Ok(self.pois.clone())
    }

    fn list_places(&self, _country_id: i64) -> Result<Vec<Place>, DataSourceError> {
        self.check()?;
        Ok(self.places.clone())
    }

    fn list_regions(&self, _country_id: i64) -> Result<Vec<Region>, DataSourceError> {
        self.check()?;
        Ok(self.regions.clone())
    }

    fn get_country_by_code(&self, code: &str) -> Result<Option<Country>, DataSourceError> {
        self.check()?;
        if self.country_missing {
            return Ok(None);
        }
        Ok(Some(Country {
            id: 1,
            name: "Barbados".to_string(),
            code: code.to_uppercase(),
        }))
    }

    fn get_spawning_config(
        &self,
        _country_code: &str,
    ) -> Result<Option<SpawningOverride>, DataSourceError> {
        self.check()?;
        Ok(self.spawning)
    }
}

/// What the memory record store saw, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Insert(String),
    MarkBoarded(String),
    MarkAlighted(String),
    CleanupExpired,
}

/// Recording record store with an injectable failure mode.
#[derive(Default)]
pub struct MemoryRecordStore {
    calls: Mutex<Vec<RecordedCall>>,
    fail: AtomicBool,
}

impl MemoryRecordStore {
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: RecordedCall) -> Result<(), RecordStoreError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(RecordStoreError::Status(503));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        Ok(())
    }
}

impl PassengerRecordStore for MemoryRecordStore {
    fn insert(&self, record: &PassengerRecord) -> Result<(), RecordStoreError> {
        self.record(RecordedCall::Insert(record.passenger_id.clone()))
    }

    fn mark_boarded(&self, passenger_id: &str) -> Result<(), RecordStoreError> {
        self.record(RecordedCall::MarkBoarded(passenger_id.to_string()))
    }

    fn mark_alighted(&self, passenger_id: &str) -> Result<(), RecordStoreError> {
        self.record(RecordedCall::MarkAlighted(passenger_id.to_string()))
    }

    fn cleanup_expired(&self) -> Result<(), RecordStoreError> {
        self.record(RecordedCall::CleanupExpired)
    }

    fn near_location(
        &self,
        _lat: f64,
        _lon: f64,
        _radius_m: f64,
        _route_id: Option<&str>,
        _status: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, RecordStoreError> {
        Ok(Vec::new())
    }
}

/// Handles to the test world's observable collaborators.
pub struct TestService {
    pub world: World,
    pub bus: InProcessBus,
    pub stats: SharedStats,
    pub store: std::sync::Arc<MemoryRecordStoreShared>,
}

/// `Arc`-shareable wrapper so tests keep a handle to the store the world
/// owns.
#[derive(Default)]
pub struct MemoryRecordStoreShared {
    inner: MemoryRecordStore,
}

impl MemoryRecordStoreShared {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.calls()
    }

    pub fn set_failing(&self, failing: bool) {
        self.inner.set_failing(failing);
    }
}

impl PassengerRecordStore for std::sync::Arc<MemoryRecordStoreShared> {
    fn insert(&self, record: &PassengerRecord) -> Result<(), RecordStoreError> {
        self.inner.insert(record)
    }

    fn mark_boarded(&self, passenger_id: &str) -> Result<(), RecordStoreError> {
        self.inner.mark_boarded(passenger_id)
    }

    fn mark_alighted(&self, passenger_id: &str) -> Result<(), RecordStoreError> {
        self.inner.mark_alighted(passenger_id)
    }

    fn cleanup_expired(&self) -> Result<(), RecordStoreError> {
        self.inner.cleanup_expired()
    }

    fn near_location(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        route_id: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, RecordStoreError> {
        self.inner.near_location(lat, lon, radius_m, route_id, status)
    }
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig::default().with_seed(42)
}

/// Build a fully wired world from the default fixture.
pub fn build_test_service(config: ServiceConfig, end_time_ms: u64) -> TestService {
    build_test_service_with(FixtureDataSource::default(), config, end_time_ms)
}

pub fn build_test_service_with(
    fixture: FixtureDataSource,
    config: ServiceConfig,
    end_time_ms: u64,
) -> TestService {
    let mut world = World::new();
    let bus = InProcessBus::new();
    let store = std::sync::Arc::new(MemoryRecordStoreShared::default());
    let params = ServiceParams::default()
        .with_config(config)
        .with_epoch_ms(TEST_EPOCH_MS)
        .with_end_time_ms(end_time_ms);
    let stats = build_service(
        &mut world,
        params,
        Box::new(fixture),
        Box::new(store.clone()),
        Box::new(bus.clone()),
    )
    .expect("fixture service builds");
    TestService {
        world,
        bus,
        stats,
        store,
    }
}

/// Borrow both reservoirs plus an assembled [ReservoirCtx] out of a world.
///
/// Resources are temporarily removed and reinserted so the context can hold
/// plain references without fighting the ECS borrow rules.
pub fn with_reservoirs<R>(
    world: &mut World,
    f: impl FnOnce(&mut DepotReservoir, &mut RouteReservoir, &mut ReservoirCtx<'_>) -> R,
) -> R {
    let mut depot = world
        .remove_resource::<DepotReservoir>()
        .expect("depot reservoir");
    let mut route = world
        .remove_resource::<RouteReservoir>()
        .expect("route reservoir");
    let mut records = world
        .remove_resource::<RecordStoreQueue>()
        .expect("record queue");
    let mut ids = world
        .remove_resource::<CommuterIdAllocator>()
        .expect("id allocator");
    let bus = world.remove_resource::<BusClient>().expect("bus client");
    let stats = world.resource::<SharedStats>().clone();
    let max_active = world
        .resource::<ServiceConfig>()
        .spawning
        .max_active_commuters;
    let (now_ms, real_ms) = {
        let clock = world.resource::<ServiceClock>();
        (clock.now(), clock.now_real_ms())
    };

    let result = {
        let mut ctx = ReservoirCtx {
            now_ms,
            real_ms,
            bus: &bus,
            records: &mut records,
            stats: &stats,
            ids: &mut ids,
            zones: None,
            max_active,
            default_max_wait_ms: 30 * 60_000,
        };
        f(&mut depot, &mut route, &mut ctx)
    };

    world.insert_resource(depot);
    world.insert_resource(route);
    world.insert_resource(records);
    world.insert_resource(ids);
    world.insert_resource(bus);
    result
}
