//! Service assembly: load the world from the data source and wire every
//! resource into the ECS world.
//!
//! [build_service] is the single composition point: it fetches depots and
//! routes (fatal on failure, per the startup contract), builds the zone
//! cache before either reservoir can spawn, computes depot connectivity,
//! and inserts all resources. Collaborator clients arrive as boxed boundary
//! traits so tests can wire in-memory fakes.

use bevy_ecs::prelude::World;
use log::{info, warn};

use crate::clock::ServiceClock;
use crate::commuter::CommuterIdAllocator;
use crate::config::{ServiceConfig, SpawnIntervalOverride};
use crate::coordinator::Coordinators;
use crate::data_source::{DataSourceError, TransitDataSource};
use crate::event_bus::{BusClient, BusTransport};
use crate::record_store::{PassengerRecordStore, RecordStoreHandle, RecordStoreQueue};
use crate::reservoir::{DepotReservoir, RouteReservoir};
use crate::runner::ServiceEndTimeMs;
use crate::stats::SharedStats;
use crate::systems::config_refresh::DataSourceOutage;
use crate::systems::DataSourceHandle;
use crate::zones::{build_zone_cache, RouteTable, ZoneCache};

/// Parameters for building a service world.
#[derive(Debug, Clone)]
pub struct ServiceParams {
    pub config: ServiceConfig,
    /// Wall-clock ms mapped to service time 0. `None` uses the system clock.
    pub epoch_ms: Option<i64>,
    /// Optional service end time (ms); mainly for tests and replays.
    pub end_time_ms: Option<u64>,
}

impl Default for ServiceParams {
    fn default() -> Self {
        Self {
            config: ServiceConfig::default(),
            epoch_ms: None,
            end_time_ms: None,
        }
    }
}

impl ServiceParams {
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_epoch_ms(mut self, epoch_ms: i64) -> Self {
        self.epoch_ms = Some(epoch_ms);
        self
    }

    pub fn with_end_time_ms(mut self, end_time_ms: u64) -> Self {
        self.end_time_ms = Some(end_time_ms);
        self
    }
}

/// Startup failures. Data-source unavailability is fatal here; once the
/// world is built, outages only degrade to cached state.
#[derive(Debug)]
pub enum BuildError {
    DataSource(DataSourceError),
}

impl From<DataSourceError> for BuildError {
    fn from(err: DataSourceError) -> Self {
        BuildError::DataSource(err)
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::DataSource(err) => write!(f, "data source failure at startup: {err}"),
        }
    }
}

/// Load everything and populate the world. Returns the shared stats handle
/// so callers outside the service loop can observe counters.
pub fn build_service(
    world: &mut World,
    params: ServiceParams,
    data_source: Box<dyn TransitDataSource>,
    record_store: Box<dyn PassengerRecordStore>,
    bus_transport: Box<dyn BusTransport>,
) -> Result<SharedStats, BuildError> {
    let config = params.config;

    let depots = data_source.list_depots()?;
    let routes = data_source.list_routes()?;
    info!("loaded {} depots and {} routes", depots.len(), routes.len());

    let zones = match data_source.get_country_by_code(&config.country_code)? {
        Some(country) => build_zone_cache(
            data_source.as_ref(),
            country.id,
            &routes,
            &depots,
            config.spatial_cache.buffer_km,
            &config.zone_rates,
        )?,
        None => {
            warn!(
                "country {} not found in data source; starting with no zones",
                config.country_code
            );
            ZoneCache::from_zones(Vec::new(), Vec::new())
        }
    };

    let depot_reservoir = DepotReservoir::new(
        depots,
        &routes,
        config.depot.connection_radius_km,
    );
    let route_reservoir = RouteReservoir::new(
        routes.iter().map(|r| r.short_name.clone()).collect(),
        config.reservoir.grid_cell_size_degrees,
    );

    let epoch_ms = params.epoch_ms.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    });

    let stats = SharedStats::new();
    world.insert_resource(ServiceClock::with_epoch(epoch_ms));
    world.insert_resource(Coordinators::from_config(&config));
    world.insert_resource(SpawnIntervalOverride::default());
    world.insert_resource(DataSourceOutage::default());
    world.insert_resource(CommuterIdAllocator::default());
    world.insert_resource(RouteTable::new(routes));
    world.insert_resource(zones);
    world.insert_resource(depot_reservoir);
    world.insert_resource(route_reservoir);
    world.insert_resource(BusClient::new(bus_transport));
    world.insert_resource(RecordStoreQueue::new(&config.record_store));
    world.insert_resource(RecordStoreHandle {
        store: record_store,
    });
    world.insert_resource(DataSourceHandle {
        source: data_source,
    });
    if let Some(end_time_ms) = params.end_time_ms {
        world.insert_resource(ServiceEndTimeMs(end_time_ms));
    }
    world.insert_resource(stats.clone());
    world.insert_resource(config);

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::InProcessBus;
    use crate::test_helpers::{FixtureDataSource, MemoryRecordStore};

    #[test]
    fn data_source_outage_is_fatal_at_startup() {
        let fixture = FixtureDataSource::default();
        fixture.set_failing(true);

        let mut world = World::new();
        let result = build_service(
            &mut world,
            ServiceParams::default().with_epoch_ms(0),
            Box::new(fixture),
            Box::new(MemoryRecordStore::default()),
            Box::new(InProcessBus::new()),
        );
        assert!(matches!(result, Err(BuildError::DataSource(_))));
    }

    #[test]
    fn built_world_carries_every_service_resource() {
        let mut world = World::new();
        build_service(
            &mut world,
            ServiceParams::default().with_epoch_ms(0).with_end_time_ms(1),
            Box::new(FixtureDataSource::default()),
            Box::new(MemoryRecordStore::default()),
            Box::new(InProcessBus::new()),
        )
        .expect("fixture service builds");

        assert!(world.contains_resource::<ServiceClock>());
        assert!(world.contains_resource::<Coordinators>());
        assert!(world.contains_resource::<DepotReservoir>());
        assert!(world.contains_resource::<RouteReservoir>());
        assert!(world.contains_resource::<ZoneCache>());
        assert!(world.contains_resource::<RouteTable>());
        assert!(world.contains_resource::<ServiceConfig>());
        assert!(world.contains_resource::<ServiceEndTimeMs>());
    }

    #[test]
    fn unknown_country_degrades_to_empty_zone_cache() {
        let mut fixture = FixtureDataSource::default();
        fixture.country_missing = true;

        let mut world = World::new();
        build_service(
            &mut world,
            ServiceParams::default().with_epoch_ms(0),
            Box::new(fixture),
            Box::new(MemoryRecordStore::default()),
            Box::new(InProcessBus::new()),
        )
        .expect("service still builds");

        let zones = world.resource::<ZoneCache>();
        assert!(zones.population_zones().is_empty());
        assert!(zones.amenity_zones().is_empty());
    }
}
