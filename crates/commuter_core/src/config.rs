//! Service configuration: every operational knob in one read-only snapshot.
//!
//! The config is assembled once at startup (defaults -> environment ->
//! programmatic overrides) and inserted as an immutable resource; nothing
//! mutates it afterwards. The only runtime-adjustable value, the spawning
//! interval, travels through a separate override resource refreshed from the
//! data source.
//!
//! Environment variables use the `COMMUTER_` prefix with dots flattened to
//! underscores, e.g. `data_source.base_url` -> `COMMUTER_DATA_SOURCE_BASE_URL`.

use std::collections::HashMap;
use std::env;

use bevy_ecs::prelude::Resource;

use crate::patterns;

const DEFAULT_DATA_SOURCE_URL: &str = "http://localhost:1337";
const DEFAULT_EVENT_BUS_URL: &str = "http://localhost:1337";
const DEFAULT_COUNTRY_CODE: &str = "BB";

const DEFAULT_BUFFER_KM: f64 = 5.0;
const DEFAULT_CONNECTION_RADIUS_KM: f64 = 5.0;

const DEFAULT_MAX_WAIT_MINUTES: u64 = 30;
const DEFAULT_EXPIRATION_CHECK_SECONDS: u64 = 10;
const DEFAULT_PICKUP_DISTANCE_M: f64 = 100.0;
const DEFAULT_GRID_CELL_SIZE_DEGREES: f64 = 0.01;

const DEFAULT_DEPOT_INTERVAL_SECONDS: u64 = 30;
const DEFAULT_ROUTE_INTERVAL_SECONDS: u64 = 30;
const DEFAULT_WINDOW_MINUTES: u32 = 5;
const DEFAULT_MAX_ACTIVE_COMMUTERS: u64 = 10_000;

const DEFAULT_API_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_API_RETRY_DELAY_SECONDS: u64 = 2;
const DEFAULT_API_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 600;

const DEFAULT_RECORD_QUEUE_CAPACITY: usize = 500;
const DEFAULT_BUS_POLL_SECONDS: u64 = 1;
const DEFAULT_CONFIG_REFRESH_SECONDS: u64 = 60;
const DEFAULT_STATS_INTERVAL_SECONDS: u64 = 300;

/// Data-source (read-only fleet API) settings.
#[derive(Debug, Clone)]
pub struct DataSourceConfig {
    pub base_url: String,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub timeout_seconds: u64,
    /// TTL for cached list responses, in seconds.
    pub cache_ttl_seconds: u64,
}

/// Event-bus transport settings.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub url: String,
    pub poll_interval_seconds: u64,
}

/// Spatial zone-cache settings.
#[derive(Debug, Clone)]
pub struct SpatialCacheConfig {
    /// Corridor radius around routes and depots, in kilometers.
    pub buffer_km: f64,
}

/// Depot-reservoir settings.
#[derive(Debug, Clone)]
pub struct DepotConfig {
    /// A (depot, route) pair is connected when the depot lies within this
    /// many kilometers of some route vertex.
    pub connection_radius_km: f64,
}

/// Shared reservoir lifecycle settings.
#[derive(Debug, Clone)]
pub struct ReservoirConfig {
    /// Fallback wait budget when a commuter carries none of its own.
    pub max_wait_minutes: u64,
    pub expiration_check_seconds: u64,
    pub default_pickup_distance_m: f64,
    pub grid_cell_size_degrees: f64,
}

/// Poisson-spawning settings.
#[derive(Debug, Clone)]
pub struct SpawningConfig {
    pub depot_interval_seconds: u64,
    pub route_interval_seconds: u64,
    pub window_minutes: u32,
    /// Cap on live commuters across both reservoirs.
    pub max_active_commuters: u64,
}

/// Record-store mirror settings.
#[derive(Debug, Clone)]
pub struct RecordStoreConfig {
    /// Bounded pending-write queue size; overflow drops the oldest write.
    pub queue_capacity: usize,
}

/// Zone-type rate table: per-type overrides layered over the defaults in
/// [crate::patterns], plus additional types to classify as population zones.
#[derive(Debug, Clone, Default)]
pub struct ZoneRateTable {
    pub rate_overrides: HashMap<String, f64>,
    pub extra_population_types: Vec<String>,
}

impl ZoneRateTable {
    /// Base spawn rate per hour for a zone type.
    pub fn rate_for(&self, zone_type: &str) -> f64 {
        self.rate_overrides
            .get(zone_type)
            .copied()
            .unwrap_or_else(|| patterns::default_base_rate_per_hour(zone_type))
    }

    /// Whether a zone type counts as a population (residential-like) zone.
    pub fn is_population_type(&self, zone_type: &str) -> bool {
        patterns::POPULATION_ZONE_TYPES.contains(&zone_type)
            || self.extra_population_types.iter().any(|t| t == zone_type)
    }
}

/// The full configuration surface, read-only after startup.
#[derive(Debug, Clone, Resource)]
pub struct ServiceConfig {
    pub data_source: DataSourceConfig,
    pub event_bus: EventBusConfig,
    pub spatial_cache: SpatialCacheConfig,
    pub depot: DepotConfig,
    pub reservoir: ReservoirConfig,
    pub spawning: SpawningConfig,
    pub record_store: RecordStoreConfig,
    pub zone_rates: ZoneRateTable,
    /// ISO country code the zone data is fetched for.
    pub country_code: String,
    pub prng_seed: u64,
    pub config_refresh_seconds: u64,
    pub stats_interval_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_source: DataSourceConfig {
                base_url: DEFAULT_DATA_SOURCE_URL.to_string(),
                retry_attempts: DEFAULT_API_RETRY_ATTEMPTS,
                retry_delay_seconds: DEFAULT_API_RETRY_DELAY_SECONDS,
                timeout_seconds: DEFAULT_API_TIMEOUT_SECONDS,
                cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            },
            event_bus: EventBusConfig {
                url: DEFAULT_EVENT_BUS_URL.to_string(),
                poll_interval_seconds: DEFAULT_BUS_POLL_SECONDS,
            },
            spatial_cache: SpatialCacheConfig {
                buffer_km: DEFAULT_BUFFER_KM,
            },
            depot: DepotConfig {
                connection_radius_km: DEFAULT_CONNECTION_RADIUS_KM,
            },
            reservoir: ReservoirConfig {
                max_wait_minutes: DEFAULT_MAX_WAIT_MINUTES,
                expiration_check_seconds: DEFAULT_EXPIRATION_CHECK_SECONDS,
                default_pickup_distance_m: DEFAULT_PICKUP_DISTANCE_M,
                grid_cell_size_degrees: DEFAULT_GRID_CELL_SIZE_DEGREES,
            },
            spawning: SpawningConfig {
                depot_interval_seconds: DEFAULT_DEPOT_INTERVAL_SECONDS,
                route_interval_seconds: DEFAULT_ROUTE_INTERVAL_SECONDS,
                window_minutes: DEFAULT_WINDOW_MINUTES,
                max_active_commuters: DEFAULT_MAX_ACTIVE_COMMUTERS,
            },
            record_store: RecordStoreConfig {
                queue_capacity: DEFAULT_RECORD_QUEUE_CAPACITY,
            },
            zone_rates: ZoneRateTable::default(),
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            prng_seed: 0,
            config_refresh_seconds: DEFAULT_CONFIG_REFRESH_SECONDS,
            stats_interval_seconds: DEFAULT_STATS_INTERVAL_SECONDS,
        }
    }
}

impl ServiceConfig {
    /// Defaults with any `COMMUTER_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply recognized environment overrides in place.
    pub fn apply_env(&mut self) {
        override_string("DATA_SOURCE_BASE_URL", &mut self.data_source.base_url);
        override_string("EVENT_BUS_URL", &mut self.event_bus.url);
        override_string("COUNTRY_CODE", &mut self.country_code);
        override_parsed("SPATIAL_CACHE_BUFFER_KM", &mut self.spatial_cache.buffer_km);
        override_parsed(
            "DEPOT_CONNECTION_RADIUS_KM",
            &mut self.depot.connection_radius_km,
        );
        override_parsed(
            "RESERVOIR_MAX_WAIT_MINUTES",
            &mut self.reservoir.max_wait_minutes,
        );
        override_parsed(
            "RESERVOIR_EXPIRATION_CHECK_SECONDS",
            &mut self.reservoir.expiration_check_seconds,
        );
        override_parsed(
            "RESERVOIR_DEFAULT_PICKUP_DISTANCE_M",
            &mut self.reservoir.default_pickup_distance_m,
        );
        override_parsed(
            "RESERVOIR_GRID_CELL_SIZE_DEGREES",
            &mut self.reservoir.grid_cell_size_degrees,
        );
        override_parsed(
            "SPAWNING_DEPOT_INTERVAL_SECONDS",
            &mut self.spawning.depot_interval_seconds,
        );
        override_parsed(
            "SPAWNING_ROUTE_INTERVAL_SECONDS",
            &mut self.spawning.route_interval_seconds,
        );
        override_parsed("SPAWNING_WINDOW_MINUTES", &mut self.spawning.window_minutes);
        override_parsed(
            "SPAWNING_MAX_ACTIVE_COMMUTERS",
            &mut self.spawning.max_active_commuters,
        );
        override_parsed("PRNG_SEED", &mut self.prng_seed);
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.prng_seed = seed;
        self
    }

    pub fn with_buffer_km(mut self, buffer_km: f64) -> Self {
        self.spatial_cache.buffer_km = buffer_km;
        self
    }

    pub fn with_connection_radius_km(mut self, radius_km: f64) -> Self {
        self.depot.connection_radius_km = radius_km;
        self
    }

    pub fn with_max_active_commuters(mut self, cap: u64) -> Self {
        self.spawning.max_active_commuters = cap;
        self
    }

    pub fn with_country_code(mut self, code: &str) -> Self {
        self.country_code = code.to_string();
        self
    }
}

/// Runtime overrides for spawning, refreshed from the data-source config
/// endpoint. `None` fields mean "use the static config".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Resource)]
pub struct SpawnIntervalOverride {
    pub interval_seconds: Option<u64>,
    pub window_minutes: Option<u32>,
}

fn env_key(suffix: &str) -> String {
    format!("COMMUTER_{suffix}")
}

fn override_string(suffix: &str, slot: &mut String) {
    if let Ok(value) = env::var(env_key(suffix)) {
        if !value.is_empty() {
            *slot = value;
        }
    }
}

fn override_parsed<T: std::str::FromStr>(suffix: &str, slot: &mut T) {
    if let Ok(value) = env::var(env_key(suffix)) {
        if let Ok(parsed) = value.parse::<T>() {
            *slot = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_contract() {
        let config = ServiceConfig::default();
        assert_eq!(config.depot.connection_radius_km, 5.0);
        assert_eq!(config.spatial_cache.buffer_km, 5.0);
        assert_eq!(config.reservoir.expiration_check_seconds, 10);
        assert_eq!(config.reservoir.grid_cell_size_degrees, 0.01);
        assert_eq!(config.spawning.depot_interval_seconds, 30);
        assert_eq!(config.spawning.max_active_commuters, 10_000);
        assert_eq!(config.record_store.queue_capacity, 500);
    }

    #[test]
    fn builders_override_defaults() {
        let config = ServiceConfig::default()
            .with_seed(42)
            .with_connection_radius_km(0.5)
            .with_max_active_commuters(10);
        assert_eq!(config.prng_seed, 42);
        assert_eq!(config.depot.connection_radius_km, 0.5);
        assert_eq!(config.spawning.max_active_commuters, 10);
    }

    #[test]
    fn env_overrides_are_applied() {
        env::set_var("COMMUTER_SPAWNING_DEPOT_INTERVAL_SECONDS", "15");
        env::set_var("COMMUTER_DATA_SOURCE_BASE_URL", "http://example:9999");
        let config = ServiceConfig::from_env();
        env::remove_var("COMMUTER_SPAWNING_DEPOT_INTERVAL_SECONDS");
        env::remove_var("COMMUTER_DATA_SOURCE_BASE_URL");

        assert_eq!(config.spawning.depot_interval_seconds, 15);
        assert_eq!(config.data_source.base_url, "http://example:9999");
    }

    #[test]
    fn zone_rate_table_layers_overrides() {
        let mut table = ZoneRateTable::default();
        table.rate_overrides.insert("residential".to_string(), 9.0);
        table.extra_population_types.push("estate".to_string());

        assert_eq!(table.rate_for("residential"), 9.0);
        assert_eq!(
            table.rate_for("school"),
            patterns::default_base_rate_per_hour("school")
        );
        assert!(table.is_population_type("estate"));
        assert!(table.is_population_type("urban"));
        assert!(!table.is_population_type("school"));
    }
}
