//! Read-only adapter over the transit-fleet data API.
//!
//! The [TransitDataSource] trait is the boundary contract: the HTTP
//! implementation talks to the deployed fleet server (paginated, retried,
//! TTL-cached), while tests supply in-memory fixtures. Everything returned
//! here is already validated domain data; wire-format quirks stay inside
//! [response] and [parser].

mod cache;
pub mod client;
pub mod error;
pub mod parser;
pub mod response;

pub use client::HttpDataSource;
pub use error::DataSourceError;

use crate::geo::GeoPoint;

/// A transit depot: spawn anchor for depot-reservoir commuters.
#[derive(Debug, Clone, PartialEq)]
pub struct Depot {
    pub depot_id: String,
    pub name: String,
    pub location: GeoPoint,
    pub capacity: u32,
}

/// A transit route with its ordered shape polyline. Immutable once loaded;
/// routes with fewer than two points are never constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub short_name: String,
    pub long_name: String,
    pub geometry: Vec<GeoPoint>,
    /// Derived polyline length in meters.
    pub length_m: f64,
}

/// A land-use polygon zone.
#[derive(Debug, Clone, PartialEq)]
pub struct LanduseZone {
    pub id: i64,
    pub zone_type: String,
    pub center: GeoPoint,
    pub vertices: Vec<GeoPoint>,
}

/// A point of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    pub id: i64,
    pub name: String,
    pub poi_type: String,
    pub location: GeoPoint,
}

/// A named place.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub id: i64,
    pub name: String,
    pub place_type: String,
    pub location: GeoPoint,
}

/// An administrative region.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: i64,
    pub name: String,
    pub region_type: String,
}

/// A country row, used to resolve the configured ISO code to an id.
#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub id: i64,
    pub name: String,
    pub code: String,
}

/// Runtime spawning overrides served by the data source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawningOverride {
    pub spawn_interval_seconds: Option<u64>,
    pub window_minutes: Option<u32>,
}

/// Boundary contract for the fleet data API.
pub trait TransitDataSource: Send + Sync {
    fn list_depots(&self) -> Result<Vec<Depot>, DataSourceError>;
    fn list_routes(&self) -> Result<Vec<Route>, DataSourceError>;
    fn list_landuse_zones(&self, country_id: i64) -> Result<Vec<LanduseZone>, DataSourceError>;
    fn list_pois(&self, country_id: i64) -> Result<Vec<Poi>, DataSourceError>;
    fn list_places(&self, country_id: i64) -> Result<Vec<Place>, DataSourceError>;
    fn list_regions(&self, country_id: i64) -> Result<Vec<Region>, DataSourceError>;
    fn get_country_by_code(&self, code: &str) -> Result<Option<Country>, DataSourceError>;
    fn get_spawning_config(
        &self,
        country_code: &str,
    ) -> Result<Option<SpawningOverride>, DataSourceError>;
}
