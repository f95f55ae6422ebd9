//! Spatial zone cache: land-use and amenity zones filtered to the service
//! corridor, plus the route lookup table shared with the spawner.
//!
//! The cache is built exactly once at startup, after routes and depots are
//! loaded and before either reservoir spawns. The activity buffer around
//! routes and depots is realized as a corridor-membership test: a feature is
//! inside the buffer iff its center or any polygon vertex lies within
//! `buffer_km` of some route vertex or depot point. For the point and
//! parish-scale polygon features the data source serves, this is equivalent
//! to intersecting the inflated union polygon.

use bevy_ecs::prelude::Resource;
use log::{debug, info};

use crate::config::ZoneRateTable;
use crate::data_source::{DataSourceError, Depot, Route, TransitDataSource};
use crate::geo::{haversine_m, point_to_polyline_m, GeoPoint};
use crate::patterns;

/// Whether a zone seeds population demand or draws visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Population,
    Amenity,
}

/// A demand-seeding zone: a land-use polygon or a point feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub id: String,
    pub zone_type: String,
    pub kind: ZoneKind,
    pub name: String,
    pub center: GeoPoint,
    /// Polygon vertices; empty for point features.
    pub vertices: Vec<GeoPoint>,
    pub base_rate_per_hour: f64,
    /// Bitmask over hours 0-23.
    peak_hours: u32,
}

impl Zone {
    /// Build a zone from raw parts, pulling its rate, kind, and peak hours
    /// from the configured tables.
    pub fn from_type(
        id: String,
        zone_type: String,
        name: String,
        center: GeoPoint,
        vertices: Vec<GeoPoint>,
        rates: &ZoneRateTable,
    ) -> Self {
        let kind = if rates.is_population_type(&zone_type) {
            ZoneKind::Population
        } else {
            ZoneKind::Amenity
        };
        Zone {
            id,
            base_rate_per_hour: rates.rate_for(&zone_type),
            peak_hours: peak_mask(patterns::default_peak_hours(&zone_type)),
            kind,
            name,
            center,
            vertices,
            zone_type,
        }
    }

    pub fn is_peak_hour(&self, hour: u8) -> bool {
        hour < 24 && self.peak_hours & (1 << hour) != 0
    }
}

fn peak_mask(hours: &[u8]) -> u32 {
    hours
        .iter()
        .filter(|h| **h < 24)
        .fold(0u32, |mask, h| mask | (1 << *h))
}

/// Load counts recorded while building the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneCacheStats {
    pub landuse_fetched: usize,
    pub pois_fetched: usize,
    pub places_fetched: usize,
    pub regions_fetched: usize,
    pub population_retained: usize,
    pub amenity_retained: usize,
    pub discarded_outside_buffer: usize,
}

/// Read-only zone snapshots for the spawner.
#[derive(Debug, Resource)]
pub struct ZoneCache {
    population: Vec<Zone>,
    amenity: Vec<Zone>,
    stats: ZoneCacheStats,
}

impl ZoneCache {
    pub fn population_zones(&self) -> &[Zone] {
        &self.population
    }

    pub fn amenity_zones(&self) -> &[Zone] {
        &self.amenity
    }

    pub fn statistics(&self) -> ZoneCacheStats {
        self.stats
    }

    /// Name of the closest amenity zone within `within_m` meters, used to
    /// label destinations in mirrored passenger records.
    pub fn nearest_amenity_name(&self, point: GeoPoint, within_m: f64) -> Option<String> {
        let mut best: Option<(f64, &Zone)> = None;
        for zone in &self.amenity {
            let d = haversine_m(point, zone.center);
            if d <= within_m && best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, zone));
            }
        }
        best.map(|(_, zone)| {
            if zone.name.is_empty() {
                zone.zone_type.clone()
            } else {
                zone.name.clone()
            }
        })
    }

    /// Build the cache from fixed zone lists (tests and replays).
    pub fn from_zones(population: Vec<Zone>, amenity: Vec<Zone>) -> Self {
        let stats = ZoneCacheStats {
            population_retained: population.len(),
            amenity_retained: amenity.len(),
            ..Default::default()
        };
        Self {
            population,
            amenity,
            stats,
        }
    }
}

/// The corridor test: any probe point within `buffer_m` of a route vertex or
/// depot location.
fn within_corridor(probes: &[GeoPoint], routes: &[Route], depots: &[Depot], buffer_m: f64) -> bool {
    for probe in probes {
        for route in routes {
            if point_to_polyline_m(*probe, &route.geometry) <= buffer_m {
                return true;
            }
        }
        for depot in depots {
            if haversine_m(*probe, depot.location) <= buffer_m {
                return true;
            }
        }
    }
    false
}

/// Fetch all geographic features for the country and retain those inside the
/// activity buffer, partitioned into population and amenity zones.
pub fn build_zone_cache(
    data_source: &dyn TransitDataSource,
    country_id: i64,
    routes: &[Route],
    depots: &[Depot],
    buffer_km: f64,
    rates: &ZoneRateTable,
) -> Result<ZoneCache, DataSourceError> {
    let buffer_m = buffer_km * 1000.0;
    let landuse = data_source.list_landuse_zones(country_id)?;
    let pois = data_source.list_pois(country_id)?;
    let places = data_source.list_places(country_id)?;
    let regions = data_source.list_regions(country_id)?;

    let mut stats = ZoneCacheStats {
        landuse_fetched: landuse.len(),
        pois_fetched: pois.len(),
        places_fetched: places.len(),
        regions_fetched: regions.len(),
        ..Default::default()
    };

    let mut population = Vec::new();
    let mut amenity = Vec::new();

    fn keep(
        zone: Zone,
        stats: &mut ZoneCacheStats,
        population: &mut Vec<Zone>,
        amenity: &mut Vec<Zone>,
    ) {
        match zone.kind {
            ZoneKind::Population => {
                stats.population_retained += 1;
                population.push(zone);
            }
            ZoneKind::Amenity => {
                stats.amenity_retained += 1;
                amenity.push(zone);
            }
        }
    }

    for zone in &landuse {
        let mut probes = vec![zone.center];
        probes.extend_from_slice(&zone.vertices);
        if !within_corridor(&probes, routes, depots, buffer_m) {
            stats.discarded_outside_buffer += 1;
            continue;
        }
        keep(
            Zone::from_type(
                format!("landuse_{}", zone.id),
                zone.zone_type.clone(),
                String::new(),
                zone.center,
                zone.vertices.clone(),
                rates,
            ),
            &mut stats,
            &mut population,
            &mut amenity,
        );
    }

    for poi in &pois {
        if !within_corridor(&[poi.location], routes, depots, buffer_m) {
            stats.discarded_outside_buffer += 1;
            continue;
        }
        keep(
            Zone::from_type(
                format!("poi_{}", poi.id),
                poi.poi_type.clone(),
                poi.name.clone(),
                poi.location,
                Vec::new(),
                rates,
            ),
            &mut stats,
            &mut population,
            &mut amenity,
        );
    }

    for place in &places {
        if !within_corridor(&[place.location], routes, depots, buffer_m) {
            stats.discarded_outside_buffer += 1;
            continue;
        }
        keep(
            Zone::from_type(
                format!("place_{}", place.id),
                place.place_type.clone(),
                place.name.clone(),
                place.location,
                Vec::new(),
                rates,
            ),
            &mut stats,
            &mut population,
            &mut amenity,
        );
    }

    debug!(
        "zone cache: {} landuse / {} pois / {} places fetched, {} discarded outside buffer",
        stats.landuse_fetched, stats.pois_fetched, stats.places_fetched,
        stats.discarded_outside_buffer
    );
    info!(
        "zone cache ready: {} population zones, {} amenity zones ({} regions known)",
        stats.population_retained, stats.amenity_retained, stats.regions_fetched
    );

    Ok(ZoneCache {
        population,
        amenity,
        stats,
    })
}

/// Loaded routes, indexed for lookup by name and nearest-polyline queries.
#[derive(Debug, Default, Resource)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn get(&self, short_name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.short_name == short_name)
    }

    pub fn contains(&self, short_name: &str) -> bool {
        self.get(short_name).is_some()
    }

    /// The route whose polyline has the minimum vertex distance to `point`.
    pub fn nearest_route(&self, point: GeoPoint) -> Option<&Route> {
        self.routes
            .iter()
            .map(|route| (point_to_polyline_m(point, &route.geometry), route))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, route)| route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::polyline_length_m;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).expect("valid test point")
    }

    fn route(short_name: &str, vertices: Vec<GeoPoint>) -> Route {
        let length_m = polyline_length_m(&vertices);
        Route {
            short_name: short_name.to_string(),
            long_name: String::new(),
            geometry: vertices,
            length_m,
        }
    }

    fn test_zone(zone_type: &str, center: GeoPoint) -> Zone {
        Zone::from_type(
            format!("test_{zone_type}"),
            zone_type.to_string(),
            String::new(),
            center,
            Vec::new(),
            &ZoneRateTable::default(),
        )
    }

    #[test]
    fn zone_kind_follows_type_table() {
        let residential = test_zone("residential", point(13.1, -59.6));
        let school = test_zone("school", point(13.1, -59.6));
        assert_eq!(residential.kind, ZoneKind::Population);
        assert_eq!(school.kind, ZoneKind::Amenity);
    }

    #[test]
    fn peak_hours_round_trip_through_mask() {
        let school = test_zone("school", point(13.1, -59.6));
        assert!(school.is_peak_hour(7));
        assert!(school.is_peak_hour(16));
        assert!(!school.is_peak_hour(12));
        assert!(!school.is_peak_hour(24));
    }

    #[test]
    fn corridor_test_accepts_near_and_rejects_far() {
        let routes = vec![route("1A", vec![point(13.10, -59.61), point(13.15, -59.62)])];
        let depots = vec![Depot {
            depot_id: "DEP-1".to_string(),
            name: "Main".to_string(),
            location: point(13.00, -59.50),
            capacity: 40,
        }];

        // ~1 km from the route.
        assert!(within_corridor(
            &[point(13.11, -59.61)],
            &routes,
            &depots,
            5_000.0
        ));
        // Near the depot but far from the route.
        assert!(within_corridor(
            &[point(13.01, -59.50)],
            &routes,
            &depots,
            5_000.0
        ));
        // ~50 km away from everything.
        assert!(!within_corridor(
            &[point(13.5, -59.1)],
            &routes,
            &depots,
            5_000.0
        ));
    }

    #[test]
    fn nearest_amenity_name_respects_radius() {
        let mut clinic = test_zone("clinic", point(13.1000, -59.6100));
        clinic.name = "Westside Clinic".to_string();
        let cache = ZoneCache::from_zones(Vec::new(), vec![clinic]);

        let near = cache.nearest_amenity_name(point(13.1001, -59.6100), 100.0);
        assert_eq!(near.as_deref(), Some("Westside Clinic"));
        let far = cache.nearest_amenity_name(point(13.2, -59.6), 100.0);
        assert!(far.is_none());
    }

    #[test]
    fn cache_build_partitions_and_filters_fixture_zones() {
        use crate::test_helpers::FixtureDataSource;

        let fixture = FixtureDataSource::default();
        let routes = fixture.routes.clone();
        let depots = fixture.depots.clone();
        let cache = build_zone_cache(
            &fixture,
            1,
            &routes,
            &depots,
            5.0,
            &ZoneRateTable::default(),
        )
        .expect("fixture cache builds");

        let stats = cache.statistics();
        assert_eq!(stats.landuse_fetched, 1);
        assert_eq!(stats.pois_fetched, 3);
        // The residential polygon is the only population zone; every POI is
        // an amenity, and all fixture features sit inside the corridor.
        assert_eq!(cache.population_zones().len(), 1);
        assert_eq!(cache.amenity_zones().len(), 3);
        assert_eq!(stats.discarded_outside_buffer, 0);
        assert_eq!(cache.population_zones()[0].zone_type, "residential");
    }

    #[test]
    fn cache_build_discards_far_features() {
        use crate::data_source::Poi;
        use crate::test_helpers::FixtureDataSource;

        let mut fixture = FixtureDataSource::default();
        fixture.pois.push(Poi {
            id: 99,
            name: "Offshore Rig".to_string(),
            poi_type: "tourist".to_string(),
            location: point(12.5, -58.9),
        });
        let routes = fixture.routes.clone();
        let depots = fixture.depots.clone();
        let cache = build_zone_cache(
            &fixture,
            1,
            &routes,
            &depots,
            5.0,
            &ZoneRateTable::default(),
        )
        .expect("fixture cache builds");

        assert_eq!(cache.statistics().discarded_outside_buffer, 1);
        assert!(cache
            .amenity_zones()
            .iter()
            .all(|zone| zone.name != "Offshore Rig"));
    }

    #[test]
    fn route_table_nearest_route() {
        let table = RouteTable::new(vec![
            route("1A", vec![point(13.10, -59.61), point(13.15, -59.62)]),
            route("2B", vec![point(13.30, -59.64), point(13.35, -59.65)]),
        ]);
        let near_1a = table.nearest_route(point(13.11, -59.61)).unwrap();
        assert_eq!(near_1a.short_name, "1A");
        let near_2b = table.nearest_route(point(13.31, -59.64)).unwrap();
        assert_eq!(near_2b.short_name, "2B");
        assert!(table.contains("1A"));
        assert!(!table.contains("9Z"));
    }
}
