//! Blocking HTTP client for the fleet data API.
//!
//! All list endpoints are fetched through one paginated loop so nothing ever
//! truncates at the server's default page size. Each page request retries a
//! fixed number of times with a fixed delay; exhaustion surfaces as
//! [DataSourceError::Unavailable]. Fully fetched lists are cached with a TTL
//! so repeated lookups inside one startup pass stay cheap.

use std::sync::Mutex;
use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::cache::ResponseCache;
use super::error::DataSourceError;
use super::parser::{
    depot_from_record, place_from_record, poi_from_record, polyline_from_shape_points,
    zone_from_record,
};
use super::response::{
    CountryRecord, DepotRecord, LanduseZoneRecord, Paged, PlaceRecord, PluginConfigRecord,
    PoiRecord, RegionRecord, RouteRecord, RouteShapeRecord, ShapePointRecord,
};
use super::{
    Country, Depot, LanduseZone, Place, Poi, Region, Route, SpawningOverride, TransitDataSource,
};
use crate::config::DataSourceConfig;
use crate::geo::polyline_length_m;

const PAGE_SIZE: u32 = 200;
/// Hard stop for runaway pagination loops.
const MAX_PAGES: u32 = 1000;

pub struct HttpDataSource {
    client: Client,
    base_url: String,
    retry_attempts: u32,
    retry_delay: Duration,
    cache: Mutex<ResponseCache>,
}

impl HttpDataSource {
    pub fn new(config: &DataSourceConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("failed to build data-source client");
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
            cache: Mutex::new(ResponseCache::new(Duration::from_secs(
                config.cache_ttl_seconds,
            ))),
        }
    }

    fn fetch_page(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Paged<Value>, DataSourceError> {
        let url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| DataSourceError::Api(format!("failed to build url: {err}")))?;
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .map_err(DataSourceError::Http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataSourceError::Api(format!(
                "{path} returned HTTP {status}"
            )));
        }
        response.json().map_err(DataSourceError::Json)
    }

    fn fetch_page_with_retry(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Paged<Value>, DataSourceError> {
        for attempt in 1..=self.retry_attempts {
            match self.fetch_page(path, params) {
                Ok(page) => return Ok(page),
                Err(err) => {
                    warn!(
                        "data source request {path} failed (attempt {attempt}/{}): {err}",
                        self.retry_attempts
                    );
                    if attempt < self.retry_attempts {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        Err(DataSourceError::Unavailable {
            attempts: self.retry_attempts,
        })
    }

    /// Fetch every page of a list endpoint, serving from the TTL cache when
    /// the same filters were fetched recently.
    fn fetch_all(
        &self,
        path: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<Value>, DataSourceError> {
        let cache_key = cache_key(path, filters);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(items) = cache.get(&cache_key) {
                return Ok(items);
            }
        }

        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let mut params: Vec<(&str, String)> = filters.to_vec();
            params.push(("pagination[page]", page.to_string()));
            params.push(("pagination[pageSize]", PAGE_SIZE.to_string()));

            let paged = self.fetch_page_with_retry(path, &params)?;
            let got = paged.data.len();
            items.extend(paged.data);

            let page_count = paged
                .meta
                .and_then(|m| m.pagination)
                .map(|p| p.page_count)
                .unwrap_or(1);
            if got == 0 || page >= page_count || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(cache_key, items.clone());
        }
        Ok(items)
    }

    /// Route polyline via the GTFS chain: default route-shape, then the
    /// shape's points ordered by sequence.
    fn load_route_geometry(&self, short_name: &str) -> Result<Vec<crate::geo::GeoPoint>, DataSourceError> {
        let links = self.fetch_all(
            "/api/route-shapes",
            &[
                ("filters[route_id][$eq]", short_name.to_string()),
                ("filters[is_default][$eq]", "true".to_string()),
            ],
        )?;
        let Some(shape_id) = typed::<RouteShapeRecord>(&links)
            .into_iter()
            .next()
            .map(|link| link.shape_id)
        else {
            debug!("no default shape for route {short_name}");
            return Ok(Vec::new());
        };

        let mut filters = vec![("filters[shape_id][$eq]", shape_id)];
        filters.push(("sort", "shape_pt_sequence".to_string()));
        let raw_points = self.fetch_all("/api/shapes", &filters)?;
        Ok(polyline_from_shape_points(typed::<ShapePointRecord>(
            &raw_points,
        )))
    }

    /// Drop every cached response, forcing fresh fetches.
    pub fn invalidate_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

impl TransitDataSource for HttpDataSource {
    fn list_depots(&self) -> Result<Vec<Depot>, DataSourceError> {
        let items = self.fetch_all(
            "/api/depots",
            &[("filters[is_active][$eq]", "true".to_string())],
        )?;
        let records = typed::<DepotRecord>(&items);
        let depots: Vec<Depot> = records.iter().filter_map(depot_from_record).collect();
        if depots.len() < records.len() {
            debug!(
                "skipped {} depots without usable coordinates",
                records.len() - depots.len()
            );
        }
        Ok(depots)
    }

    fn list_routes(&self) -> Result<Vec<Route>, DataSourceError> {
        let items = self.fetch_all(
            "/api/routes",
            &[("filters[is_active][$eq]", "true".to_string())],
        )?;
        let mut routes = Vec::new();
        for record in typed::<RouteRecord>(&items) {
            let geometry = self.load_route_geometry(&record.short_name)?;
            if geometry.len() < 2 {
                warn!(
                    "route {} has {} shape points; not routable, skipping",
                    record.short_name,
                    geometry.len()
                );
                continue;
            }
            let length_m = polyline_length_m(&geometry);
            routes.push(Route {
                short_name: record.short_name,
                long_name: record.long_name.unwrap_or_default(),
                geometry,
                length_m,
            });
        }
        Ok(routes)
    }

    fn list_landuse_zones(&self, country_id: i64) -> Result<Vec<LanduseZone>, DataSourceError> {
        let items = self.fetch_all(
            "/api/landuse-zones",
            &[("filters[country][id][$eq]", country_id.to_string())],
        )?;
        Ok(typed::<LanduseZoneRecord>(&items)
            .iter()
            .filter_map(zone_from_record)
            .collect())
    }

    fn list_pois(&self, country_id: i64) -> Result<Vec<Poi>, DataSourceError> {
        let items = self.fetch_all(
            "/api/pois",
            &[("filters[country][id][$eq]", country_id.to_string())],
        )?;
        Ok(typed::<PoiRecord>(&items)
            .iter()
            .filter_map(poi_from_record)
            .collect())
    }

    fn list_places(&self, country_id: i64) -> Result<Vec<Place>, DataSourceError> {
        let items = self.fetch_all(
            "/api/places",
            &[("filters[country][id][$eq]", country_id.to_string())],
        )?;
        Ok(typed::<PlaceRecord>(&items)
            .iter()
            .filter_map(place_from_record)
            .collect())
    }

    fn list_regions(&self, country_id: i64) -> Result<Vec<Region>, DataSourceError> {
        let items = self.fetch_all(
            "/api/regions",
            &[("filters[country][id][$eq]", country_id.to_string())],
        )?;
        Ok(typed::<RegionRecord>(&items)
            .into_iter()
            .map(|record| Region {
                id: record.id,
                name: record.name.unwrap_or_default(),
                region_type: record.region_type.unwrap_or_else(|| "unknown".to_string()),
            })
            .collect())
    }

    fn get_country_by_code(&self, code: &str) -> Result<Option<Country>, DataSourceError> {
        let items = self.fetch_all(
            "/api/countries",
            &[("filters[code][$eq]", code.to_uppercase())],
        )?;
        Ok(typed::<CountryRecord>(&items).into_iter().next().map(
            |record| Country {
                id: record.id,
                name: record.name,
                code: record.code.unwrap_or_else(|| code.to_uppercase()),
            },
        ))
    }

    fn get_spawning_config(
        &self,
        country_code: &str,
    ) -> Result<Option<SpawningOverride>, DataSourceError> {
        // Deliberately uncached: this is the runtime-adjustable knob.
        let paged = self.fetch_page_with_retry(
            "/api/passenger-plugin-configs",
            &[
                ("filters[country_code][$eq]", country_code.to_uppercase()),
                ("filters[is_active][$eq]", "true".to_string()),
            ],
        )?;
        Ok(typed::<PluginConfigRecord>(&paged.data)
            .into_iter()
            .next()
            .map(|record| SpawningOverride {
                spawn_interval_seconds: record.spawn_interval_seconds,
                window_minutes: record.window_minutes,
            }))
    }
}

fn cache_key(path: &str, filters: &[(&str, String)]) -> String {
    let mut key = path.to_string();
    for (name, value) in filters {
        key.push_str(&format!("&{name}={value}"));
    }
    key
}

/// Deserialize raw items into records, skipping anything malformed.
fn typed<T: DeserializeOwned>(items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!("skipping malformed record: {err}");
                None
            }
        })
        .collect()
}
