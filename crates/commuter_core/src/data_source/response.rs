//! Wire-format records for the fleet data API (Strapi-style payloads).
//!
//! Every list endpoint wraps items in `{ "data": [...], "meta": {...} }`
//! with camelCase pagination metadata. Records deserialize leniently:
//! optional fields stay optional here and are validated during conversion
//! to domain types in [super::parser].

use serde::Deserialize;

/// Envelope for paginated list responses.
#[derive(Debug, Clone, Deserialize)]
pub struct Paged<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub page: u32,
    #[serde(rename = "pageSize", default)]
    pub page_size: u32,
    #[serde(rename = "pageCount", default)]
    pub page_count: u32,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationRecord {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepotRecord {
    pub id: i64,
    pub depot_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<LocationRecord>,
    /// Some deployments serve flat coordinates instead of a location object.
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteRecord {
    pub id: i64,
    pub short_name: String,
    #[serde(default)]
    pub long_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteShapeRecord {
    pub shape_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShapePointRecord {
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    #[serde(default)]
    pub shape_pt_sequence: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanduseZoneRecord {
    pub id: i64,
    #[serde(default)]
    pub landuse_type: Option<String>,
    #[serde(default)]
    pub zone_type: Option<String>,
    #[serde(default)]
    pub geometry: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoiRecord {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub poi_type: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceRecord {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub place_type: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub geometry: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionRecord {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountryRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfigRecord {
    #[serde(default)]
    pub spawn_interval_seconds: Option<u64>,
    #[serde(default)]
    pub window_minutes: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paged_envelope_deserializes() {
        let raw = r#"{
            "data": [{"id": 1, "depot_id": "DEP-1", "name": "Main",
                      "location": {"lat": 13.09, "lon": -59.61}, "capacity": 40}],
            "meta": {"pagination": {"page": 1, "pageSize": 100, "pageCount": 2, "total": 130}}
        }"#;
        let paged: Paged<DepotRecord> = serde_json::from_str(raw).expect("valid payload");
        assert_eq!(paged.data.len(), 1);
        assert_eq!(paged.data[0].depot_id, "DEP-1");
        let pagination = paged.meta.unwrap().pagination.unwrap();
        assert_eq!(pagination.page_count, 2);
        assert_eq!(pagination.total, 130);
    }

    #[test]
    fn missing_optional_fields_are_tolerated() {
        let raw = r#"{"data": [{"id": 7, "short_name": "1A"}]}"#;
        let paged: Paged<RouteRecord> = serde_json::from_str(raw).expect("valid payload");
        assert_eq!(paged.data[0].short_name, "1A");
        assert!(paged.data[0].long_name.is_none());
        assert!(paged.meta.is_none());
    }
}
