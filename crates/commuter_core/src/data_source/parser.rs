//! Conversion from wire records to validated domain types.
//!
//! All coordinate normalization happens here: anything that survives this
//! module carries proper [GeoPoint]s, and records with unusable coordinates
//! are skipped (the caller counts and logs them).

use serde_json::Value;

use super::response::{
    DepotRecord, LanduseZoneRecord, PlaceRecord, PoiRecord, ShapePointRecord,
};
use super::{Depot, LanduseZone, Place, Poi};
use crate::geo::GeoPoint;

pub fn depot_from_record(record: &DepotRecord) -> Option<Depot> {
    let (lat, lon) = match (&record.location, record.latitude, record.longitude) {
        (Some(loc), _, _) => (loc.lat, loc.lon),
        (None, Some(lat), Some(lon)) => (lat, lon),
        _ => return None,
    };
    let location = GeoPoint::new(lat, lon).ok()?;
    Some(Depot {
        depot_id: record.depot_id.clone(),
        name: record
            .name
            .clone()
            .unwrap_or_else(|| record.depot_id.clone()),
        location,
        capacity: record.capacity.unwrap_or(50),
    })
}

/// Ordered polyline from shape points. Points are re-sorted by sequence when
/// the field is present so callers do not depend on server-side sorting.
pub fn polyline_from_shape_points(mut points: Vec<ShapePointRecord>) -> Vec<GeoPoint> {
    points.sort_by_key(|p| p.shape_pt_sequence.unwrap_or(i64::MAX));
    points
        .iter()
        .filter_map(|p| GeoPoint::new(p.shape_pt_lat, p.shape_pt_lon).ok())
        .collect()
}

pub fn zone_from_record(record: &LanduseZoneRecord) -> Option<LanduseZone> {
    let zone_type = record
        .landuse_type
        .clone()
        .or_else(|| record.zone_type.clone())?
        .to_lowercase();
    let geometry = record.geometry.as_ref()?;
    let vertices = geometry_vertices(geometry);
    let center = centroid(&vertices)?;
    Some(LanduseZone {
        id: record.id,
        zone_type,
        center,
        vertices,
    })
}

pub fn poi_from_record(record: &PoiRecord) -> Option<Poi> {
    let location = GeoPoint::new(record.latitude?, record.longitude?).ok()?;
    Some(Poi {
        id: record.id,
        name: record.name.clone().unwrap_or_default(),
        poi_type: record
            .poi_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
            .to_lowercase(),
        location,
    })
}

pub fn place_from_record(record: &PlaceRecord) -> Option<Place> {
    let location = match (record.latitude, record.longitude) {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).ok()?,
        _ => {
            let vertices = geometry_vertices(record.geometry.as_ref()?);
            centroid(&vertices)?
        }
    };
    Some(Place {
        id: record.id,
        name: record.name.clone().unwrap_or_default(),
        place_type: record
            .place_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
            .to_lowercase(),
        location,
    })
}

/// Extract every `[lon, lat]` coordinate pair from a GeoJSON-style geometry.
///
/// Walks the `coordinates` tree so Point, LineString, Polygon and
/// MultiPolygon all work without separate cases. Invalid pairs are skipped.
pub fn geometry_vertices(geometry: &Value) -> Vec<GeoPoint> {
    let mut vertices = Vec::new();
    if let Some(coordinates) = geometry.get("coordinates") {
        collect_pairs(coordinates, &mut vertices);
    }
    vertices
}

fn collect_pairs(value: &Value, out: &mut Vec<GeoPoint>) {
    let Some(items) = value.as_array() else {
        return;
    };
    if items.len() == 2 {
        if let (Some(lon), Some(lat)) = (items[0].as_f64(), items[1].as_f64()) {
            if let Ok(point) = GeoPoint::new(lat, lon) {
                out.push(point);
            }
            return;
        }
    }
    for item in items {
        collect_pairs(item, out);
    }
}

/// Arithmetic centroid of a vertex set; `None` for an empty set.
pub fn centroid(vertices: &[GeoPoint]) -> Option<GeoPoint> {
    if vertices.is_empty() {
        return None;
    }
    let n = vertices.len() as f64;
    let lat = vertices.iter().map(GeoPoint::lat).sum::<f64>() / n;
    let lon = vertices.iter().map(GeoPoint::lon).sum::<f64>() / n;
    GeoPoint::new(lat, lon).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn depot_prefers_location_object() {
        let record: DepotRecord = serde_json::from_value(json!({
            "id": 1, "depot_id": "DEP-1",
            "location": {"lat": 13.09, "lon": -59.61},
            "latitude": 0.0, "longitude": 0.0
        }))
        .unwrap();
        let depot = depot_from_record(&record).expect("valid depot");
        assert_eq!(depot.location.lat(), 13.09);
        assert_eq!(depot.capacity, 50);
    }

    #[test]
    fn depot_without_coordinates_is_skipped() {
        let record: DepotRecord =
            serde_json::from_value(json!({"id": 2, "depot_id": "DEP-2"})).unwrap();
        assert!(depot_from_record(&record).is_none());
    }

    #[test]
    fn shape_points_are_sorted_by_sequence() {
        let points = vec![
            ShapePointRecord {
                shape_pt_lat: 13.2,
                shape_pt_lon: -59.6,
                shape_pt_sequence: Some(2),
            },
            ShapePointRecord {
                shape_pt_lat: 13.1,
                shape_pt_lon: -59.6,
                shape_pt_sequence: Some(1),
            },
        ];
        let polyline = polyline_from_shape_points(points);
        assert_eq!(polyline[0].lat(), 13.1);
        assert_eq!(polyline[1].lat(), 13.2);
    }

    #[test]
    fn polygon_vertices_and_centroid() {
        let geometry = json!({
            "type": "Polygon",
            "coordinates": [[[-59.62, 13.10], [-59.60, 13.10], [-59.60, 13.12], [-59.62, 13.12]]]
        });
        let vertices = geometry_vertices(&geometry);
        assert_eq!(vertices.len(), 4);
        let center = centroid(&vertices).expect("centroid");
        assert!((center.lat() - 13.11).abs() < 1e-9);
        assert!((center.lon() - (-59.61)).abs() < 1e-9);
    }

    #[test]
    fn point_geometry_yields_one_vertex() {
        let geometry = json!({"type": "Point", "coordinates": [-59.61, 13.10]});
        let vertices = geometry_vertices(&geometry);
        assert_eq!(vertices.len(), 1);
        assert_eq!(vertices[0].lat(), 13.10);
    }

    #[test]
    fn zone_type_falls_back_across_field_names() {
        let record: LanduseZoneRecord = serde_json::from_value(json!({
            "id": 9,
            "zone_type": "Residential",
            "geometry": {"type": "Point", "coordinates": [-59.61, 13.10]}
        }))
        .unwrap();
        let zone = zone_from_record(&record).expect("valid zone");
        assert_eq!(zone.zone_type, "residential");
    }
}
