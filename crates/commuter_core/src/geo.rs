//! Geographic primitives: points, Haversine distances, and grid-cell indexing.
//!
//! This module provides:
//!
//! - **GeoPoint**: the single validated latitude/longitude value type
//! - **Distances**: Haversine distance and initial bearing between points
//! - **Grid cells**: integer `(lat, lon)` cells for the route reservoir's
//!   spatial index, plus nearby-cell enumeration in center-out order
//!
//! Everything here is pure and deterministic: identical inputs produce
//! bit-identical outputs across runs.

use std::fmt;

/// Earth radius in meters, shared by every distance calculation.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default grid cell size in degrees (~1 km at the equator).
pub const DEFAULT_CELL_SIZE_DEG: f64 = 0.01;

/// Approximate kilometers per degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.0;

/// A latitude/longitude pair in decimal degrees.
///
/// Construction goes through [GeoPoint::new], which is the one place where
/// coordinates are range-checked. Internal code never handles raw pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

/// Error for out-of-range or non-finite coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidLocation;

impl fmt::Display for InvalidLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "latitude/longitude out of range")
    }
}

impl GeoPoint {
    /// Validate and construct a point. Latitude must be in [-90, 90] and
    /// longitude in [-180, 180]; NaN and infinities are rejected.
    pub fn new(lat: f64, lon: f64) -> Result<Self, InvalidLocation> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(InvalidLocation);
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(InvalidLocation);
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// Haversine distance between two points in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` to `b` in degrees, normalized to [0, 360).
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlon = lon2 - lon1;
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let bearing = y.atan2(x).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Minimum Haversine distance (meters) from a point to any vertex of a
/// polyline. Returns `f64::INFINITY` for an empty polyline.
pub fn point_to_polyline_m(point: GeoPoint, polyline: &[GeoPoint]) -> f64 {
    polyline
        .iter()
        .map(|vertex| haversine_m(point, *vertex))
        .fold(f64::INFINITY, f64::min)
}

/// Total length of a polyline in meters (sum of vertex-to-vertex Haversine
/// distances). Zero for fewer than two vertices.
pub fn polyline_length_m(polyline: &[GeoPoint]) -> f64 {
    polyline
        .windows(2)
        .map(|pair| haversine_m(pair[0], pair[1]))
        .sum()
}

/// An integer grid cell: `(⌊lat / cell_size⌋, ⌊lon / cell_size⌋)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell(pub i32, pub i32);

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

/// Grid cell for a point at the given cell size (degrees).
///
/// Uses `floor`, not truncation toward zero, so moving exactly one cell size
/// along an axis always shifts the cell index by exactly one, including
/// across the equator and prime meridian.
pub fn grid_cell(point: GeoPoint, cell_size: f64) -> GridCell {
    GridCell(
        (point.lat() / cell_size).floor() as i32,
        (point.lon() / cell_size).floor() as i32,
    )
}

/// All grid cells within `radius_km` of `point`, as a square
/// over-approximation of the disk. Cells are returned center-out (ring by
/// ring), so a bounded scan visits the closest cells first.
///
/// Overshoot is fine; undershoot is not: every cell whose center lies within
/// `radius_km / 111` degrees of the point is included. Behavior near the
/// poles and the antimeridian is approximate but never panics.
pub fn nearby_cells(point: GeoPoint, radius_km: f64, cell_size: f64) -> Vec<GridCell> {
    let radius_deg = radius_km / KM_PER_DEGREE;
    let center = grid_cell(point, cell_size);
    let cell_radius = (radius_deg / cell_size) as i32 + 1;

    let mut cells = Vec::with_capacity(((2 * cell_radius + 1) * (2 * cell_radius + 1)) as usize);
    cells.push(center);
    for ring in 1..=cell_radius {
        // Top and bottom edges of the ring, then the remaining side cells.
        for dx in -ring..=ring {
            cells.push(GridCell(center.0 + dx, center.1 - ring));
            cells.push(GridCell(center.0 + dx, center.1 + ring));
        }
        for dy in (-ring + 1)..ring {
            cells.push(GridCell(center.0 - ring, center.1 + dy));
            cells.push(GridCell(center.0 + ring, center.1 + dy));
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).expect("valid test point")
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(90.1, 0.0).is_err());
        assert!(GeoPoint::new(-90.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, 180.1).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(13.1, -59.6).is_ok());
    }

    #[test]
    fn haversine_known_distance() {
        // Bridgetown to Speightstown is roughly 19-20 km.
        let bridgetown = point(13.0969, -59.6145);
        let speightstown = point(13.2508, -59.6436);
        let d = haversine_m(bridgetown, speightstown);
        assert!(d > 15_000.0 && d < 25_000.0, "got {d}");
    }

    #[test]
    fn haversine_is_symmetric_within_a_meter() {
        let samples = [
            (point(13.0969, -59.6145), point(13.1139, -59.6128)),
            (point(0.0, 0.0), point(-45.0, 120.0)),
            (point(51.5, -0.1), point(48.85, 2.35)),
        ];
        for (a, b) in samples {
            assert!((haversine_m(a, b) - haversine_m(b, a)).abs() < 1.0);
        }
    }

    #[test]
    fn haversine_zero_for_identical_points() {
        let p = point(13.1, -59.6);
        assert_eq!(haversine_m(p, p), 0.0);
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = point(0.0, 0.0);
        assert!((bearing_deg(origin, point(1.0, 0.0)) - 0.0).abs() < 0.01);
        assert!((bearing_deg(origin, point(0.0, 1.0)) - 90.0).abs() < 0.01);
        assert!((bearing_deg(origin, point(-1.0, 0.0)) - 180.0).abs() < 0.01);
        assert!((bearing_deg(origin, point(0.0, -1.0)) - 270.0).abs() < 0.01);
    }

    #[test]
    fn grid_cell_is_stable_and_floors() {
        let p = point(13.1234, -59.6789);
        assert_eq!(grid_cell(p, 0.01), grid_cell(p, 0.01));
        assert_eq!(grid_cell(p, 0.01), GridCell(1312, -5968));
        // Floor semantics: small negative values land in cell -1, not 0.
        assert_eq!(grid_cell(point(-0.001, -0.001), 0.01), GridCell(-1, -1));
    }

    #[test]
    fn grid_cell_moves_by_one_per_cell_size() {
        let s = 0.01;
        for (lat, lon) in [(13.105, -59.605), (-0.005, 0.005), (45.005, -0.005)] {
            let base = grid_cell(point(lat, lon), s);
            let up = grid_cell(point(lat + s, lon), s);
            let right = grid_cell(point(lat, lon + s), s);
            assert_eq!(up.0 - base.0, 1);
            assert_eq!(up.1, base.1);
            assert_eq!(right.1 - base.1, 1);
            assert_eq!(right.0, base.0);
        }
    }

    #[test]
    fn nearby_cells_cover_the_radius() {
        let p = point(13.10, -59.61);
        let cells = nearby_cells(p, 2.0, 0.01);
        let center = grid_cell(p, 0.01);
        assert_eq!(cells[0], center);

        // Every cell whose center is within radius_km/111 degrees must appear.
        let radius_deg = 2.0 / KM_PER_DEGREE;
        let span = (radius_deg / 0.01) as i32;
        for dx in -span..=span {
            for dy in -span..=span {
                let candidate = GridCell(center.0 + dx, center.1 + dy);
                assert!(cells.contains(&candidate), "missing {candidate}");
            }
        }
    }

    #[test]
    fn nearby_cells_are_unique_and_ring_ordered() {
        let p = point(13.10, -59.61);
        let cells = nearby_cells(p, 1.0, 0.01);
        let center = grid_cell(p, 0.01);

        let mut seen = std::collections::HashSet::new();
        let mut last_ring = 0;
        for cell in &cells {
            assert!(seen.insert(*cell), "duplicate cell {cell}");
            let ring = (cell.0 - center.0).abs().max((cell.1 - center.1).abs());
            assert!(ring >= last_ring, "ring order violated at {cell}");
            last_ring = ring;
        }
    }

    #[test]
    fn nearby_cells_do_not_panic_at_extremes() {
        nearby_cells(point(89.99, 179.99), 5.0, 0.01);
        nearby_cells(point(-89.99, -179.99), 5.0, 0.01);
    }

    #[test]
    fn polyline_length_sums_segments() {
        let line = vec![point(13.0, -59.6), point(13.1, -59.6), point(13.2, -59.6)];
        let total = polyline_length_m(&line);
        let direct = haversine_m(line[0], line[2]);
        assert!((total - direct).abs() < 1.0, "collinear length should match");
        assert_eq!(polyline_length_m(&line[..1]), 0.0);
    }

    #[test]
    fn point_to_polyline_minimum_vertex_distance() {
        let line = vec![point(13.0, -59.6), point(13.1, -59.6), point(13.2, -59.6)];
        let near_middle = point(13.1001, -59.6);
        let d = point_to_polyline_m(near_middle, &line);
        assert!(d < 20.0, "got {d}");
        assert_eq!(point_to_polyline_m(near_middle, &[]), f64::INFINITY);
    }
}
