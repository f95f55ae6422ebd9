//! Poisson demand spawner: turns zones + wall clock into spawn requests.
//!
//! The spawner is stateless: every call is a fresh Poisson draw over the
//! zone set, seeded by the caller. Identical inputs (seed, zones, routes,
//! time, window) produce an identical request list, which is what makes
//! demand replayable.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::hour_of_day_utc;
use crate::commuter::{Direction, TripPurpose};
use crate::geo::{point_to_polyline_m, GeoPoint};
use crate::patterns;
use crate::zones::{Zone, ZoneCache, RouteTable};
use crate::data_source::Route;

/// Spawn-point jitter around the zone center, in degrees (~100 m).
const SPAWN_JITTER_DEG: f64 = 0.001;

/// A zone counts as "on" a route when within this distance of its polyline.
const ZONE_NEAR_ROUTE_KM: f64 = 2.0;

/// Guard against pathological rates: Knuth's method underflows `exp(-λ)`
/// past roughly 700.
const MAX_LAMBDA: f64 = 500.0;

/// A planned-but-not-yet-realized commuter.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub spawn_point: GeoPoint,
    pub destination: GeoPoint,
    /// Short name of the nearest route; the only zone-to-route linkage.
    pub route: String,
    pub direction: Direction,
    /// Priority in [0, 1].
    pub priority: f64,
    pub purpose: TripPurpose,
    pub max_wait_ms: u64,
    /// Real-world ms at which the batch was generated.
    pub generation_time_ms: i64,
}

/// Stateless Poisson spawner. Holds no draw state; reproducibility comes
/// entirely from the injected seed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonSpawner;

impl PoissonSpawner {
    pub fn new() -> Self {
        Self
    }

    /// Generate one batch of spawn requests for the given wall-clock time.
    pub fn generate(
        &self,
        zones: &ZoneCache,
        routes: &RouteTable,
        now_real_ms: i64,
        window_minutes: u32,
        seed: u64,
    ) -> Vec<SpawnRequest> {
        if routes.is_empty() {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(now_real_ms as u64));
        let hour = hour_of_day_utc(now_real_ms);
        let mut requests = Vec::new();

        for zone in zones
            .population_zones()
            .iter()
            .chain(zones.amenity_zones().iter())
        {
            let lambda = effective_lambda(zone, hour, window_minutes);
            let count = sample_poisson(&mut rng, lambda);
            for _ in 0..count {
                if let Some(request) =
                    self.realize(zone, zones, routes, hour, now_real_ms, &mut rng)
                {
                    requests.push(request);
                }
            }
        }
        requests
    }

    /// Turn one Poisson arrival into a concrete request.
    fn realize(
        &self,
        zone: &Zone,
        zones: &ZoneCache,
        routes: &RouteTable,
        hour: u8,
        now_real_ms: i64,
        rng: &mut StdRng,
    ) -> Option<SpawnRequest> {
        let spawn_point = jitter(zone.center, rng)?;
        let route = routes.nearest_route(spawn_point)?;
        let purpose = patterns::trip_purpose_for(&zone.zone_type, hour);
        let destination = pick_destination(zones, route, purpose, hour, rng)?;

        Some(SpawnRequest {
            spawn_point,
            destination,
            route: route.short_name.clone(),
            direction: direction_for(purpose),
            priority: patterns::priority_for(purpose, hour),
            purpose,
            max_wait_ms: purpose.max_wait_ms(),
            generation_time_ms: now_real_ms,
        })
    }
}

/// λ for a zone at an hour, scaled to the spawn window.
fn effective_lambda(zone: &Zone, hour: u8, window_minutes: u32) -> f64 {
    let peak = if zone.is_peak_hour(hour) {
        patterns::PEAK_HOUR_MULTIPLIER
    } else {
        1.0
    };
    let modifier = patterns::hour_modifier(&zone.zone_type, hour);
    let hourly = zone.base_rate_per_hour * peak * modifier;
    (hourly * f64::from(window_minutes) / 60.0).clamp(0.0, MAX_LAMBDA)
}

/// Knuth's Poisson sampler over the injected RNG.
fn sample_poisson<R: Rng>(rng: &mut R, lambda: f64) -> u32 {
    if lambda <= 0.0 {
        return 0;
    }
    let threshold = (-lambda).exp();
    let mut k = 0u32;
    let mut product = 1.0f64;
    loop {
        product *= rng.gen::<f64>();
        if product <= threshold {
            return k;
        }
        k += 1;
    }
}

/// Uniform jitter of up to ±[SPAWN_JITTER_DEG] on each axis.
fn jitter(center: GeoPoint, rng: &mut StdRng) -> Option<GeoPoint> {
    let lat = center.lat() + rng.gen_range(-SPAWN_JITTER_DEG..=SPAWN_JITTER_DEG);
    let lon = center.lon() + rng.gen_range(-SPAWN_JITTER_DEG..=SPAWN_JITTER_DEG);
    GeoPoint::new(lat, lon).ok()
}

/// Inbound/outbound are opaque labels; the purpose heuristic is the only
/// thing that assigns them.
fn direction_for(purpose: TripPurpose) -> Direction {
    match purpose {
        TripPurpose::Work
        | TripPurpose::Education
        | TripPurpose::Medical
        | TripPurpose::Shopping => Direction::Inbound,
        _ => Direction::Outbound,
    }
}

const WORK_DESTINATION_TYPES: [&str; 4] = ["commercial", "office", "shopping", "mall"];
const EDUCATION_DESTINATION_TYPES: [&str; 2] = ["school", "university"];
const HOME_DESTINATION_TYPES: [&str; 4] = ["residential", "suburban", "village", "town"];

/// Destination heuristic: purposeful trips aim at a matching zone near the
/// assigned route; late-night trips head home; everything else lands on a
/// random route vertex.
fn pick_destination(
    zones: &ZoneCache,
    route: &Route,
    purpose: TripPurpose,
    hour: u8,
    rng: &mut StdRng,
) -> Option<GeoPoint> {
    let near_route =
        |zone: &&Zone| point_to_polyline_m(zone.center, &route.geometry) <= ZONE_NEAR_ROUTE_KM * 1000.0;

    let targeted = match purpose {
        TripPurpose::Work => zones
            .amenity_zones()
            .iter()
            .filter(|z| WORK_DESTINATION_TYPES.contains(&z.zone_type.as_str()))
            .find(near_route),
        TripPurpose::Education => zones
            .amenity_zones()
            .iter()
            .filter(|z| EDUCATION_DESTINATION_TYPES.contains(&z.zone_type.as_str()))
            .find(near_route),
        _ if hour >= 22 || hour <= 5 => zones
            .population_zones()
            .iter()
            .filter(|z| HOME_DESTINATION_TYPES.contains(&z.zone_type.as_str()))
            .find(near_route),
        _ => None,
    };

    match targeted {
        Some(zone) => Some(zone.center),
        None => {
            let index = rng.gen_range(0..route.geometry.len());
            Some(route.geometry[index])
        }
    }
}
