//! Time-of-day demand patterns per zone type.
//!
//! These tables seed the Poisson spawner: a base hourly rate per zone type,
//! the hours at which each type peaks, and an hour-of-day modifier that
//! shapes demand beyond the flat peak multiplier. None of the values are
//! tied to a particular country; they can all be overridden through
//! [crate::config::ZoneRateTable].

use crate::commuter::TripPurpose;

/// Flat multiplier applied when the current hour is one of the zone's peaks.
pub const PEAK_HOUR_MULTIPLIER: f64 = 2.5;

/// Hours counted as rush hour for the priority boost.
pub const RUSH_HOURS: [u8; 4] = [7, 8, 17, 18];

/// Zone types treated as population (residential-like) zones; everything
/// else with a positive rate is an amenity zone.
pub const POPULATION_ZONE_TYPES: [&str; 8] = [
    "residential",
    "urban",
    "suburban",
    "rural",
    "village",
    "town",
    "city",
    "mixed",
];

/// Default base spawn rate per hour for a zone type. Land-use polygons and
/// point amenities share one table; unknown types get a low floor rate.
pub fn default_base_rate_per_hour(zone_type: &str) -> f64 {
    match zone_type {
        // Land-use (population) zones.
        "residential" => 2.0,
        "urban" => 3.0,
        "suburban" => 1.0,
        "rural" => 0.1,
        "village" => 0.8,
        "town" => 1.5,
        "city" => 4.0,
        "mixed" => 1.5,
        "commercial" => 0.5,
        "industrial" => 0.2,
        "retail" => 0.8,
        "office" => 1.2,
        // Point amenities.
        "school" => 3.0,
        "university" => 5.0,
        "hospital" => 2.0,
        "clinic" => 1.5,
        "shopping" => 4.0,
        "mall" => 6.0,
        "market" => 3.5,
        "restaurant" => 2.0,
        "cafe" => 1.0,
        "bank" => 1.5,
        "post_office" => 1.0,
        "government" => 2.0,
        "church" | "mosque" | "temple" => 0.8,
        "park" => 0.5,
        "beach" => 1.2,
        "tourist" => 2.5,
        "hotel" => 1.8,
        "fuel" => 0.8,
        _ => 0.3,
    }
}

/// Hours at which a zone type peaks (feeds [PEAK_HOUR_MULTIPLIER]).
pub fn default_peak_hours(zone_type: &str) -> &'static [u8] {
    match zone_type {
        "residential" | "urban" | "suburban" | "village" | "town" | "city" => {
            &[7, 8, 17, 18, 19]
        }
        "commercial" | "office" => &[9, 10, 11, 12, 13, 14, 15, 16],
        "industrial" => &[6, 7, 15, 16, 17],
        "retail" => &[10, 11, 12, 13, 17, 18, 19],
        "mixed" => &[8, 9, 12, 13, 17, 18, 19],
        "school" => &[7, 8, 15, 16],
        "university" => &[8, 9, 10, 11, 14, 15, 16],
        "hospital" | "clinic" => &[8, 9, 10, 11, 12, 13, 14, 15, 16, 17],
        "shopping" | "mall" | "market" => &[10, 11, 12, 17, 18, 19],
        "restaurant" | "cafe" => &[12, 13, 18, 19, 20],
        "bank" | "government" | "post_office" => &[9, 10, 11, 12, 14, 15, 16],
        "church" | "mosque" | "temple" => &[9, 10, 18, 19],
        "beach" | "park" => &[10, 11, 12, 13, 14, 15, 16],
        "tourist" | "hotel" => &[9, 10, 11, 12, 13, 14, 15, 16],
        _ => &[9, 12, 17],
    }
}

/// Hour-of-day modifier for a zone type, layered on top of the peak
/// multiplier. Residential demand concentrates around commutes; commercial
/// demand follows business hours; education demand spikes at bell times.
pub fn hour_modifier(zone_type: &str, hour: u8) -> f64 {
    match zone_type {
        "residential" | "urban" | "suburban" | "village" | "town" | "city" | "mixed" => {
            match hour {
                7..=9 => 3.0,
                17..=19 => 2.5,
                22..=23 | 0..=6 => 0.2,
                _ => 1.0,
            }
        }
        "commercial" | "retail" | "office" => match hour {
            9..=17 => 2.0,
            8 | 18 => 1.5,
            22..=23 | 0..=7 => 0.1,
            _ => 1.0,
        },
        "school" | "university" => match hour {
            7 | 8 | 15 | 16 => 4.0,
            9..=14 => 0.5,
            _ => 0.1,
        },
        _ => 1.0,
    }
}

/// Trip purpose implied by spawning from a given zone type at a given hour.
pub fn trip_purpose_for(zone_type: &str, hour: u8) -> TripPurpose {
    match zone_type {
        "residential" | "urban" | "suburban" | "village" | "town" | "city" | "mixed" => {
            match hour {
                7..=9 => TripPurpose::Work,
                15..=16 => TripPurpose::Education,
                17..=19 => TripPurpose::Personal,
                _ => TripPurpose::Social,
            }
        }
        "commercial" | "office" | "industrial" => TripPurpose::Work,
        "school" | "university" => TripPurpose::Education,
        "shopping" | "retail" | "mall" | "market" => TripPurpose::Shopping,
        "hospital" | "clinic" => TripPurpose::Medical,
        "beach" | "park" | "tourist" | "hotel" => TripPurpose::Recreation,
        _ => TripPurpose::General,
    }
}

/// Priority for a spawn: purpose base plus a rush-hour boost, capped at 1.
pub fn priority_for(purpose: TripPurpose, hour: u8) -> f64 {
    let mut priority = purpose.base_priority();
    if RUSH_HOURS.contains(&hour) {
        priority += 0.1;
    }
    priority.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_positive_for_known_types() {
        for zone_type in ["residential", "school", "hospital", "mall"] {
            assert!(default_base_rate_per_hour(zone_type) > 0.0);
        }
        // Unknown types get the floor rate, not zero.
        assert!(default_base_rate_per_hour("quarry") > 0.0);
    }

    #[test]
    fn residential_demand_peaks_at_commute_hours() {
        assert_eq!(hour_modifier("residential", 8), 3.0);
        assert_eq!(hour_modifier("residential", 18), 2.5);
        assert_eq!(hour_modifier("residential", 3), 0.2);
        assert_eq!(hour_modifier("residential", 11), 1.0);
    }

    #[test]
    fn commercial_zones_follow_business_hours() {
        assert_eq!(hour_modifier("commercial", 12), 2.0);
        assert_eq!(hour_modifier("commercial", 18), 1.5);
        assert_eq!(hour_modifier("commercial", 2), 0.1);
    }

    #[test]
    fn education_spikes_at_bell_times() {
        assert_eq!(hour_modifier("school", 8), 4.0);
        assert_eq!(hour_modifier("school", 11), 0.5);
        assert_eq!(hour_modifier("school", 20), 0.1);
    }

    #[test]
    fn purposes_match_zone_and_hour() {
        assert_eq!(trip_purpose_for("residential", 8), TripPurpose::Work);
        assert_eq!(trip_purpose_for("residential", 16), TripPurpose::Education);
        assert_eq!(trip_purpose_for("residential", 18), TripPurpose::Personal);
        assert_eq!(trip_purpose_for("hospital", 10), TripPurpose::Medical);
        assert_eq!(trip_purpose_for("unknown", 10), TripPurpose::General);
    }

    #[test]
    fn priority_is_boosted_in_rush_and_capped() {
        assert!((priority_for(TripPurpose::Shopping, 8) - 0.7).abs() < 1e-9);
        assert!((priority_for(TripPurpose::Shopping, 11) - 0.6).abs() < 1e-9);
        assert_eq!(priority_for(TripPurpose::Medical, 8), 1.0);
    }
}
