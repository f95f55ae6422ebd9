//! Config refresh: re-read the runtime spawning override from the data
//! source.
//!
//! Mid-run outages are tolerated: the last known configuration and cached
//! geometry stay in effect, and the warning is rate-limited to once per
//! minute of continued unavailability.

use bevy_ecs::prelude::{Res, ResMut, Resource};
use log::{debug, warn};

use crate::clock::{CurrentEvent, EventKind, ServiceClock, ONE_MIN_MS};
use crate::config::{ServiceConfig, SpawnIntervalOverride};
use crate::coordinator::Coordinators;
use crate::systems::DataSourceHandle;

/// Tracks when we last warned about data-source unavailability.
#[derive(Debug, Default, Resource)]
pub struct DataSourceOutage {
    last_warn_ms: Option<u64>,
}

impl DataSourceOutage {
    /// Whether a warning is due (at most one per minute of outage).
    fn should_warn(&mut self, now_ms: u64) -> bool {
        match self.last_warn_ms {
            Some(last) if now_ms.saturating_sub(last) < ONE_MIN_MS => false,
            _ => {
                self.last_warn_ms = Some(now_ms);
                true
            }
        }
    }

    fn clear(&mut self) {
        self.last_warn_ms = None;
    }
}

pub fn config_refresh_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<ServiceClock>,
    mut coordinators: ResMut<Coordinators>,
    mut interval_override: ResMut<SpawnIntervalOverride>,
    mut outage: ResMut<DataSourceOutage>,
    data_source: Res<DataSourceHandle>,
    config: Res<ServiceConfig>,
) {
    if event.0.kind != EventKind::ConfigRefresh {
        return;
    }
    if !coordinators.config_refresh.is_running() {
        return;
    }

    match data_source.source.get_spawning_config(&config.country_code) {
        Ok(Some(remote)) => {
            outage.clear();
            if interval_override.interval_seconds != remote.spawn_interval_seconds {
                debug!(
                    "spawning interval override from data source: {:?} s",
                    remote.spawn_interval_seconds
                );
            }
            interval_override.interval_seconds = remote.spawn_interval_seconds;
            interval_override.window_minutes = remote.window_minutes;
        }
        Ok(None) => {
            outage.clear();
            *interval_override = SpawnIntervalOverride::default();
        }
        Err(err) => {
            coordinators.config_refresh.record_failure();
            if outage.should_warn(clock.now()) {
                warn!("data source unavailable, keeping cached configuration: {err}");
            }
        }
    }

    coordinators.config_refresh.advance(&mut clock);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outage_warnings_are_rate_limited() {
        let mut outage = DataSourceOutage::default();
        assert!(outage.should_warn(0));
        assert!(!outage.should_warn(30_000));
        assert!(outage.should_warn(61_000));
        outage.clear();
        assert!(outage.should_warn(62_000));
    }
}
