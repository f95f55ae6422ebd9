//! Event-reacting systems: each runs when the current clock event matches
//! its kind (wired up with run conditions in [crate::runner]).

pub mod bus_inbound;
pub mod config_refresh;
pub mod expiration;
pub mod record_flush;
pub mod service_started;
pub mod spawn_tick;
pub mod stats_report;

use bevy_ecs::prelude::Resource;

use crate::data_source::TransitDataSource;

/// Resource wrapping whichever data-source implementation is wired in.
#[derive(Resource)]
pub struct DataSourceHandle {
    pub source: Box<dyn TransitDataSource>,
}
