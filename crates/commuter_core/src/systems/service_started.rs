//! Startup system: kicks off every coordinator and logs the loaded world.

use bevy_ecs::prelude::{Res, ResMut};
use log::info;

use crate::clock::{CurrentEvent, EventKind, ServiceClock};
use crate::coordinator::Coordinators;
use crate::reservoir::DepotReservoir;
use crate::zones::{RouteTable, ZoneCache};

pub fn service_started_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<ServiceClock>,
    mut coordinators: ResMut<Coordinators>,
    routes: Res<RouteTable>,
    zones: Res<ZoneCache>,
    depot_reservoir: Res<DepotReservoir>,
) {
    if event.0.kind != EventKind::ServiceStarted {
        return;
    }

    let zone_stats = zones.statistics();
    info!(
        "commuter service started: {} routes, {} population zones, {} amenity zones",
        routes.len(),
        zone_stats.population_retained,
        zone_stats.amenity_retained
    );
    for route in routes.routes() {
        info!(
            "  route {} ({:.1} km, {} vertices, connected depot: {})",
            route.short_name,
            route.length_m / 1000.0,
            route.geometry.len(),
            depot_reservoir.route_has_connected_depot(&route.short_name)
        );
    }

    coordinators.start_all(&mut clock);
}
