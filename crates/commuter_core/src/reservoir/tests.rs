//! End-to-end reservoir scenarios, driven through the full event loop where
//! the behavior under test spans coordinators, bus, and record store.

use serde_json::json;

use crate::clock::rfc3339_utc;
use crate::commuter::{CommuterIdAllocator, Direction, TripPurpose};
use crate::coordinator::Coordinators;
use crate::event_bus::{topics, Envelope};
use crate::geo::GeoPoint;
use crate::runner::{initialize_service, run_until_empty, service_schedule};
use crate::spawner::SpawnRequest;
use crate::test_helpers::{
    build_test_service, point, test_config, with_reservoirs, RecordedCall, TestService,
    DEPOT_LOCATION,
};

const MINUTE_MS: u64 = 60_000;

fn depot_location() -> GeoPoint {
    point(DEPOT_LOCATION.0, DEPOT_LOCATION.1)
}

fn destination() -> GeoPoint {
    point(13.1139, -59.6128)
}

/// Run the service loop to its configured end time.
fn run_service(service: &mut TestService) {
    initialize_service(&mut service.world);
    let mut schedule = service_schedule();
    run_until_empty(&mut service.world, &mut schedule, 100_000);
}

fn spawn_at_depot(service: &mut TestService, max_wait_ms: u64) -> crate::commuter::Commuter {
    with_reservoirs(&mut service.world, |depot, _route, ctx| {
        depot
            .spawn_commuter(
                ctx,
                "DEP-MAIN",
                "1A",
                depot_location(),
                destination(),
                0.5,
                TripPurpose::General,
                max_wait_ms,
            )
            .expect("spawn at connected depot")
    })
}

// S1: three commuters at a connected depot, vehicle takes the FIFO head.
#[test]
fn depot_fifo_pickup_returns_insertion_prefix() {
    let mut service = build_test_service(test_config(), 1);

    let (first, second, third) = with_reservoirs(&mut service.world, |depot, _route, ctx| {
        let spawn = |depot: &mut crate::reservoir::DepotReservoir,
                     ctx: &mut crate::reservoir::ReservoirCtx<'_>| {
            depot
                .spawn_commuter(
                    ctx,
                    "DEP-MAIN",
                    "1A",
                    depot_location(),
                    destination(),
                    0.5,
                    TripPurpose::General,
                    30 * MINUTE_MS,
                )
                .expect("spawn")
        };
        let first = spawn(depot, ctx);
        let second = spawn(depot, ctx);
        let third = spawn(depot, ctx);

        let found = depot.query_commuters("DEP-MAIN", "1A", depot_location(), 100.0, 2);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, first.id, "FIFO head comes first");
        assert_eq!(found[1].id, second.id);

        assert!(depot.mark_picked_up(ctx, &found[0].id));
        assert!(depot.mark_picked_up(ctx, &found[1].id));
        (first, second, third)
    });

    let snapshot = service.stats.snapshot();
    assert_eq!(snapshot.spawned, 3);
    assert_eq!(snapshot.picked_up, 2);
    assert_eq!(snapshot.waiting, 1);
    assert!(snapshot.is_balanced());

    with_reservoirs(&mut service.world, |depot, _route, _ctx| {
        assert_eq!(depot.occurrences(&first.id), 0);
        assert_eq!(depot.occurrences(&second.id), 0);
        assert_eq!(depot.occurrences(&third.id), 1);
    });

    assert_eq!(service.bus.published_of(topics::COMMUTER_SPAWNED).len(), 3);
    assert_eq!(
        service.bus.published_of(topics::COMMUTER_PICKED_UP).len(),
        2
    );
}

// S2: an idle commuter expires; a late pickup attempt fails.
#[test]
fn expiration_wins_on_idle_commuter() {
    let mut service = build_test_service(test_config(), 15_000);
    let commuter = spawn_at_depot(&mut service, 1_000);

    run_service(&mut service);

    let snapshot = service.stats.snapshot();
    assert_eq!(snapshot.expired, 1);
    assert_eq!(snapshot.picked_up, 0);
    assert_eq!(snapshot.waiting, 0);
    assert_eq!(service.bus.published_of(topics::COMMUTER_EXPIRED).len(), 1);

    let picked = with_reservoirs(&mut service.world, |depot, route, ctx| {
        depot.mark_picked_up(ctx, &commuter.id) || route.mark_picked_up(ctx, &commuter.id)
    });
    assert!(!picked, "pickup after expiration must fail");

    // The expiration sweep staged a server-side cleanup and the flush tick
    // delivered it.
    assert!(service
        .store
        .calls()
        .contains(&RecordedCall::CleanupExpired));
}

// S3: route queries filter on the opaque direction label.
#[test]
fn route_query_filters_by_direction() {
    let mut service = build_test_service(test_config(), 1);
    let spot = point(13.10, -59.61);

    let (outbound, inbound) = with_reservoirs(&mut service.world, |_depot, route, ctx| {
        let outbound = route
            .spawn_commuter(
                ctx,
                "1A",
                spot,
                destination(),
                Direction::Outbound,
                0.5,
                TripPurpose::General,
                30 * MINUTE_MS,
            )
            .expect("outbound spawn");
        let inbound = route
            .spawn_commuter(
                ctx,
                "1A",
                spot,
                destination(),
                Direction::Inbound,
                0.5,
                TripPurpose::General,
                30 * MINUTE_MS,
            )
            .expect("inbound spawn");

        let found = route.query_commuters("1A", spot, Direction::Outbound, 500.0, 10);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, outbound.id);
        (outbound, inbound)
    });

    with_reservoirs(&mut service.world, |_depot, route, _ctx| {
        assert_eq!(route.occurrences(&outbound.id), 1);
        assert_eq!(route.occurrences(&inbound.id), 1);
    });
}

// S4: spawn requests for a route with no connected depot are dropped.
#[test]
fn disconnected_route_requests_are_dropped() {
    let mut service = build_test_service(test_config(), 1);

    with_reservoirs(&mut service.world, |depot, _route, ctx| {
        for _ in 0..100 {
            let request = SpawnRequest {
                spawn_point: point(13.3000, -59.5500),
                destination: point(13.3300, -59.5400),
                route: "9Z".to_string(),
                direction: Direction::Outbound,
                priority: 0.5,
                purpose: TripPurpose::General,
                max_wait_ms: 30 * MINUTE_MS,
                generation_time_ms: 0,
            };
            assert!(depot.spawn_from_request(ctx, &request).is_none());
        }
        assert_eq!(depot.waiting_count(), 0);
    });

    let snapshot = service.stats.snapshot();
    assert_eq!(snapshot.dropped_disconnected, 100);
    assert_eq!(snapshot.spawned, 0);
    assert_eq!(snapshot.waiting, 0);
}

// S5: identical seeds and inputs replay the exact same service run.
#[test]
fn seeded_runs_replay_bit_identically() {
    let mut first = build_test_service(test_config(), 65_000);
    let mut second = build_test_service(test_config(), 65_000);

    run_service(&mut first);
    run_service(&mut second);

    assert_eq!(first.stats.snapshot(), second.stats.snapshot());
    assert_eq!(first.bus.published(), second.bus.published());
    assert_eq!(first.store.calls(), second.store.calls());

    // The morning-rush fixture produces real demand, so the replay check
    // is not vacuous.
    assert!(first.stats.snapshot().spawned > 0);
    assert!(first.stats.snapshot().is_balanced());
}

// S6: pickup and expiration land on the same millisecond; pickup wins.
#[test]
fn pickup_beats_expiration_in_same_tick() {
    let mut config = test_config();
    // Align the bus poll with the expiration sweep so both fire at t=10s.
    config.event_bus.poll_interval_seconds = 10;
    let mut service = build_test_service(config, 11_000);

    // Expires at 9 999 ms: already past its budget when the 10 s tick runs.
    let commuter = spawn_at_depot(&mut service, 9_999);
    service.bus.inject(Envelope {
        event_type: topics::COMMUTER_PICKUP_NOTIFY.to_string(),
        timestamp: rfc3339_utc(0),
        data: json!({ "commuter_id": commuter.id.to_string() }),
        correlation_id: None,
    });

    run_service(&mut service);

    let snapshot = service.stats.snapshot();
    assert_eq!(snapshot.picked_up, 1, "pickup wins the race");
    assert_eq!(snapshot.expired, 0);
    let terminal_events = service.bus.published_of(topics::COMMUTER_PICKED_UP).len()
        + service.bus.published_of(topics::COMMUTER_EXPIRED).len();
    assert_eq!(terminal_events, 1, "exactly one terminal event");
}

#[test]
fn spawning_interval_follows_data_source_override() {
    use crate::data_source::SpawningOverride;
    use crate::test_helpers::{build_test_service_with, FixtureDataSource};

    let mut fixture = FixtureDataSource::default();
    fixture.spawning = Some(SpawningOverride {
        spawn_interval_seconds: Some(15),
        window_minutes: None,
    });
    let mut config = test_config();
    config.config_refresh_seconds = 5;
    let mut service = build_test_service_with(fixture, config, 35_000);

    run_service(&mut service);

    let coordinators = service.world.resource::<Coordinators>();
    assert_eq!(coordinators.depot_spawn.interval_secs(), 15);
    assert_eq!(coordinators.route_spawn.interval_secs(), 15);
    assert!(coordinators.depot_spawn.ticks() > 0);
}

#[test]
fn vehicle_query_over_bus_echoes_correlation_id() {
    let mut service = build_test_service(test_config(), 2_000);
    spawn_at_depot(&mut service, 30 * MINUTE_MS);
    spawn_at_depot(&mut service, 30 * MINUTE_MS);

    service.bus.inject(Envelope {
        event_type: topics::VEHICLE_QUERY_COMMUTERS.to_string(),
        timestamp: rfc3339_utc(0),
        data: json!({
            "depot_id": "DEP-MAIN",
            "route_id": "1A",
            "vehicle_location": { "lat": DEPOT_LOCATION.0, "lon": DEPOT_LOCATION.1 },
            "search_radius": 100.0,
            "available_seats": 5
        }),
        correlation_id: Some("req-42".to_string()),
    });

    run_service(&mut service);

    let responses = service.bus.published_of(topics::COMMUTER_QUERY_RESPONSE);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].correlation_id.as_deref(), Some("req-42"));
    assert_eq!(responses[0].data["total_count"], 2);
}

#[test]
fn record_store_mirror_receives_inserts_and_boardings() {
    let mut service = build_test_service(test_config(), 3_000);
    let commuter = spawn_at_depot(&mut service, 30 * MINUTE_MS);
    with_reservoirs(&mut service.world, |depot, _route, ctx| {
        assert!(depot.mark_picked_up(ctx, &commuter.id));
    });

    run_service(&mut service);

    let calls = service.store.calls();
    assert!(calls.contains(&RecordedCall::Insert(commuter.id.to_string())));
    assert!(calls.contains(&RecordedCall::MarkBoarded(commuter.id.to_string())));
}

#[test]
fn record_store_outage_keeps_writes_queued() {
    let mut service = build_test_service(test_config(), 3_000);
    service.store.set_failing(true);
    spawn_at_depot(&mut service, 30 * MINUTE_MS);

    run_service(&mut service);

    assert!(service.store.calls().is_empty());
    let queue = service
        .world
        .resource::<crate::record_store::RecordStoreQueue>();
    assert_eq!(queue.len(), 1, "insert stays queued for retry");
    let coordinators = service.world.resource::<Coordinators>();
    assert!(coordinators.record_flush.failures() > 0);
}

#[test]
fn record_queue_overflow_drops_oldest() {
    let mut config = test_config();
    config.record_store.queue_capacity = 2;
    let mut service = build_test_service(config, 1);

    spawn_at_depot(&mut service, 30 * MINUTE_MS);
    spawn_at_depot(&mut service, 30 * MINUTE_MS);
    spawn_at_depot(&mut service, 30 * MINUTE_MS);

    assert_eq!(service.stats.snapshot().record_writes_dropped, 1);
    let queue = service
        .world
        .resource::<crate::record_store::RecordStoreQueue>();
    assert_eq!(queue.len(), 2);
}

#[test]
fn global_cap_drops_and_counts_extra_spawns() {
    let config = test_config().with_max_active_commuters(2);
    let mut service = build_test_service(config, 1);

    spawn_at_depot(&mut service, 30 * MINUTE_MS);
    spawn_at_depot(&mut service, 30 * MINUTE_MS);
    let third = with_reservoirs(&mut service.world, |depot, _route, ctx| {
        depot.spawn_commuter(
            ctx,
            "DEP-MAIN",
            "1A",
            depot_location(),
            destination(),
            0.5,
            TripPurpose::General,
            30 * MINUTE_MS,
        )
    });
    assert!(third.is_none());

    let snapshot = service.stats.snapshot();
    assert_eq!(snapshot.spawned, 3);
    assert_eq!(snapshot.waiting, 2);
    assert_eq!(snapshot.dropped_over_cap, 1);
    assert!(snapshot.is_balanced());
}

#[test]
fn duplicate_commuter_id_is_rejected() {
    let mut service = build_test_service(test_config(), 1);
    spawn_at_depot(&mut service, 30 * MINUTE_MS);

    // Rewind the allocator so the next spawn collides with COM-00000000.
    service
        .world
        .insert_resource(CommuterIdAllocator::starting_at(0));
    let duplicate = with_reservoirs(&mut service.world, |depot, _route, ctx| {
        depot.spawn_commuter(
            ctx,
            "DEP-MAIN",
            "1A",
            depot_location(),
            destination(),
            0.5,
            TripPurpose::General,
            30 * MINUTE_MS,
        )
    });

    assert!(duplicate.is_none());
    assert_eq!(service.stats.snapshot().spawn_rejected, 1);
    assert_eq!(service.stats.snapshot().waiting, 1);
}

#[test]
fn pickup_is_idempotent() {
    let mut service = build_test_service(test_config(), 1);
    let commuter = spawn_at_depot(&mut service, 30 * MINUTE_MS);

    with_reservoirs(&mut service.world, |depot, _route, ctx| {
        assert!(depot.mark_picked_up(ctx, &commuter.id));
        assert!(!depot.mark_picked_up(ctx, &commuter.id));
    });

    let snapshot = service.stats.snapshot();
    assert_eq!(snapshot.picked_up, 1, "counter incremented exactly once");
    assert_eq!(
        service.bus.published_of(topics::COMMUTER_PICKED_UP).len(),
        1
    );
}

#[test]
fn zero_distance_query_matches_identical_coordinates_only() {
    let mut service = build_test_service(test_config(), 1);
    with_reservoirs(&mut service.world, |_depot, route, ctx| {
        let here = point(13.1050, -59.6050);
        let near = point(13.1052, -59.6050);
        let at_vehicle = route
            .spawn_commuter(
                ctx,
                "1A",
                here,
                destination(),
                Direction::Outbound,
                0.5,
                TripPurpose::General,
                30 * MINUTE_MS,
            )
            .unwrap();
        route
            .spawn_commuter(
                ctx,
                "1A",
                near,
                destination(),
                Direction::Outbound,
                0.5,
                TripPurpose::General,
                30 * MINUTE_MS,
            )
            .unwrap();

        let found = route.query_commuters("1A", here, Direction::Outbound, 0.0, 10);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, at_vehicle.id);

        let none = route.query_commuters("1A", here, Direction::Outbound, 100.0, 0);
        assert!(none.is_empty(), "max_count 0 returns nothing");
    });
}

#[test]
fn route_query_order_is_scan_order_not_distance() {
    let mut service = build_test_service(test_config(), 1);
    with_reservoirs(&mut service.world, |_depot, route, ctx| {
        // Vehicle sits near the top edge of its cell: the same-cell commuter
        // is farther away than the neighbor-cell one.
        let vehicle = point(13.1095, -59.6050);
        let same_cell_far = point(13.1015, -59.6050);
        let next_cell_near = point(13.1105, -59.6050);

        let far = route
            .spawn_commuter(
                ctx,
                "1A",
                same_cell_far,
                destination(),
                Direction::Outbound,
                0.5,
                TripPurpose::General,
                30 * MINUTE_MS,
            )
            .unwrap();
        let near = route
            .spawn_commuter(
                ctx,
                "1A",
                next_cell_near,
                destination(),
                Direction::Outbound,
                0.5,
                TripPurpose::General,
                30 * MINUTE_MS,
            )
            .unwrap();

        let found = route.query_commuters("1A", vehicle, Direction::Outbound, 2_000.0, 10);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, far.id, "center cell scans before its ring");
        assert_eq!(found[1].id, near.id);
    });
}

#[test]
fn route_reservoir_drops_spawns_for_unloaded_routes() {
    let mut service = build_test_service(test_config(), 1);
    let result = with_reservoirs(&mut service.world, |_depot, route, ctx| {
        route.spawn_commuter(
            ctx,
            "NOPE",
            point(13.10, -59.61),
            destination(),
            Direction::Outbound,
            0.5,
            TripPurpose::General,
            30 * MINUTE_MS,
        )
    });
    assert!(result.is_none());
    assert_eq!(service.stats.snapshot().dropped_disconnected, 1);
    assert_eq!(service.stats.snapshot().spawned, 0);
}

#[test]
fn commuters_exist_in_exactly_one_container() {
    let mut service = build_test_service(test_config(), 1);
    let at_depot = spawn_at_depot(&mut service, 30 * MINUTE_MS);

    let on_route = with_reservoirs(&mut service.world, |_depot, route, ctx| {
        route
            .spawn_commuter(
                ctx,
                "1A",
                point(13.12, -59.615),
                destination(),
                Direction::Inbound,
                0.5,
                TripPurpose::Work,
                30 * MINUTE_MS,
            )
            .unwrap()
    });

    with_reservoirs(&mut service.world, |depot, route, ctx| {
        assert_eq!(depot.occurrences(&at_depot.id) + route.occurrences(&at_depot.id), 1);
        assert_eq!(depot.occurrences(&on_route.id) + route.occurrences(&on_route.id), 1);

        assert!(route.mark_picked_up(ctx, &on_route.id));
        assert_eq!(route.occurrences(&on_route.id), 0);
        assert!(!route.mark_picked_up(ctx, &on_route.id));
    });
}

#[test]
fn expiration_respects_per_commuter_wait_budget() {
    let mut service = build_test_service(test_config(), 25_000);
    // One commuter with a 1 s budget, one with the 30 min default.
    let short = spawn_at_depot(&mut service, 1_000);
    let long = spawn_at_depot(&mut service, 30 * MINUTE_MS);

    run_service(&mut service);

    with_reservoirs(&mut service.world, |depot, _route, _ctx| {
        assert_eq!(depot.occurrences(&short.id), 0, "short budget expired");
        assert_eq!(depot.occurrences(&long.id), 1, "default budget survives");
    });
    let snapshot = service.stats.snapshot();
    assert_eq!(snapshot.expired, 1);
    assert!(snapshot.is_balanced());
}

#[test]
fn reservoir_stats_aggregate_container_counters() {
    let mut service = build_test_service(test_config(), 1);
    spawn_at_depot(&mut service, 30 * MINUTE_MS);
    spawn_at_depot(&mut service, 30 * MINUTE_MS);

    with_reservoirs(&mut service.world, |depot, _route, ctx| {
        let now = ctx.now_ms;
        let stats = depot.get_stats(now);
        assert_eq!(stats.total_spawned, 2);
        assert_eq!(stats.current_waiting, 2);
        assert_eq!(stats.queues.len(), 1);
        assert_eq!(stats.queues[0].depot_id, "DEP-MAIN");
        assert_eq!(stats.queues[0].waiting, 2);
    });
}
