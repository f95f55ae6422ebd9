//! Performance benchmarks for commuter_core using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use commuter_core::commuter::{Direction, TripPurpose};
use commuter_core::geo::{grid_cell, haversine_m, nearby_cells, GeoPoint};
use commuter_core::runner::{initialize_service, run_until_empty, service_schedule};
use commuter_core::test_helpers::{build_test_service, point, test_config, with_reservoirs};

fn bench_geo_primitives(c: &mut Criterion) {
    let a = point(13.0969, -59.6145);
    let b = point(13.2508, -59.6436);

    c.bench_function("haversine_m", |bencher| {
        bencher.iter(|| black_box(haversine_m(black_box(a), black_box(b))));
    });
    c.bench_function("grid_cell", |bencher| {
        bencher.iter(|| black_box(grid_cell(black_box(a), 0.01)));
    });
    c.bench_function("nearby_cells_2km", |bencher| {
        bencher.iter(|| black_box(nearby_cells(black_box(a), 2.0, 0.01)));
    });
}

fn bench_route_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_query");
    for commuters in [100usize, 1_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(commuters),
            &commuters,
            |bencher, &commuters| {
                let mut service = build_test_service(test_config(), 1);
                with_reservoirs(&mut service.world, |_depot, route, ctx| {
                    for i in 0..commuters {
                        // Spread along the 1A corridor.
                        let t = i as f64 / commuters as f64;
                        let lat = 13.0969 + t * 0.15;
                        let lon = -59.6145 - t * 0.03;
                        route.spawn_commuter(
                            ctx,
                            "1A",
                            point(lat, lon),
                            point(13.1139, -59.6128),
                            Direction::Outbound,
                            0.5,
                            TripPurpose::General,
                            30 * 60_000,
                        );
                    }
                });
                let vehicle = point(13.17, -59.629);
                bencher.iter(|| {
                    with_reservoirs(&mut service.world, |_depot, route, _ctx| {
                        black_box(route.query_commuters(
                            "1A",
                            vehicle,
                            Direction::Outbound,
                            1_000.0,
                            30,
                        ))
                    })
                });
            },
        );
    }
    group.finish();
}

fn bench_service_run(c: &mut Criterion) {
    c.bench_function("service_run_10min", |bencher| {
        bencher.iter(|| {
            let mut service = build_test_service(test_config(), 10 * 60 * 1000);
            initialize_service(&mut service.world);
            let mut schedule = service_schedule();
            black_box(run_until_empty(&mut service.world, &mut schedule, 1_000_000));
        });
    });
}

criterion_group!(benches, bench_geo_primitives, bench_route_query, bench_service_run);
criterion_main!(benches);
