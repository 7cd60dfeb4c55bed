use chrono::Utc;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use domain::{
    ComposterProfile, DEFAULT_RECOMMENDATION_LIMIT, GeoPoint, Money, Quantity, UserId,
    great_circle_distance_km, rank_composters, total_price,
};
use std::hint::black_box;

fn make_profiles(count: usize) -> Vec<ComposterProfile> {
    (0..count)
        .map(|i| {
            // spread composters over a grid around Bengaluru
            let lat = 12.0 + (i % 100) as f64 * 0.02;
            let lon = 77.0 + (i / 100) as f64 * 0.02;
            let radius = if i % 3 == 0 { Some(25.0) } else { None };
            ComposterProfile::new(
                UserId::new(),
                GeoPoint::new(lat, lon).unwrap(),
                radius,
                Utc::now(),
            )
            .unwrap()
        })
        .collect()
}

fn bench_distance(c: &mut Criterion) {
    let a = GeoPoint::new(12.9716, 77.5946).unwrap();
    let b = GeoPoint::new(13.0827, 80.2707).unwrap();

    c.bench_function("matching/great_circle_distance", |bench| {
        bench.iter(|| great_circle_distance_km(black_box(a), black_box(b)));
    });
}

fn bench_rank(c: &mut Criterion) {
    let origin = GeoPoint::new(12.9716, 77.5946).unwrap();
    let mut group = c.benchmark_group("matching/rank_composters");

    for count in [10, 100, 1_000, 10_000] {
        let profiles = make_profiles(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &profiles, |b, profiles| {
            b.iter(|| {
                rank_composters(
                    black_box(origin),
                    profiles.iter(),
                    DEFAULT_RECOMMENDATION_LIMIT,
                )
            });
        });
    }

    group.finish();
}

fn bench_total_price(c: &mut Criterion) {
    let quantity = Quantity::from_grams(2_345).unwrap();
    let price = Money::from_minor_units(999);

    c.bench_function("money/total_price", |b| {
        b.iter(|| total_price(black_box(quantity), black_box(price)).unwrap());
    });
}

criterion_group!(benches, bench_distance, bench_rank, bench_total_price);
criterion_main!(benches);
