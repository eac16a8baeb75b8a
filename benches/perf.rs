use criterion::{Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;

use scout_engine::cluster::{AutoKMeans, cluster_with};
use scout_engine::criteria::{Comparison, Criteria, filter};
use scout_engine::normalize::adjust_per_90;
use scout_engine::rating::{RatingConfig, RatingGroup, estimate_style_ratings};
use scout_engine::reduce::reduce;
use scout_engine::similarity::search_similar;
use scout_engine::{Dataset, Record};

const STATS: [&str; 8] = [
    "goals",
    "assists",
    "shots",
    "xg",
    "key_passes",
    "tackles",
    "interceptions",
    "fouls",
];

fn sample_league(players: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    Dataset::from_records(
        "player",
        (0..players).map(|idx| {
            let mut record = Record::new(format!("Player {}", idx + 1))
                .with_stat("minutes", rng.gen_range(450.0..3400.0))
                .with_label("team", format!("Team {}", idx % 20));
            for stat in STATS {
                record = record.with_stat(stat, rng.gen_range(0.0..60.0));
            }
            record
        }),
    )
}

fn bench_filter(c: &mut Criterion) {
    let ds = sample_league(600);
    let criteria = Criteria::new()
        .with(Comparison::Gte, "goals", 20.0)
        .with(Comparison::Lt, "fouls", 40.0);
    c.bench_function("criteria_filter", |b| {
        b.iter(|| {
            let out = filter(black_box(&ds), black_box(&criteria)).unwrap();
            black_box(out.len());
        })
    });
}

fn bench_per_90(c: &mut Criterion) {
    let ds = sample_league(600);
    c.bench_function("adjust_per_90", |b| {
        b.iter(|| {
            let out = adjust_per_90(black_box(&ds), &STATS).unwrap();
            black_box(out.len());
        })
    });
}

fn bench_similarity(c: &mut Criterion) {
    let ds = sample_league(600);
    c.bench_function("search_similar", |b| {
        b.iter(|| {
            let out = search_similar(black_box(&ds), &STATS, "Player 42", 10).unwrap();
            black_box(out.len());
        })
    });
}

fn bench_reduce(c: &mut Criterion) {
    let ds = sample_league(600);
    c.bench_function("reduce_pca", |b| {
        b.iter(|| {
            let out = reduce(black_box(&ds), &STATS, 2).unwrap();
            black_box(out.len());
        })
    });
}

fn bench_cluster(c: &mut Criterion) {
    let ds = sample_league(300);
    let estimator = AutoKMeans::default();
    c.bench_function("cluster_auto", |b| {
        b.iter(|| {
            let out = cluster_with(black_box(&ds), &STATS[..4], &estimator).unwrap();
            black_box(out.len());
        })
    });
}

fn bench_ratings(c: &mut Criterion) {
    let ds = sample_league(600);
    let config = RatingConfig::new()
        .with("attack", RatingGroup::new(["goals", "shots", "xg"]))
        .with(
            "defense",
            RatingGroup::new(["tackles", "interceptions", "fouls"]).lower_better("fouls"),
        );
    c.bench_function("style_ratings", |b| {
        b.iter(|| {
            let out = estimate_style_ratings(black_box(&ds), black_box(&config)).unwrap();
            black_box(out.len());
        })
    });
}

criterion_group!(
    benches,
    bench_filter,
    bench_per_90,
    bench_similarity,
    bench_reduce,
    bench_cluster,
    bench_ratings
);
criterion_main!(benches);
