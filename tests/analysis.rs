use std::fs;
use std::path::PathBuf;

use scout_engine::cluster::{AutoKMeans, CLUSTER_COLUMN, KMeans, cluster, cluster_with};
use scout_engine::rating::{RatingConfig, RatingGroup, estimate_style_ratings};
use scout_engine::reduce::{ZScoreMean, reduce, reduce_with};
use scout_engine::standardize::column_stats;
use scout_engine::{Dataset, Record, ScoutError};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn players() -> Dataset {
    serde_json::from_str(&read_fixture("players.json")).expect("players fixture should parse")
}

fn column(ds: &Dataset, name: &str) -> Vec<Option<f64>> {
    ds.values(name).expect("column should exist")
}

fn value_of(ds: &Dataset, id: &str, name: &str) -> Option<f64> {
    ds.records()[ds.position(id).expect("player should exist")].stat(name)
}

#[test]
fn reduce_appends_centered_components() {
    let out = reduce(&players(), &["goals", "shots", "xg"], 2).unwrap();
    for name in ["component_1", "component_2"] {
        let values: Vec<f64> = column(&out, name).into_iter().flatten().collect();
        assert_eq!(values.len(), 13);
        assert!(column_stats(&values).mean.abs() < 1e-9);
    }
    assert_eq!(out.columns().len(), players().columns().len() + 2);
}

#[test]
fn reduce_rejects_too_many_dimensions() {
    assert!(matches!(
        reduce(&players(), &["goals", "shots", "xg"], 4),
        Err(ScoutError::Value(_))
    ));
}

#[test]
fn composite_reducer_orders_like_the_first_component() {
    let ds = players();
    let pca = reduce(&ds, &["goals", "shots", "xg"], 1).unwrap();
    let mean = reduce_with(&ds, &["goals", "shots", "xg"], 1, &ZScoreMean).unwrap();
    for out in [&pca, &mean] {
        let kane = value_of(out, "Kane", "component_1").unwrap();
        assert!(column(out, "component_1").into_iter().flatten().all(|v| v <= kane));
    }
}

#[test]
fn cluster_is_reproducible_and_labels_every_row() {
    let ds = players();
    let cols = ["goals", "shots", "xg", "assists"];
    let first = cluster(&ds, &cols).unwrap();
    let second = cluster(&ds, &cols).unwrap();
    assert_eq!(first, second);
    let labels = column(&first, CLUSTER_COLUMN);
    assert!(labels.iter().all(|l| l.is_some_and(|v| v >= 0.0 && v.fract() == 0.0)));
    assert_eq!(labels[0], Some(0.0));
}

#[test]
fn identical_players_share_a_cluster() {
    let mut ds = players();
    ds.push(
        Record::new("Kane (loan)")
            .with_stat("goals", 36.0)
            .with_stat("shots", 138.0)
            .with_stat("xg", 30.6),
    );
    for estimator in [AutoKMeans::default(), AutoKMeans::elbow(false)] {
        let out = cluster_with(&ds, &["goals", "shots", "xg"], &estimator).unwrap();
        assert_eq!(
            value_of(&out, "Kane", CLUSTER_COLUMN),
            value_of(&out, "Kane (loan)", CLUSTER_COLUMN)
        );
    }
}

#[test]
fn cluster_count_must_fit_the_dataset() {
    let ds = players();
    assert!(matches!(
        cluster_with(&ds, &["goals"], &KMeans::new(14)),
        Err(ScoutError::Value(_))
    ));
    // Every row may be its own cluster; equal goal counts still share a label.
    let out = cluster_with(&ds, &["goals"], &KMeans::new(13)).unwrap();
    assert_eq!(
        value_of(&out, "Odegaard", CLUSTER_COLUMN),
        value_of(&out, "Rodri", CLUSTER_COLUMN)
    );
    assert!(matches!(
        cluster(&ds, &["tackles"]),
        Err(ScoutError::DataQuality(_))
    ));
}

#[test]
fn style_ratings_follow_the_config() {
    let config: RatingConfig =
        serde_json::from_str(&read_fixture("ratings.json")).expect("rating config should parse");
    let out = estimate_style_ratings(&players(), &config).unwrap();

    for name in ["attack_rating", "defense_rating"] {
        assert!(out.has_column(name));
        assert!(column(&out, name).into_iter().flatten().all(|r| (0.0..=100.0).contains(&r)));
    }
    assert_eq!(value_of(&out, "Kane", "attack_rating"), Some(100.0));
    assert_eq!(value_of(&out, "Trialist", "attack_rating"), Some(0.0));
    // No tackles recorded, so no defensive rating.
    assert_eq!(value_of(&out, "Trialist", "defense_rating"), None);
    assert_eq!(column(&out, "defense_rating").into_iter().flatten().count(), 12);
}

#[test]
fn flipping_direction_mirrors_the_rating() {
    let ds = players();
    let up = RatingConfig::new().with("aggression", RatingGroup::new(["fouls"]));
    let down = RatingConfig::new().with("aggression", RatingGroup::new(["fouls"]).lower_better("fouls"));
    let up = column(&estimate_style_ratings(&ds, &up).unwrap(), "aggression_rating");
    let down = column(&estimate_style_ratings(&ds, &down).unwrap(), "aggression_rating");
    for (u, d) in up.iter().zip(&down) {
        let (u, d) = (u.unwrap(), d.unwrap());
        assert!((u + d - 100.0).abs() < 1e-9);
    }
}

#[test]
fn ratings_leave_the_input_untouched() {
    let ds = players();
    let config: RatingConfig =
        serde_json::from_str(&read_fixture("ratings.json")).expect("rating config should parse");
    let _ = estimate_style_ratings(&ds, &config).unwrap();
    assert_eq!(ds, players());
}
