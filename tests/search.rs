use std::fs;
use std::path::PathBuf;

use scout_engine::criteria::{Comparison, Criteria, filter};
use scout_engine::normalize::{adjust_per_90, combine, select_label, with_label};
use scout_engine::similarity::{DISTANCE_COLUMN, Target, search_similar, search_similar_with};
use scout_engine::standardize::Imputation;
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

fn ids(ds: &Dataset) -> Vec<&str> {
    ds.iter().map(|r| r.id.as_str()).collect()
}

#[test]
fn fixture_keeps_nulls_distinct_from_zero() {
    let ds = players();
    assert_eq!(ds.len(), 13);
    let trialist = ds.position("Trialist").expect("trialist row");
    assert_eq!(ds.records()[trialist].stat("minutes"), None);
    assert_eq!(ds.records()[trialist].stat("goals"), Some(0.0));
}

#[test]
fn criteria_document_filters_in_order() {
    let criteria: Criteria =
        serde_json::from_str(&read_fixture("criteria.json")).expect("criteria should parse");
    let out = filter(&players(), &criteria).unwrap();
    assert_eq!(ids(&out), vec!["Palmer", "Haaland", "Musiala", "Kane", "Wirtz"]);
}

#[test]
fn empty_criteria_returns_dataset_unchanged() {
    let ds = players();
    assert_eq!(filter(&ds, &Criteria::new()).unwrap(), ds);
}

#[test]
fn filtered_rows_all_satisfy_the_criteria() {
    let criteria = Criteria::new()
        .with(Comparison::Gt, "xg", 5.0)
        .with(Comparison::Lt, "tackles", 30.0);
    let out = filter(&players(), &criteria).unwrap();
    assert!(!out.is_empty());
    for r in out.iter() {
        assert!(r.stat("xg").unwrap() > 5.0);
        assert!(r.stat("tackles").unwrap() < 30.0);
    }
}

#[test]
fn per_90_divides_by_minutes_and_nulls_missing_minutes() {
    let out = adjust_per_90(&players(), &["goals", "shots"]).unwrap();
    let saka = &out.records()[out.position("Saka").unwrap()];
    assert!((saka.stat("goals").unwrap() - 14.0 * 90.0 / 2790.0).abs() < 1e-12);
    let trialist = &out.records()[out.position("Trialist").unwrap()];
    assert_eq!(trialist.stat("goals"), None);
    assert_eq!(trialist.stat("xg"), Some(0.3));
}

#[test]
fn combine_then_select_restores_each_source() {
    let ds = players();
    let epl = select_label(&ds, "comp", "EPL").unwrap();
    let bun = select_label(&ds, "comp", "BUN").unwrap();
    let mut bun_only = bun.clone();
    bun_only.push(Record::new("Grimaldo").with_stat("xa", 0.31).with_label("comp", "BUN"));

    let tagged_epl = with_label(&epl, "source", "epl");
    let tagged_bun = with_label(&bun_only, "source", "bun");
    let combined = combine(&[tagged_epl.clone(), tagged_bun.clone()]).unwrap();
    assert_eq!(combined.len(), epl.len() + bun_only.len());
    assert!(combined.has_column("xa"));

    let back_epl = select_label(&combined, "source", "epl").unwrap();
    let back_bun = select_label(&combined, "source", "bun").unwrap();
    assert_eq!(back_epl.records(), tagged_epl.records());
    assert_eq!(back_bun.records(), tagged_bun.records());
    // Rows from the source without `xa` read it as null, not zero.
    assert!(back_epl.values("xa").unwrap().iter().all(Option::is_none));
}

#[test]
fn similar_players_rank_nearest_first() {
    let out = search_similar(&players(), &["goals", "xg", "shots"], "Kane", 3).unwrap();
    assert_eq!(out.len(), 3);
    assert_eq!(ids(&out)[0], "Haaland");
    assert!(!ids(&out).contains(&"Kane"));
    let d: Vec<f64> = out.values(DISTANCE_COLUMN).unwrap().into_iter().flatten().collect();
    assert!(d.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn similarity_errors_are_typed() {
    let ds = players();
    assert!(matches!(
        search_similar(&ds, &["goals"], "Messi", 3),
        Err(ScoutError::NotFound(_))
    ));
    assert!(matches!(
        search_similar(&ds, &["progressive_carries"], "Kane", 3),
        Err(ScoutError::Schema(_))
    ));
    assert!(matches!(
        search_similar(&ds, &["tackles", "interceptions"], "Rice", 3),
        Err(ScoutError::DataQuality(_))
    ));
    let imputed = search_similar_with(
        &ds,
        &["tackles", "interceptions"],
        Target::Id("Rice".to_string()),
        3,
        Imputation::ColumnMean,
    )
    .unwrap();
    assert_eq!(ids(&imputed)[0], "Xhaka");
}
