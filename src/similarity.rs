use crate::dataset::Dataset;
use crate::error::{Result, ScoutError};
use crate::standardize::{Imputation, feature_matrix, standardize};

/// Column holding each neighbour's distance to the target.
pub const DISTANCE_COLUMN: &str = "similarity_distance";

/// Record to search around: an identifier (first match wins) or a row index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(String),
    Row(usize),
}

impl From<&str> for Target {
    fn from(id: &str) -> Self {
        Target::Id(id.to_string())
    }
}

impl From<String> for Target {
    fn from(id: String) -> Self {
        Target::Id(id)
    }
}

impl From<usize> for Target {
    fn from(row: usize) -> Self {
        Target::Row(row)
    }
}

impl Target {
    fn resolve(&self, dataset: &Dataset) -> Result<usize> {
        match self {
            Target::Id(id) => dataset.position(id).ok_or_else(|| {
                ScoutError::NotFound(format!("no {} '{}' in dataset", dataset.id_column(), id))
            }),
            Target::Row(row) if *row < dataset.len() => Ok(*row),
            Target::Row(row) => Err(ScoutError::NotFound(format!(
                "row {} out of range for {} records",
                row,
                dataset.len()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    pub row: usize,
    pub id: String,
    pub distance: f64,
}

/// The `num` records closest to `target` over `columns`.
pub fn search_similar(
    dataset: &Dataset,
    columns: &[&str],
    target: impl Into<Target>,
    num: usize,
) -> Result<Dataset> {
    search_similar_with(dataset, columns, target, num, Imputation::Forbid)
}

pub fn search_similar_with(
    dataset: &Dataset,
    columns: &[&str],
    target: impl Into<Target>,
    num: usize,
    imputation: Imputation,
) -> Result<Dataset> {
    let neighbours = rank_neighbours(dataset, columns, &target.into(), num, imputation)?;
    let records = neighbours
        .iter()
        .map(|n| {
            let mut record = dataset.records()[n.row].clone();
            record.set_stat(DISTANCE_COLUMN, Some(n.distance));
            record
        })
        .collect();
    let mut out = dataset.with_records(records);
    out.add_column(DISTANCE_COLUMN);
    Ok(out)
}

/// Euclidean distances in z-score space, nearest first, ties kept in row order.
/// The target itself is never part of the result.
pub fn rank_neighbours(
    dataset: &Dataset,
    columns: &[&str],
    target: &Target,
    num: usize,
    imputation: Imputation,
) -> Result<Vec<Neighbour>> {
    if columns.is_empty() {
        return Err(ScoutError::Value("similarity search needs at least one column".to_string()));
    }
    dataset.require_columns(columns)?;
    let target_row = target.resolve(dataset)?;
    let z = standardize(&feature_matrix(dataset, columns, imputation)?);

    let origin = z.row(target_row);
    let mut ranked: Vec<Neighbour> = dataset
        .iter()
        .enumerate()
        .filter(|(row, _)| *row != target_row)
        .map(|(row, record)| Neighbour {
            row,
            id: record.id.clone(),
            distance: (z.row(row) - &origin).norm(),
        })
        .collect();
    // Stable sort keeps row order among equal distances.
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked.truncate(num);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;

    fn points() -> Dataset {
        Dataset::from_records(
            "player",
            [("A", 0.0, 0.0), ("B", 1.0, 0.0), ("C", 0.0, 1.0), ("D", 10.0, 10.0), ("E", -1.0, 0.0)]
                .into_iter()
                .map(|(id, x, y)| Record::new(id).with_stat("x", x).with_stat("y", y)),
        )
    }

    #[test]
    fn nearest_first_excluding_target() {
        let out = search_similar(&points(), &["x", "y"], "A", 3).unwrap();
        let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert!(!ids.contains(&"A"));
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&"D"));
        let d = out.values(DISTANCE_COLUMN).unwrap();
        assert!(d.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn equal_distances_keep_row_order() {
        let ds = Dataset::from_records(
            "player",
            [("A", 0.0), ("B", 2.0), ("C", 0.0), ("D", 2.0), ("E", 5.0)]
                .into_iter()
                .map(|(id, x)| Record::new(id).with_stat("x", x)),
        );
        let ranked = rank_neighbours(&ds, &["x"], &Target::from("A"), 3, Imputation::Forbid).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B", "D"]);
        assert_eq!(ranked[1].distance, ranked[2].distance);
    }

    #[test]
    fn result_length_is_capped_by_dataset() {
        let out = search_similar(&points(), &["x", "y"], "D", 50).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn row_index_target_is_supported() {
        let by_row = search_similar(&points(), &["x", "y"], 3usize, 2).unwrap();
        let by_id = search_similar(&points(), &["x", "y"], "D", 2).unwrap();
        assert_eq!(by_row, by_id);
    }

    #[test]
    fn missing_target_is_not_found() {
        assert!(matches!(
            search_similar(&points(), &["x"], "Z", 2),
            Err(ScoutError::NotFound(_))
        ));
        assert!(matches!(
            search_similar(&points(), &["x"], 99usize, 2),
            Err(ScoutError::NotFound(_))
        ));
    }

    #[test]
    fn nulls_need_explicit_imputation() {
        let mut ds = points();
        ds.push(Record::new("F").with_stat("x", 0.5));
        assert!(matches!(
            search_similar(&ds, &["x", "y"], "A", 2),
            Err(ScoutError::DataQuality(_))
        ));
        let out = search_similar_with(&ds, &["x", "y"], "A", 5, Imputation::ColumnMean).unwrap();
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn input_dataset_is_untouched() {
        let ds = points();
        let _ = search_similar(&ds, &["x", "y"], "A", 2).unwrap();
        assert_eq!(ds, points());
        assert!(!ds.has_column(DISTANCE_COLUMN));
    }
}
