use nalgebra::DMatrix;

use crate::dataset::Dataset;
use crate::error::{Result, ScoutError};

/// Standard deviations at or below this are treated as zero.
pub const STD_EPSILON: f64 = 1e-9;

/// What to do with nulls in the selected columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Imputation {
    /// Fail with a data quality error.
    #[default]
    Forbid,
    /// Replace a null with the mean of the column's present values.
    ColumnMean,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub mean: f64,
    pub std: f64,
}

/// Mean and population standard deviation; the dataset is the whole pool, not a sample.
pub fn column_stats(values: &[f64]) -> ColumnStats {
    if values.is_empty() {
        return ColumnStats { mean: 0.0, std: 0.0 };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    ColumnStats {
        mean,
        std: var.sqrt(),
    }
}

/// Zero-variance columns carry no information and map to 0.
pub fn zscore(value: f64, stats: ColumnStats) -> f64 {
    if stats.std <= STD_EPSILON {
        0.0
    } else {
        (value - stats.mean) / stats.std
    }
}

/// Z-scores every column of `matrix`.
pub fn standardize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let stats: Vec<ColumnStats> = (0..matrix.ncols())
        .map(|j| column_stats(&column_values(matrix, j)))
        .collect();
    DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| {
        zscore(matrix[(i, j)], stats[j])
    })
}

pub(crate) fn column_values(matrix: &DMatrix<f64>, j: usize) -> Vec<f64> {
    matrix.column(j).iter().copied().collect()
}

/// Rows × columns matrix of the selected statistics, in row order.
pub fn feature_matrix(
    dataset: &Dataset,
    columns: &[&str],
    imputation: Imputation,
) -> Result<DMatrix<f64>> {
    dataset.require_columns(columns)?;

    let mut filled: Vec<Vec<f64>> = Vec::with_capacity(columns.len());
    for column in columns {
        let values = dataset.values(column)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.len() == values.len() {
            filled.push(present);
            continue;
        }
        match imputation {
            Imputation::Forbid => {
                let row = values.iter().position(Option::is_none).unwrap_or(0);
                return Err(ScoutError::DataQuality(format!(
                    "null '{}' for {} '{}'",
                    column,
                    dataset.id_column(),
                    dataset.records()[row].id
                )));
            }
            Imputation::ColumnMean => {
                if present.is_empty() {
                    return Err(ScoutError::DataQuality(format!(
                        "column '{column}' has no values to impute from"
                    )));
                }
                let mean = column_stats(&present).mean;
                filled.push(values.iter().map(|v| v.unwrap_or(mean)).collect());
            }
        }
    }

    Ok(DMatrix::from_fn(dataset.len(), columns.len(), |i, j| filled[j][i]))
}

/// Indices of rows with every selected statistic present.
pub(crate) fn complete_rows(dataset: &Dataset, columns: &[&str]) -> Vec<usize> {
    dataset
        .iter()
        .enumerate()
        .filter(|(_, r)| columns.iter().all(|c| r.stat(c).is_some()))
        .map(|(idx, _)| idx)
        .collect()
}

/// Matrix over `rows` only; callers pass rows from [`complete_rows`].
pub(crate) fn rows_matrix(dataset: &Dataset, columns: &[&str], rows: &[usize]) -> DMatrix<f64> {
    let records = dataset.records();
    DMatrix::from_fn(rows.len(), columns.len(), |i, j| {
        records[rows[i]].stat(columns[j]).unwrap_or(f64::NAN)
    })
}
