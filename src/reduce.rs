use std::collections::BTreeMap;
use std::fmt;

use nalgebra::{DMatrix, SymmetricEigen};

use crate::dataset::Dataset;
use crate::error::{Result, ScoutError};
use crate::standardize::{Imputation, feature_matrix, standardize};

pub const COMPONENT_PREFIX: &str = "component_";

/// Projects a standardized matrix onto fewer derived dimensions.
///
/// Implementations must return `target_dims` columns with one row per input row, in
/// the input's row order.
pub trait Reducer: Send + Sync {
    fn name(&self) -> &str;

    fn fit_transform(&self, matrix: &DMatrix<f64>, target_dims: usize) -> Result<DMatrix<f64>>;
}

/// Principal component analysis over the covariance matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pca;

#[derive(Debug, Clone, PartialEq)]
pub struct PcaFit {
    pub means: Vec<f64>,
    /// Features × components; each column is a unit loading vector.
    pub components: DMatrix<f64>,
    pub explained_variance: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

impl Pca {
    /// Components come out in decreasing explained variance. Eigenvector signs are
    /// arbitrary, so each component is flipped until its loadings sum to a
    /// non-negative value (largest loading positive when the sum is zero).
    pub fn fit(&self, matrix: &DMatrix<f64>, target_dims: usize) -> Result<PcaFit> {
        check_dims(matrix.ncols(), target_dims)?;
        let (n, p) = matrix.shape();

        let means: Vec<f64> = (0..p)
            .map(|j| {
                if n == 0 {
                    0.0
                } else {
                    matrix.column(j).sum() / n as f64
                }
            })
            .collect();
        let centered = DMatrix::from_fn(n, p, |i, j| matrix[(i, j)] - means[j]);
        let denom = (n.max(2) - 1) as f64;
        let cov = (centered.transpose() * &centered) / denom;

        let eigen = SymmetricEigen::new(cov);
        let mut order: Vec<usize> = (0..p).collect();
        order.sort_by(|a, b| eigen.eigenvalues[*b].total_cmp(&eigen.eigenvalues[*a]));

        let mut components = DMatrix::from_fn(p, target_dims, |i, k| eigen.eigenvectors[(i, order[k])]);
        for k in 0..target_dims {
            let mut col = components.column_mut(k);
            let sum = col.sum();
            let flip = if sum.abs() > 1e-12 {
                sum < 0.0
            } else {
                col.iter()
                    .copied()
                    .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                    .is_some_and(|v| v < 0.0)
            };
            if flip {
                col.neg_mut();
            }
        }

        let variances: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i].max(0.0)).collect();
        let total: f64 = variances.iter().sum();
        let explained_variance: Vec<f64> = variances[..target_dims].to_vec();
        let explained_variance_ratio = explained_variance
            .iter()
            .map(|v| if total > 0.0 { v / total } else { 0.0 })
            .collect();

        Ok(PcaFit {
            means,
            components,
            explained_variance,
            explained_variance_ratio,
        })
    }
}

impl PcaFit {
    pub fn transform(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if matrix.ncols() != self.means.len() {
            return Err(ScoutError::Value(format!(
                "fitted on {} columns, got {}",
                self.means.len(),
                matrix.ncols()
            )));
        }
        let centered = DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| {
            matrix[(i, j)] - self.means[j]
        });
        Ok(centered * &self.components)
    }
}

impl Reducer for Pca {
    fn name(&self) -> &str {
        "pca"
    }

    fn fit_transform(&self, matrix: &DMatrix<f64>, target_dims: usize) -> Result<DMatrix<f64>> {
        self.fit(matrix, target_dims)?.transform(matrix)
    }
}

/// Mean of the standardized columns: the plain composite z-score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZScoreMean;

impl Reducer for ZScoreMean {
    fn name(&self) -> &str {
        "zscore_mean"
    }

    fn fit_transform(&self, matrix: &DMatrix<f64>, target_dims: usize) -> Result<DMatrix<f64>> {
        if target_dims != 1 {
            return Err(ScoutError::Value(format!(
                "zscore_mean produces 1 dimension, {target_dims} requested"
            )));
        }
        let p = matrix.ncols().max(1) as f64;
        Ok(DMatrix::from_fn(matrix.nrows(), 1, |i, _| matrix.row(i).sum() / p))
    }
}

/// Reducers addressable by name from rating configs.
pub struct ReducerRegistry {
    reducers: BTreeMap<String, Box<dyn Reducer>>,
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        let mut out = Self::empty();
        out.register(Box::new(Pca));
        out.register(Box::new(ZScoreMean));
        out
    }
}

impl fmt::Debug for ReducerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.reducers.keys()).finish()
    }
}

impl ReducerRegistry {
    pub fn empty() -> Self {
        Self {
            reducers: BTreeMap::new(),
        }
    }

    /// Registers under `reducer.name()`, replacing any reducer already there.
    pub fn register(&mut self, reducer: Box<dyn Reducer>) {
        self.reducers.insert(reducer.name().to_string(), reducer);
    }

    pub fn get(&self, name: &str) -> Result<&dyn Reducer> {
        self.reducers
            .get(name)
            .map(|r| r.as_ref())
            .ok_or_else(|| ScoutError::Config(format!("unknown reducer '{name}'")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.reducers.keys().map(String::as_str)
    }
}

/// Appends `component_1..=target_dims` computed by PCA.
pub fn reduce(dataset: &Dataset, columns: &[&str], target_dims: usize) -> Result<Dataset> {
    reduce_with(dataset, columns, target_dims, &Pca)
}

pub fn reduce_with(
    dataset: &Dataset,
    columns: &[&str],
    target_dims: usize,
    reducer: &dyn Reducer,
) -> Result<Dataset> {
    dataset.require_columns(columns)?;
    check_dims(columns.len(), target_dims)?;
    let z = standardize(&feature_matrix(dataset, columns, Imputation::Forbid)?);
    let reduced = run_reducer(reducer, &z, target_dims)?;

    let mut out = dataset.clone();
    for k in 0..target_dims {
        let values: Vec<Option<f64>> = reduced.column(k).iter().map(|v| Some(*v)).collect();
        out.set_column(&format!("{COMPONENT_PREFIX}{}", k + 1), &values);
    }
    Ok(out)
}

pub(crate) fn run_reducer(
    reducer: &dyn Reducer,
    z: &DMatrix<f64>,
    target_dims: usize,
) -> Result<DMatrix<f64>> {
    let reduced = reducer.fit_transform(z, target_dims)?;
    if reduced.shape() != (z.nrows(), target_dims) {
        return Err(ScoutError::Config(format!(
            "reducer '{}' returned {}x{}, expected {}x{}",
            reducer.name(),
            reduced.nrows(),
            reduced.ncols(),
            z.nrows(),
            target_dims
        )));
    }
    Ok(reduced)
}

fn check_dims(available: usize, target_dims: usize) -> Result<()> {
    if target_dims < 1 || target_dims > available {
        return Err(ScoutError::Value(format!(
            "target dimensions must be within 1..={available} (got {target_dims})"
        )));
    }
    Ok(())
}
