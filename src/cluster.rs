use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{Result, ScoutError};
use crate::standardize::{Imputation, feature_matrix, standardize};

pub const CLUSTER_COLUMN: &str = "cluster";

pub const DEFAULT_SEED: u64 = 42;

/// Assigns one integer label per row of a standardized matrix.
pub trait Estimator: Send + Sync {
    fn name(&self) -> &str;

    fn fit_predict(&self, matrix: &DMatrix<f64>) -> Result<Vec<usize>>;
}

/// Lloyd's k-means with k-means++ seeding and several seeded restarts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeans {
    pub k: usize,
    pub seed: u64,
    pub max_iter: usize,
    pub n_init: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// k × features.
    pub centroids: DMatrix<f64>,
    /// Renumbered in order of first appearance, so row 0 is always in cluster 0.
    pub labels: Vec<usize>,
    /// Within-cluster sum of squared distances.
    pub inertia: f64,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            seed: DEFAULT_SEED,
            max_iter: 300,
            n_init: 4,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn fit(&self, matrix: &DMatrix<f64>) -> Result<KMeansFit> {
        let n = matrix.nrows();
        if n == 0 {
            return Err(ScoutError::Value("cannot cluster zero records".to_string()));
        }
        if self.k < 1 || self.k > n {
            return Err(ScoutError::Value(format!(
                "cluster count must be within 1..={n} (got {})",
                self.k
            )));
        }

        let mut best: Option<KMeansFit> = None;
        for run in 0..self.n_init.max(1) {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(run as u64));
            let fit = self.lloyd(matrix, seed_centroids(matrix, self.k, &mut rng));
            // Earliest run wins ties.
            if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }
        let best = best.ok_or_else(|| ScoutError::Value("no k-means run completed".to_string()))?;
        Ok(relabel(best))
    }

    fn lloyd(&self, matrix: &DMatrix<f64>, mut centroids: DMatrix<f64>) -> KMeansFit {
        let (n, p) = matrix.shape();
        let mut labels = vec![0usize; n];

        for iter in 0..self.max_iter.max(1) {
            let mut changed = false;
            for (i, label) in labels.iter_mut().enumerate() {
                let (nearest, _) = nearest_centroid(matrix, i, &centroids);
                if nearest != *label {
                    *label = nearest;
                    changed = true;
                }
            }
            if iter > 0 && !changed {
                break;
            }

            let mut sums = DMatrix::<f64>::zeros(self.k, p);
            let mut counts = vec![0usize; self.k];
            for (i, &label) in labels.iter().enumerate() {
                counts[label] += 1;
                for j in 0..p {
                    sums[(label, j)] += matrix[(i, j)];
                }
            }
            // An emptied cluster keeps its previous centroid.
            for (c, &count) in counts.iter().enumerate() {
                if count > 0 {
                    for j in 0..p {
                        centroids[(c, j)] = sums[(c, j)] / count as f64;
                    }
                }
            }
        }

        // Labels must follow the returned centroids when max_iter ran out.
        for (i, label) in labels.iter_mut().enumerate() {
            *label = nearest_centroid(matrix, i, &centroids).0;
        }
        let inertia = (0..n)
            .map(|i| sq_dist(matrix, i, &centroids, labels[i]))
            .sum();
        KMeansFit {
            centroids,
            labels,
            inertia,
        }
    }
}

impl Estimator for KMeans {
    fn name(&self) -> &str {
        "kmeans"
    }

    fn fit_predict(&self, matrix: &DMatrix<f64>) -> Result<Vec<usize>> {
        Ok(self.fit(matrix)?.labels)
    }
}

fn sq_dist(matrix: &DMatrix<f64>, row: usize, centroids: &DMatrix<f64>, c: usize) -> f64 {
    (0..matrix.ncols())
        .map(|j| {
            let d = matrix[(row, j)] - centroids[(c, j)];
            d * d
        })
        .sum()
}

/// Lowest index wins on equal distance.
fn nearest_centroid(matrix: &DMatrix<f64>, row: usize, centroids: &DMatrix<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for c in 0..centroids.nrows() {
        let d = sq_dist(matrix, row, centroids, c);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// k-means++: each further centre is drawn with probability proportional to its
/// squared distance from the nearest centre already chosen.
fn seed_centroids(matrix: &DMatrix<f64>, k: usize, rng: &mut ChaCha8Rng) -> DMatrix<f64> {
    let (n, p) = matrix.shape();
    let mut chosen = vec![rng.gen_range(0..n)];
    let mut closest: Vec<f64> = (0..n)
        .map(|i| row_sq_dist(matrix, i, chosen[0]))
        .collect();

    while chosen.len() < k {
        let total: f64 = closest.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut pick = n - 1;
            for (i, d) in closest.iter().enumerate() {
                if target < *d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            rng.gen_range(0..n)
        };
        chosen.push(next);
        for (i, d) in closest.iter_mut().enumerate() {
            *d = d.min(row_sq_dist(matrix, i, next));
        }
    }

    DMatrix::from_fn(k, p, |c, j| matrix[(chosen[c], j)])
}

fn row_sq_dist(matrix: &DMatrix<f64>, a: usize, b: usize) -> f64 {
    (0..matrix.ncols())
        .map(|j| {
            let d = matrix[(a, j)] - matrix[(b, j)];
            d * d
        })
        .sum()
}

fn relabel(fit: KMeansFit) -> KMeansFit {
    let k = fit.centroids.nrows();
    let mut order: Vec<usize> = Vec::with_capacity(k);
    for &label in &fit.labels {
        if !order.contains(&label) {
            order.push(label);
        }
    }
    for c in 0..k {
        if !order.contains(&c) {
            order.push(c);
        }
    }
    let mut mapping = vec![0usize; k];
    for (new, &old) in order.iter().enumerate() {
        mapping[old] = new;
    }
    KMeansFit {
        centroids: DMatrix::from_fn(k, fit.centroids.ncols(), |c, j| fit.centroids[(order[c], j)]),
        labels: fit.labels.iter().map(|&l| mapping[l]).collect(),
        inertia: fit.inertia,
    }
}

/// How [`AutoKMeans`] scores each candidate cluster count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KSelection {
    /// Between-cluster over within-cluster dispersion, each per degree of freedom.
    #[default]
    CalinskiHarabasz,
    /// Curvature of the inertia curve. `relative` divides each strength by its `k`,
    /// penalising larger counts.
    Elbow { relative: bool },
}

/// k-means with the cluster count picked from `k_min..=k_max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoKMeans {
    pub k_min: usize,
    pub k_max: usize,
    pub seed: u64,
    pub selection: KSelection,
}

impl Default for AutoKMeans {
    fn default() -> Self {
        Self {
            k_min: 2,
            k_max: 10,
            seed: DEFAULT_SEED,
            selection: KSelection::CalinskiHarabasz,
        }
    }
}

impl AutoKMeans {
    pub fn elbow(relative: bool) -> Self {
        Self {
            selection: KSelection::Elbow { relative },
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_k(mut self, k_max: usize) -> Self {
        self.k_max = k_max;
        self
    }

    /// Candidates run up to `n - 1`; a `k_min` above that is a value error. Fewer
    /// than three rows, or rows that are all identical, give a single cluster. Ties
    /// go to the smallest `k`.
    pub fn select_k(&self, matrix: &DMatrix<f64>) -> Result<usize> {
        let n = matrix.nrows();
        if n == 0 {
            return Err(ScoutError::Value("cannot cluster zero records".to_string()));
        }
        if self.k_min > self.k_max {
            return Err(ScoutError::Config(format!(
                "k_min {} exceeds k_max {}",
                self.k_min, self.k_max
            )));
        }
        if n < 3 || all_rows_identical(matrix) {
            return Ok(1);
        }

        let lo = self.k_min.max(2);
        if lo > n - 1 {
            return Err(ScoutError::Value(format!(
                "k_min {} leaves no candidate for {n} records (at most {})",
                self.k_min,
                n - 1
            )));
        }
        let hi = self.k_max.min(n - 1);
        let candidates: Vec<usize> = (lo..=hi).collect();
        let fits = candidates
            .iter()
            .map(|&k| KMeans::new(k).with_seed(self.seed).fit(matrix))
            .collect::<Result<Vec<_>>>()?;

        let k = match self.selection {
            KSelection::CalinskiHarabasz => {
                let total = total_sum_of_squares(matrix);
                let scores: Vec<f64> = candidates
                    .iter()
                    .zip(&fits)
                    .map(|(&k, fit)| calinski_harabasz(total, fit.inertia, n, k))
                    .collect();
                candidates[first_max(&scores)]
            }
            KSelection::Elbow { relative } => {
                let inertia: Vec<f64> = fits.iter().map(|f| f.inertia).collect();
                let mut strength = elbow_strength(&inertia);
                if strength.iter().all(|s| *s <= 0.0) {
                    candidates[0]
                } else {
                    if relative {
                        for (s, &k) in strength.iter_mut().zip(&candidates) {
                            *s /= k as f64;
                        }
                    }
                    candidates[first_max(&strength)]
                }
            }
        };
        debug!(k, lo, hi, selection = ?self.selection, "selected cluster count");
        Ok(k)
    }
}

impl Estimator for AutoKMeans {
    fn name(&self) -> &str {
        match self.selection {
            KSelection::CalinskiHarabasz => "auto",
            KSelection::Elbow { .. } => "elbow",
        }
    }

    fn fit_predict(&self, matrix: &DMatrix<f64>) -> Result<Vec<usize>> {
        match self.select_k(matrix)? {
            1 => Ok(vec![0; matrix.nrows()]),
            k => KMeans::new(k).with_seed(self.seed).fit_predict(matrix),
        }
    }
}

fn all_rows_identical(matrix: &DMatrix<f64>) -> bool {
    (1..matrix.nrows()).all(|i| row_sq_dist(matrix, 0, i) == 0.0)
}

fn total_sum_of_squares(matrix: &DMatrix<f64>) -> f64 {
    let n = matrix.nrows() as f64;
    (0..matrix.ncols())
        .map(|j| {
            let col = matrix.column(j);
            let mean = col.sum() / n;
            col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
        })
        .sum()
}

fn calinski_harabasz(total: f64, within: f64, n: usize, k: usize) -> f64 {
    if k < 2 {
        return 0.0;
    }
    let between = (total - within).max(0.0);
    if within <= 1e-12 {
        return if between > 0.0 { f64::INFINITY } else { 0.0 };
    }
    (between / (k - 1) as f64) / (within / (n - k) as f64)
}

/// Second difference of the inertia curve minus its first difference, aligned so
/// entry `i` scores candidate `i`. The last candidate has no successor and scores 0.
fn elbow_strength(inertia: &[f64]) -> Vec<f64> {
    let m = inertia.len();
    let mut dx = vec![0.0; m];
    for i in 1..m {
        dx[i] = inertia[i - 1] - inertia[i];
    }
    let mut dx2 = vec![0.0; m];
    for i in 2..m {
        dx2[i] = dx[i - 1] - dx[i];
    }
    (0..m)
        .map(|i| if i + 1 < m { dx2[i + 1] - dx[i + 1] } else { 0.0 })
        .collect()
}

fn first_max(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Resolves `auto`, `elbow` or `kmeans:<k>`. `k_max` caps the automatic sweeps and
/// is ignored by a fixed `kmeans:<k>`.
pub fn builtin_estimator(name: &str, seed: u64, k_max: usize) -> Result<Box<dyn Estimator>> {
    match name.trim() {
        "auto" => Ok(Box::new(AutoKMeans::default().with_seed(seed).with_max_k(k_max))),
        "elbow" => Ok(Box::new(AutoKMeans::elbow(true).with_seed(seed).with_max_k(k_max))),
        other => {
            let k = other
                .strip_prefix("kmeans:")
                .and_then(|k| k.parse::<usize>().ok())
                .ok_or_else(|| ScoutError::Config(format!("unknown estimator '{other}'")))?;
            Ok(Box::new(KMeans::new(k).with_seed(seed)))
        }
    }
}

/// Labels records with the automatic k-means estimator.
pub fn cluster(dataset: &Dataset, columns: &[&str]) -> Result<Dataset> {
    cluster_with(dataset, columns, &AutoKMeans::default())
}

pub fn cluster_with(dataset: &Dataset, columns: &[&str], estimator: &dyn Estimator) -> Result<Dataset> {
    if dataset.is_empty() {
        return Err(ScoutError::Value("cannot cluster an empty dataset".to_string()));
    }
    if columns.is_empty() {
        return Err(ScoutError::Value("clustering needs at least one column".to_string()));
    }
    dataset.require_columns(columns)?;
    let z = standardize(&feature_matrix(dataset, columns, Imputation::Forbid)?);
    let labels = estimator.fit_predict(&z)?;
    if labels.len() != dataset.len() {
        return Err(ScoutError::Config(format!(
            "estimator '{}' returned {} labels for {} records",
            estimator.name(),
            labels.len(),
            dataset.len()
        )));
    }

    let values: Vec<Option<f64>> = labels.iter().map(|&l| Some(l as f64)).collect();
    let mut out = dataset.clone();
    out.set_column(CLUSTER_COLUMN, &values);
    Ok(out)
}
