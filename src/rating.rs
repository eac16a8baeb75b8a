use std::cmp::Ordering;
use std::collections::BTreeMap;

use nalgebra::DMatrix;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::dataset::Dataset;
use crate::error::{Result, ScoutError};
use crate::reduce::{Pca, Reducer, ReducerRegistry, run_reducer};
use crate::standardize::{complete_rows, rows_matrix, standardize};

pub const RATING_SUFFIX: &str = "_rating";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    HigherBetter,
    LowerBetter,
}

impl Direction {
    pub fn apply(self, v: f64) -> f64 {
        match self {
            Direction::HigherBetter => v,
            Direction::LowerBetter => -v,
        }
    }

    fn from_sign(sign: f64) -> Result<Self> {
        if sign == 1.0 {
            Ok(Direction::HigherBetter)
        } else if sign == -1.0 {
            Ok(Direction::LowerBetter)
        } else {
            Err(ScoutError::Config(format!("direction must be 1 or -1 (got {sign})")))
        }
    }
}

/// A PCA target dimension or the name of a registered reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReducerSpec {
    Dims(usize),
    Named(String),
}

impl Default for ReducerSpec {
    fn default() -> Self {
        ReducerSpec::Dims(1)
    }
}

impl ReducerSpec {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(|d| ReducerSpec::Dims(d as usize)),
            Value::String(name) => Some(ReducerSpec::Named(name.clone())),
            _ => None,
        }
    }
}

/// Statistics combined into one rating.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingGroup {
    stats: Vec<String>,
    directions: Vec<Direction>,
    reducer: ReducerSpec,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FullGroupDocument {
    stats: Value,
    #[serde(default)]
    direction: Option<Value>,
    #[serde(default)]
    reducer: Option<Value>,
}

fn parse_field<T: DeserializeOwned>(rating: &str, field: &str, value: &Value) -> Result<T> {
    T::deserialize(value)
        .map_err(|e| ScoutError::Config(format!("rating '{rating}': invalid `{field}`: {e}")))
}

impl RatingGroup {
    /// Every statistic higher-is-better, reduced by one-dimensional PCA.
    pub fn new<I>(stats: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let stats: Vec<String> = stats.into_iter().map(Into::into).collect();
        Self {
            directions: vec![Direction::HigherBetter; stats.len()],
            stats,
            reducer: ReducerSpec::default(),
        }
    }

    /// Marks `stat` lower-is-better; names not in the group are ignored.
    pub fn lower_better(mut self, stat: &str) -> Self {
        if let Some(i) = self.stats.iter().position(|s| s == stat) {
            self.directions[i] = Direction::LowerBetter;
        }
        self
    }

    pub fn with_reducer(mut self, reducer: ReducerSpec) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn stats(&self) -> &[String] {
        &self.stats
    }

    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    pub fn reducer(&self) -> &ReducerSpec {
        &self.reducer
    }

    /// Accepts `["stat", ...]` or `{"stats": [...], "direction": [1, -1], "reducer": 1 | "name"}`.
    /// `rating` only labels error messages.
    pub fn from_document(rating: &str, doc: &Value) -> Result<Self> {
        let group = match doc {
            Value::Array(_) => RatingGroup::new(parse_field::<Vec<String>>(rating, "stats", doc)?),
            Value::Object(_) => {
                let full = FullGroupDocument::deserialize(doc)
                    .map_err(|e| ScoutError::Config(format!("rating '{rating}': {e}")))?;
                let stats: Vec<String> = parse_field(rating, "stats", &full.stats)?;
                let directions = match &full.direction {
                    Some(signs) => parse_field::<Vec<f64>>(rating, "direction", signs)?
                        .into_iter()
                        .map(Direction::from_sign)
                        .collect::<Result<Vec<_>>>()?,
                    None => vec![Direction::HigherBetter; stats.len()],
                };
                let reducer = match &full.reducer {
                    Some(value) => ReducerSpec::from_value(value).ok_or_else(|| {
                        ScoutError::Config(format!(
                            "rating '{rating}': invalid `reducer`: expected a positive integer or a reducer name, got {value}"
                        ))
                    })?,
                    None => ReducerSpec::default(),
                };
                RatingGroup {
                    stats,
                    directions,
                    reducer,
                }
            }
            other => {
                return Err(ScoutError::Config(format!(
                    "rating '{rating}' must be a list of stats or an object, got {other}"
                )));
            }
        };
        group.validate()?;
        Ok(group)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stats.is_empty() {
            return Err(ScoutError::Config("rating needs at least one stat".to_string()));
        }
        if self.directions.len() != self.stats.len() {
            return Err(ScoutError::Config(format!(
                "{} directions given for {} stats",
                self.directions.len(),
                self.stats.len()
            )));
        }
        if let ReducerSpec::Dims(d) = self.reducer {
            if d == 0 || d > self.stats.len() {
                return Err(ScoutError::Config(format!(
                    "reducer dimension must be within 1..={} (got {d})",
                    self.stats.len()
                )));
            }
        }
        Ok(())
    }
}

/// Rating name → statistic group, e.g.
/// `{"attack": ["goals", "xg"], "defense": {"stats": ["tackles", "fouls"], "direction": [1, -1]}}`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "Value")]
pub struct RatingConfig {
    groups: BTreeMap<String, RatingGroup>,
}

impl RatingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, group: RatingGroup) -> Self {
        self.groups.insert(name.into(), group);
        self
    }

    pub fn groups(&self) -> &BTreeMap<String, RatingGroup> {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn from_document(doc: &Value) -> Result<Self> {
        let Value::Object(map) = doc else {
            return Err(ScoutError::Config(format!(
                "rating config must map rating names to groups, got {doc}"
            )));
        };
        let mut config = RatingConfig::new();
        for (name, group) in map {
            config = config.with(name.clone(), RatingGroup::from_document(name, group)?);
        }
        Ok(config)
    }
}

impl TryFrom<Value> for RatingConfig {
    type Error = ScoutError;

    fn try_from(doc: Value) -> Result<Self> {
        RatingConfig::from_document(&doc)
    }
}

struct Plan<'a> {
    column: String,
    group: &'a RatingGroup,
    stats: Vec<&'a str>,
    reducer: &'a dyn Reducer,
    dims: usize,
}

/// Adds a `<name>_rating` column per group with the built-in reducers.
pub fn estimate_style_ratings(dataset: &Dataset, config: &RatingConfig) -> Result<Dataset> {
    estimate_style_ratings_with(dataset, config, &ReducerRegistry::default())
}

/// Ratings are percentile ranks in `[0, 100]` among the records that have every
/// statistic of the group; the rest get null.
pub fn estimate_style_ratings_with(
    dataset: &Dataset,
    config: &RatingConfig,
    registry: &ReducerRegistry,
) -> Result<Dataset> {
    let mut plans = Vec::with_capacity(config.groups.len());
    for (name, group) in &config.groups {
        group.validate()?;
        let stats: Vec<&str> = group.stats.iter().map(String::as_str).collect();
        dataset.require_columns(&stats)?;
        let (reducer, dims): (&dyn Reducer, usize) = match &group.reducer {
            ReducerSpec::Dims(d) => (&Pca as &dyn Reducer, *d),
            ReducerSpec::Named(reducer) => (registry.get(reducer)?, 1),
        };
        plans.push(Plan {
            column: format!("{name}{RATING_SUFFIX}"),
            group,
            stats,
            reducer,
            dims,
        });
    }

    let mut out = dataset.clone();
    for plan in plans {
        let values = rate_group(dataset, &plan)?;
        out.set_column(&plan.column, &values);
    }
    Ok(out)
}

fn rate_group(dataset: &Dataset, plan: &Plan<'_>) -> Result<Vec<Option<f64>>> {
    let rows = complete_rows(dataset, &plan.stats);
    let unrated = dataset.len() - rows.len();
    if unrated > 0 {
        warn!(rating = %plan.column, unrated, "records missing rating stats left unrated");
    }
    let mut values = vec![None; dataset.len()];
    if rows.is_empty() {
        return Ok(values);
    }

    let raw = rows_matrix(dataset, &plan.stats, &rows);
    let directed = DMatrix::from_fn(raw.nrows(), raw.ncols(), |i, j| {
        plan.group.directions[j].apply(raw[(i, j)])
    });
    let z = standardize(&directed);
    let reduced = run_reducer(plan.reducer, &z, plan.dims)?;
    let mut scores: Vec<f64> = reduced.column(0).iter().copied().collect();
    orient(&mut scores, &z);
    debug!(rating = %plan.column, reducer = plan.reducer.name(), rated = rows.len(), "rating scored");

    for (row, pct) in rows.iter().zip(percentile_ranks(&scores)) {
        values[*row] = Some(pct);
    }
    Ok(values)
}

/// Flips `scores` when they run against the summed directed z-scores, so a higher
/// rating always means more of the trait.
fn orient(scores: &mut [f64], z: &DMatrix<f64>) {
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let covariance: f64 = scores
        .iter()
        .enumerate()
        .map(|(i, s)| (s - mean) * z.row(i).sum())
        .sum();
    if covariance < 0.0 {
        for s in scores.iter_mut() {
            *s = -*s;
        }
    }
}

/// `(rank - 1) / (n - 1) * 100` with tied scores sharing their average rank.
fn percentile_ranks(scores: &[f64]) -> Vec<f64> {
    let n = scores.len();
    if n == 1 {
        return vec![50.0];
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut out = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && scores[order[end]].total_cmp(&scores[order[start]]) == Ordering::Equal {
            end += 1;
        }
        // 1-based ranks start+1..=end average to this.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            out[i] = (avg_rank - 1.0) / (n - 1) as f64 * 100.0;
        }
        start = end;
    }
    out
}
