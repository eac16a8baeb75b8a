use std::collections::BTreeMap;

use tracing::debug;

use crate::dataset::{Dataset, MINUTES, Record};
use crate::error::{Result, ScoutError};

/// Stat names grouped by category, e.g. `"shooting" -> ["shots", "xg"]`.
pub type StatCategories = BTreeMap<String, Vec<String>>;

/// Stacks datasets from several sources (competitions, seasons) into one.
///
/// Statistic and label schemas are outer-unioned in first-seen order; a record keeps
/// only the statistics it had, so columns it never carried read as null.
pub fn combine(datasets: &[Dataset]) -> Result<Dataset> {
    let Some(first) = datasets.first() else {
        return Err(ScoutError::Value("no datasets to combine".to_string()));
    };

    let mut out = Dataset::new(first.id_column());
    for ds in datasets {
        if ds.id_column() != first.id_column() {
            return Err(ScoutError::Schema(format!(
                "cannot combine datasets keyed by '{}' and '{}'",
                first.id_column(),
                ds.id_column()
            )));
        }
        for c in ds.columns() {
            out.add_column(c);
        }
        for l in ds.label_columns() {
            out.add_label_column(l);
        }
    }
    for ds in datasets {
        for record in ds.iter() {
            out.push(record.clone());
        }
    }
    Ok(out)
}

/// Tags every row with a categorical marker, e.g. the competition it came from.
pub fn with_label(dataset: &Dataset, column: &str, value: &str) -> Dataset {
    let mut out = dataset.clone();
    out.add_label_column(column);
    for record in out.records_mut() {
        record.labels.insert(column.to_string(), value.to_string());
    }
    out
}

pub fn select_label(dataset: &Dataset, column: &str, value: &str) -> Result<Dataset> {
    dataset.require_label_columns(&[column])?;
    Ok(dataset.select(|r| r.label(column) == Some(value)))
}

/// Rescales cumulative statistics to their per-90-minutes rate.
///
/// Rows whose `minutes` is null, zero or negative cannot be rated and get null for
/// every target column.
pub fn adjust_per_90(dataset: &Dataset, columns: &[&str]) -> Result<Dataset> {
    if !dataset.has_column(MINUTES) {
        return Err(ScoutError::Schema(format!(
            "per-90 adjustment needs a '{MINUTES}' column"
        )));
    }
    dataset.require_columns(columns)?;

    let mut out = dataset.clone();
    let mut nulled = 0usize;
    for record in out.records_mut() {
        let minutes = record.stat(MINUTES).filter(|m| *m > 0.0);
        if minutes.is_none() {
            nulled += 1;
        }
        for column in columns {
            let adjusted = match (record.stat(column), minutes) {
                (Some(v), Some(m)) => Some(v * 90.0 / m),
                _ => None,
            };
            record.set_stat(column, adjusted);
        }
    }
    if nulled > 0 {
        debug!(rows = nulled, "per-90 adjustment nulled rows without positive minutes");
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollingReduction {
    #[default]
    Mean,
    Sum,
}

impl RollingReduction {
    fn suffix(self) -> &'static str {
        match self {
            RollingReduction::Mean => "mean",
            RollingReduction::Sum => "sum",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingOptions {
    pub window: usize,
    /// Minimum non-null values inside the window; fewer yields null.
    pub min_periods: usize,
    pub reduction: RollingReduction,
    /// Drop rows where any new rolling column is null.
    pub drop_incomplete: bool,
}

impl RollingOptions {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            min_periods: 1,
            reduction: RollingReduction::Mean,
            drop_incomplete: false,
        }
    }
}

/// Trailing moving mean, named `<column>_roll_mean`.
pub fn rolling(dataset: &Dataset, columns: &[&str], window: usize) -> Result<Dataset> {
    rolling_with(dataset, columns, &RollingOptions::new(window))
}

/// Trailing window aggregate over the row order, which is assumed chronological.
///
/// The first `window - 1` rows aggregate over the rows available so far.
pub fn rolling_with(dataset: &Dataset, columns: &[&str], opts: &RollingOptions) -> Result<Dataset> {
    if opts.window == 0 {
        return Err(ScoutError::Value("rolling window must be at least 1".to_string()));
    }
    if opts.min_periods == 0 || opts.min_periods > opts.window {
        return Err(ScoutError::Value(format!(
            "min_periods must be within 1..={} (got {})",
            opts.window, opts.min_periods
        )));
    }
    dataset.require_columns(columns)?;

    let mut out = dataset.clone();
    let mut new_columns = Vec::with_capacity(columns.len());
    for column in columns {
        let values = dataset.values(column)?;
        let rolled: Vec<Option<f64>> = (0..values.len())
            .map(|end| {
                let start = (end + 1).saturating_sub(opts.window);
                let window: Vec<f64> = values[start..=end].iter().flatten().copied().collect();
                if window.len() < opts.min_periods {
                    return None;
                }
                let sum = window.iter().sum::<f64>();
                Some(match opts.reduction {
                    RollingReduction::Mean => sum / window.len() as f64,
                    RollingReduction::Sum => sum,
                })
            })
            .collect();
        let name = format!("{}_roll_{}", column, opts.reduction.suffix());
        out.set_column(&name, &rolled);
        new_columns.push(name);
    }

    if opts.drop_incomplete {
        out = out.select(|r| new_columns.iter().all(|c| r.stat(c).is_some()));
    }
    Ok(out)
}

/// Clamps each column into its `[alpha, 1 - alpha]` quantile range.
pub fn clamp_by_percentiles(dataset: &Dataset, columns: &[&str], alpha: f64) -> Result<Dataset> {
    if !(0.0..=0.5).contains(&alpha) {
        return Err(ScoutError::Value(format!(
            "clamp alpha must be within [0, 0.5] (got {alpha})"
        )));
    }
    dataset.require_columns(columns)?;

    let mut out = dataset.clone();
    for column in columns {
        let mut present: Vec<f64> = dataset.values(column)?.into_iter().flatten().collect();
        if present.is_empty() {
            continue;
        }
        present.sort_by(f64::total_cmp);
        let lo = quantile(&present, alpha);
        let hi = quantile(&present, 1.0 - alpha);
        for record in out.records_mut() {
            if let Some(v) = record.stat(column) {
                record.set_stat(column, Some(v.clamp(lo, hi)));
            }
        }
    }
    Ok(out)
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub const POSSESSION: &str = "possession";

/// Multiplier for defensive stats given the team's possession share (0-100).
///
/// Above 50% a team has fewer chances to defend, so the stat is scaled up; the
/// factor is 1 at 50% and bounded by (0, 2).
pub fn possession_factor(possession: f64) -> f64 {
    let exp = (-0.1 * (possession - 50.0)).exp();
    2.0 / (1.0 + exp)
}

/// Adjusts match-level player stats for their team's possession in that match.
///
/// A player row is matched to the team row with the same `date` label whose
/// identifier equals the player's `squad` label. Adjusted values land in new
/// `padj_<column>` columns.
pub fn adjust_possession(players: &Dataset, teams: &Dataset, columns: &[&str]) -> Result<Dataset> {
    players.require_columns(columns)?;
    players.require_label_columns(&["date", "squad"])?;
    teams.require_label_columns(&["date"])?;
    teams.require_columns(&[POSSESSION])?;

    let mut by_match: BTreeMap<(&str, &str), &Record> = BTreeMap::new();
    for team in teams.iter() {
        if let Some(date) = team.label("date") {
            by_match.entry((team.id.as_str(), date)).or_insert(team);
        }
    }

    let mut factors = Vec::with_capacity(players.len());
    for player in players.iter() {
        let key = (player.label("squad").unwrap_or(""), player.label("date").unwrap_or(""));
        let Some(team) = by_match.get(&key) else {
            return Err(ScoutError::DataQuality(format!(
                "no team match for '{}' ({} on {})",
                player.id, key.0, key.1
            )));
        };
        let Some(p) = team.stat(POSSESSION) else {
            return Err(ScoutError::DataQuality(format!(
                "null {POSSESSION} for '{}' on {}",
                team.id, key.1
            )));
        };
        factors.push(possession_factor(p));
    }

    let mut out = players.clone();
    for column in columns {
        let adjusted: Vec<Option<f64>> = players
            .iter()
            .zip(&factors)
            .map(|(r, f)| r.stat(column).map(|v| v * f))
            .collect();
        out.set_column(&format!("padj_{column}"), &adjusted);
    }
    Ok(out)
}

/// Keeps (`retain`) or drops the statistics belonging to `categories`.
pub fn select_categories(
    dataset: &Dataset,
    config: &StatCategories,
    categories: &[&str],
    retain: bool,
) -> Result<Dataset> {
    let mut stats: Vec<&str> = Vec::new();
    for name in categories {
        let Some(members) = config.get(*name) else {
            return Err(ScoutError::Config(format!("unknown stat category '{name}'")));
        };
        stats.extend(members.iter().map(String::as_str));
    }
    dataset.require_columns(&stats)?;

    let mut out = dataset.clone();
    out.retain_columns(|c| stats.iter().any(|s| *s == c) == retain);
    Ok(out)
}
