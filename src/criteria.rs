use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::dataset::{Dataset, Record};
use crate::error::{Result, ScoutError};

/// Raw document form: `{"gte": {"goals": 5.0}, "lte": {"xg": 15.0}}`.
pub type CriteriaDocument = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Ne,
}

impl Comparison {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Gte => "gte",
            Comparison::Gt => "gt",
            Comparison::Lte => "lte",
            Comparison::Lt => "lt",
            Comparison::Eq => "eq",
            Comparison::Ne => "ne",
        }
    }

    /// Equality is exact, no tolerance.
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gte => value >= threshold,
            Comparison::Gt => value > threshold,
            Comparison::Lte => value <= threshold,
            Comparison::Lt => value < threshold,
            Comparison::Eq => value == threshold,
            Comparison::Ne => value != threshold,
        }
    }
}

impl FromStr for Comparison {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gte" => Ok(Comparison::Gte),
            "gt" => Ok(Comparison::Gt),
            "lte" => Ok(Comparison::Lte),
            "lt" => Ok(Comparison::Lt),
            "eq" => Ok(Comparison::Eq),
            "ne" => Ok(Comparison::Ne),
            other => Err(ScoutError::Config(format!("unknown comparison operator '{other}'"))),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub op: Comparison,
    pub stat: String,
    pub threshold: f64,
}

impl Condition {
    /// A null statistic never satisfies a condition.
    fn matches(&self, record: &Record) -> bool {
        record
            .stat(&self.stat)
            .is_some_and(|v| self.op.holds(v, self.threshold))
    }
}

/// Threshold predicates that must all hold for a record to be kept.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "CriteriaDocument")]
pub struct Criteria {
    conditions: Vec<Condition>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, op: Comparison, stat: impl Into<String>, threshold: f64) -> Self {
        self.conditions.push(Condition {
            op,
            stat: stat.into(),
            threshold,
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn from_document(doc: &CriteriaDocument) -> Result<Self> {
        let mut out = Criteria::new();
        for (op, thresholds) in doc {
            let op: Comparison = op.parse()?;
            for (stat, threshold) in thresholds {
                if !threshold.is_finite() {
                    return Err(ScoutError::Config(format!(
                        "threshold for '{op} {stat}' must be a finite number"
                    )));
                }
                out = out.with(op, stat.clone(), *threshold);
            }
        }
        Ok(out)
    }
}

impl TryFrom<CriteriaDocument> for Criteria {
    type Error = ScoutError;

    fn try_from(doc: CriteriaDocument) -> Result<Self> {
        Criteria::from_document(&doc)
    }
}

/// Rows satisfying every condition, in row order.
pub fn filter(dataset: &Dataset, criteria: &Criteria) -> Result<Dataset> {
    let stats: Vec<&str> = criteria.conditions.iter().map(|c| c.stat.as_str()).collect();
    dataset.require_columns(&stats)?;
    if criteria.is_empty() {
        return Ok(dataset.clone());
    }
    Ok(dataset.select(|r| criteria.conditions.iter().all(|c| c.matches(r))))
}
