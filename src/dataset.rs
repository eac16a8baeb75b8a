use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, ScoutError};

/// Statistic read by per-90 adjustment.
pub const MINUTES: &str = "minutes";

const DEFAULT_ID_COLUMN: &str = "player";

/// One player or team row. A statistic missing from `stats` is null.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default, deserialize_with = "nullable_stats")]
    pub stats: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_stat(mut self, name: impl Into<String>, value: f64) -> Self {
        let name = name.into();
        self.set_stat(&name, Some(value));
        self
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    pub fn stat(&self, name: &str) -> Option<f64> {
        self.stats.get(name).copied().filter(|v| v.is_finite())
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Non-finite values are stored as null.
    pub fn set_stat(&mut self, name: &str, value: Option<f64>) {
        match value.filter(|v| v.is_finite()) {
            Some(v) => {
                self.stats.insert(name.to_string(), v);
            }
            None => {
                self.stats.remove(name);
            }
        }
    }
}

fn nullable_stats<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| v.filter(|v| v.is_finite()).map(|v| (k, v)))
        .collect())
}

/// Ordered rows sharing one statistic schema.
///
/// The schema only grows: pushing a record registers any statistic or label name it
/// carries that the dataset has not seen yet, so records never hold a name that
/// `columns()` does not list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DatasetDocument")]
pub struct Dataset {
    id_column: String,
    columns: Vec<String>,
    label_columns: Vec<String>,
    records: Vec<Record>,
}

#[derive(Deserialize)]
struct DatasetDocument {
    #[serde(default = "default_id_column")]
    id_column: String,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    label_columns: Vec<String>,
    #[serde(default)]
    records: Vec<Record>,
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

impl From<DatasetDocument> for Dataset {
    fn from(doc: DatasetDocument) -> Self {
        let mut out = Dataset::with_schema(doc.id_column, doc.columns, doc.label_columns);
        for record in doc.records {
            out.push(record);
        }
        out
    }
}

impl Dataset {
    pub fn new(id_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
            columns: Vec::new(),
            label_columns: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn with_schema<C, L>(id_column: impl Into<String>, columns: C, label_columns: L) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        let mut out = Self::new(id_column);
        for c in columns {
            out.add_column(&c.into());
        }
        for l in label_columns {
            out.add_label_column(&l.into());
        }
        out
    }

    pub fn from_records(
        id_column: impl Into<String>,
        records: impl IntoIterator<Item = Record>,
    ) -> Self {
        let mut out = Self::new(id_column);
        for record in records {
            out.push(record);
        }
        out
    }

    pub fn push(&mut self, record: Record) {
        for name in record.stats.keys() {
            if !self.has_column(name) {
                self.columns.push(name.clone());
            }
        }
        for name in record.labels.keys() {
            if !self.has_label_column(name) {
                self.label_columns.push(name.clone());
            }
        }
        self.records.push(record);
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn label_columns(&self) -> &[String] {
        &self.label_columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn has_label_column(&self, name: &str) -> bool {
        self.label_columns.iter().any(|c| c == name)
    }

    pub fn require_columns(&self, columns: &[&str]) -> Result<()> {
        match columns.iter().find(|c| !self.has_column(c)) {
            Some(missing) => Err(ScoutError::unknown_column(missing)),
            None => Ok(()),
        }
    }

    pub fn require_label_columns(&self, columns: &[&str]) -> Result<()> {
        match columns.iter().find(|c| !self.has_label_column(c)) {
            Some(missing) => Err(ScoutError::Schema(format!("unknown label column '{missing}'"))),
            None => Ok(()),
        }
    }

    /// Column values in row order, `None` for nulls.
    pub fn values(&self, column: &str) -> Result<Vec<Option<f64>>> {
        self.require_columns(&[column])?;
        Ok(self.records.iter().map(|r| r.stat(column)).collect())
    }

    /// First row whose identifier equals `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    /// New dataset with the same schema holding the rows matching `predicate`.
    pub fn select<F>(&self, mut predicate: F) -> Dataset
    where
        F: FnMut(&Record) -> bool,
    {
        let records = self.records.iter().filter(|r| predicate(r)).cloned().collect();
        self.with_records(records)
    }

    pub(crate) fn with_records(&self, records: Vec<Record>) -> Dataset {
        Dataset {
            id_column: self.id_column.clone(),
            columns: self.columns.clone(),
            label_columns: self.label_columns.clone(),
            records,
        }
    }

    pub(crate) fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    pub(crate) fn add_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }

    pub(crate) fn add_label_column(&mut self, name: &str) {
        if !self.has_label_column(name) {
            self.label_columns.push(name.to_string());
        }
    }

    pub(crate) fn retain_columns<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        let dropped: Vec<String> = self.columns.iter().filter(|c| !keep(c)).cloned().collect();
        self.columns.retain(|c| keep(c));
        for record in &mut self.records {
            for name in &dropped {
                record.stats.remove(name);
            }
        }
    }

    /// Registers `name` and writes one value per row, replacing existing values.
    pub(crate) fn set_column(&mut self, name: &str, values: &[Option<f64>]) {
        debug_assert_eq!(values.len(), self.records.len());
        self.add_column(name);
        for (record, value) in self.records.iter_mut().zip(values) {
            record.set_stat(name, *value);
        }
    }
}
