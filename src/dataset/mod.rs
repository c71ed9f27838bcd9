//! Tabular dataset model shared by training and inference.

pub mod loader;
pub mod split;

use serde::{Deserialize, Serialize};

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }
}

/// Storage type inferred for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    /// Integer and floating-point columns are numeric features.
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }
}

/// Named column with a known storage type.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub values: Vec<Value>,
}

/// Column-oriented table; every column holds the same number of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: usize,
}

impl Dataset {
    /// Build a dataset, rejecting ragged or duplicated columns.
    pub fn new(columns: Vec<Column>) -> Result<Self, loader::DatasetLoadError> {
        let rows = columns.first().map(|column| column.values.len()).unwrap_or(0);
        for (idx, column) in columns.iter().enumerate() {
            if column.values.len() != rows {
                return Err(loader::DatasetLoadError::ColumnLength {
                    column: column.name.clone(),
                    expected: rows,
                    found: column.values.len(),
                });
            }
            if columns[..idx].iter().any(|prev| prev.name == column.name) {
                return Err(loader::DatasetLoadError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }
}

/// Row-major feature matrix with ordered column names.
///
/// This is the only shape a feature pipeline accepts, so the column order
/// seen at predict time is always the order the pipeline was fitted on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copy the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&idx| self.rows[idx].clone()).collect(),
        }
    }

    /// Position of `name` in the column list.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}
