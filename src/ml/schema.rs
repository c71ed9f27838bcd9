//! Schema derivation from a labeled dataset.
//!
//! The split into numeric and categorical features is purely type-based:
//! integer and float columns are numeric, everything else is categorical
//! regardless of cardinality.

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, FeatureFrame, Value};
use crate::ml::error::MlError;

/// Feature/target structure captured at training time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Original feature columns in dataset order, target excluded.
    pub feature_names: Vec<String>,
    pub numeric_features: Vec<String>,
    pub categorical_features: Vec<String>,
    pub target: String,
    /// Rows in the dataset before the train/test split.
    pub row_count: usize,
}

impl Schema {
    /// Check that every feature sits in exactly one group and the target is not a feature.
    pub fn validate(&self) -> Result<(), String> {
        if self.feature_names.iter().any(|name| name == &self.target) {
            return Err(format!("target '{}' listed as a feature", self.target));
        }
        for name in &self.feature_names {
            let numeric = self.numeric_features.contains(name);
            let categorical = self.categorical_features.contains(name);
            if numeric == categorical {
                return Err(format!(
                    "feature '{name}' must be exactly one of numeric or categorical"
                ));
            }
        }
        let grouped = self.numeric_features.len() + self.categorical_features.len();
        if grouped != self.feature_names.len() {
            return Err("feature groups do not match feature_names".to_string());
        }
        Ok(())
    }

    pub fn is_numeric(&self, feature: &str) -> bool {
        self.numeric_features.iter().any(|name| name == feature)
    }
}

/// Schema plus the separated feature matrix and label vector.
#[derive(Debug, Clone)]
pub struct DerivedData {
    pub schema: Schema,
    pub features: FeatureFrame,
    pub labels: Vec<u8>,
}

/// Derive the schema for `target` and separate features from labels.
pub fn derive(dataset: &Dataset, target: &str) -> Result<DerivedData, MlError> {
    let target_column = dataset
        .column(target)
        .ok_or_else(|| MlError::TargetNotFound {
            target: target.to_string(),
            available: dataset.column_names(),
        })?;
    let labels = binary_labels(target, &target_column.values)?;

    let mut feature_names = Vec::new();
    let mut numeric_features = Vec::new();
    let mut categorical_features = Vec::new();
    let mut feature_columns = Vec::new();
    for column in dataset.columns().iter().filter(|c| c.name != target) {
        feature_names.push(column.name.clone());
        if column.kind.is_numeric() {
            numeric_features.push(column.name.clone());
        } else {
            categorical_features.push(column.name.clone());
        }
        feature_columns.push(&column.values);
    }

    let rows = (0..dataset.row_count())
        .map(|row| feature_columns.iter().map(|values| values[row].clone()).collect())
        .collect();

    Ok(DerivedData {
        schema: Schema {
            feature_names: feature_names.clone(),
            numeric_features,
            categorical_features,
            target: target.to_string(),
            row_count: dataset.row_count(),
        },
        features: FeatureFrame {
            columns: feature_names,
            rows,
        },
        labels,
    })
}

fn binary_labels(target: &str, values: &[Value]) -> Result<Vec<u8>, MlError> {
    values
        .iter()
        .enumerate()
        .map(|(row, value)| match value.as_number() {
            Some(v) if v == 0.0 => Ok(0),
            Some(v) if v == 1.0 => Ok(1),
            _ => Err(MlError::NonBinaryTarget {
                target: target.to_string(),
                detail: format!("row {row} holds {value:?}"),
            }),
        })
        .collect()
}
