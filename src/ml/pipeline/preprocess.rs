//! Column-wise imputation, scaling and one-hot encoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::PipelineError;
use crate::dataset::{FeatureFrame, Value};

/// Fill value used when a categorical column has no observed values.
const MISSING_CATEGORY: &str = "missing";

/// Mean-imputed, standardized numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    pub mean: f64,
    /// Population standard deviation; `1.0` for constant columns.
    pub scale: f64,
}

/// Mode-imputed, one-hot encoded categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    pub fill: String,
    /// Sorted categories seen during fit; unknown values encode as all zeros.
    pub categories: Vec<String>,
}

/// Fitted transform from raw feature rows to a dense matrix.
///
/// Output layout: numeric columns first (`num__<col>`), then one indicator per
/// category (`cat__<col>_<category>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPreprocessor {
    pub numeric: Vec<NumericColumn>,
    pub categorical: Vec<CategoricalColumn>,
}

impl ColumnPreprocessor {
    pub fn fit(
        frame: &FeatureFrame,
        numeric: &[String],
        categorical: &[String],
    ) -> Result<Self, PipelineError> {
        let numeric = numeric
            .iter()
            .map(|name| fit_numeric(frame, name))
            .collect::<Result<Vec<_>, _>>()?;
        let categorical = categorical
            .iter()
            .map(|name| fit_categorical(frame, name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            numeric,
            categorical,
        })
    }

    pub fn output_width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|column| column.categories.len())
                .sum::<usize>()
    }

    pub fn feature_names_out(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.output_width());
        for column in &self.numeric {
            names.push(format!("num__{}", column.name));
        }
        for column in &self.categorical {
            for category in &column.categories {
                names.push(format!("cat__{}_{}", column.name, category));
            }
        }
        names
    }

    pub fn transform(&self, frame: &FeatureFrame) -> Result<Vec<Vec<f64>>, PipelineError> {
        let numeric_idx = self
            .numeric
            .iter()
            .map(|column| column_position(frame, &column.name))
            .collect::<Result<Vec<_>, _>>()?;
        let categorical_idx = self
            .categorical
            .iter()
            .map(|column| column_position(frame, &column.name))
            .collect::<Result<Vec<_>, _>>()?;

        let width = self.output_width();
        let mut out = Vec::with_capacity(frame.len());
        for (row_idx, row) in frame.rows.iter().enumerate() {
            let mut dense = Vec::with_capacity(width);
            for (column, &idx) in self.numeric.iter().zip(&numeric_idx) {
                let raw = match &row[idx] {
                    Value::Number(value) => *value,
                    Value::Null => column.mean,
                    Value::Text(_) => return Err(invalid(&column.name, row_idx, "a number")),
                };
                dense.push((raw - column.mean) / column.scale);
            }
            for (column, &idx) in self.categorical.iter().zip(&categorical_idx) {
                let value = match &row[idx] {
                    Value::Text(value) => value.as_str(),
                    Value::Null => column.fill.as_str(),
                    Value::Number(_) => return Err(invalid(&column.name, row_idx, "a string")),
                };
                dense.extend(
                    column
                        .categories
                        .iter()
                        .map(|category| if category == value { 1.0 } else { 0.0 }),
                );
            }
            out.push(dense);
        }
        Ok(out)
    }
}

fn fit_numeric(frame: &FeatureFrame, name: &str) -> Result<NumericColumn, PipelineError> {
    let idx = column_position(frame, name)?;
    let mut values = Vec::with_capacity(frame.len());
    for (row_idx, row) in frame.rows.iter().enumerate() {
        match &row[idx] {
            Value::Number(value) => values.push(*value),
            Value::Null => {}
            Value::Text(_) => return Err(invalid(name, row_idx, "a number")),
        }
    }
    if values.is_empty() {
        return Ok(NumericColumn {
            name: name.to_string(),
            mean: 0.0,
            scale: 1.0,
        });
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    // Imputed cells sit at the mean, so they leave the variance sum unchanged.
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / frame.len() as f64;
    let std = variance.sqrt();
    Ok(NumericColumn {
        name: name.to_string(),
        mean,
        scale: if std > f64::EPSILON { std } else { 1.0 },
    })
}

fn fit_categorical(frame: &FeatureFrame, name: &str) -> Result<CategoricalColumn, PipelineError> {
    let idx = column_position(frame, name)?;
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (row_idx, row) in frame.rows.iter().enumerate() {
        match &row[idx] {
            Value::Text(value) => *counts.entry(value.as_str()).or_default() += 1,
            Value::Null => {}
            Value::Number(_) => return Err(invalid(name, row_idx, "a string")),
        }
    }
    // BTreeMap iterates lexically, so the first maximum wins ties.
    let fill = counts
        .iter()
        .fold(None::<(&str, usize)>, |best, (&value, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((value, count)),
        })
        .map(|(value, _)| value.to_string())
        .unwrap_or_else(|| MISSING_CATEGORY.to_string());
    let mut categories: Vec<String> = counts.keys().map(|value| value.to_string()).collect();
    if !categories.contains(&fill) {
        categories.push(fill.clone());
        categories.sort();
    }
    Ok(CategoricalColumn {
        name: name.to_string(),
        fill,
        categories,
    })
}

fn column_position(frame: &FeatureFrame, name: &str) -> Result<usize, PipelineError> {
    frame
        .column_index(name)
        .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
}

fn invalid(column: &str, row: usize, expected: &'static str) -> PipelineError {
    PipelineError::InvalidValue {
        column: column.to_string(),
        row,
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FeatureFrame {
        FeatureFrame {
            columns: vec!["age".into(), "plan".into()],
            rows: vec![
                vec![Value::Number(20.0), Value::Text("pro".into())],
                vec![Value::Number(40.0), Value::Text("basic".into())],
                vec![Value::Null, Value::Text("pro".into())],
                vec![Value::Number(30.0), Value::Null],
            ],
        }
    }

    fn fitted() -> ColumnPreprocessor {
        ColumnPreprocessor::fit(&frame(), &["age".into()], &["plan".into()]).unwrap()
    }

    #[test]
    fn learns_mean_scale_and_mode() {
        let pre = fitted();
        assert_eq!(pre.numeric[0].mean, 30.0);
        // Deviations 10, 10, 0, 0 over four rows.
        assert!((pre.numeric[0].scale - 50.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(pre.categorical[0].fill, "pro");
        assert_eq!(pre.categorical[0].categories, vec!["basic", "pro"]);
    }

    #[test]
    fn output_names_follow_layout() {
        assert_eq!(
            fitted().feature_names_out(),
            vec!["num__age", "cat__plan_basic", "cat__plan_pro"]
        );
    }

    #[test]
    fn transform_imputes_and_encodes() {
        let pre = fitted();
        let out = pre.transform(&frame()).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[2], vec![0.0, 0.0, 1.0]);
        assert_eq!(out[3], vec![0.0, 0.0, 1.0]);
        assert_eq!(out[1][1..], [1.0, 0.0]);
    }

    #[test]
    fn unknown_category_encodes_as_zeros() {
        let pre = fitted();
        let input = FeatureFrame {
            columns: vec!["age".into(), "plan".into()],
            rows: vec![vec![Value::Number(30.0), Value::Text("enterprise".into())]],
        };
        assert_eq!(pre.transform(&input).unwrap()[0], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn mode_ties_pick_lexically_smallest() {
        let frame = FeatureFrame {
            columns: vec!["region".into()],
            rows: vec![
                vec![Value::Text("na".into())],
                vec![Value::Text("eu".into())],
            ],
        };
        let pre = ColumnPreprocessor::fit(&frame, &[], &["region".into()]).unwrap();
        assert_eq!(pre.categorical[0].fill, "eu");
    }

    #[test]
    fn rejects_text_in_numeric_column() {
        let pre = fitted();
        let input = FeatureFrame {
            columns: vec!["age".into(), "plan".into()],
            rows: vec![vec![Value::Text("old".into()), Value::Null]],
        };
        assert!(matches!(
            pre.transform(&input),
            Err(PipelineError::InvalidValue { row: 0, .. })
        ));
    }
}
