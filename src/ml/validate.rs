//! Prediction-time validation of incoming records against the active schema.
//!
//! Validation never stops at the first problem: every violation in the batch
//! is collected into one [`ValidationReport`].

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value as Json};

use crate::dataset::{FeatureFrame, Value};
use crate::ml::schema::Schema;

/// Kind a feature expects, as reported in type mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedKind {
    Number,
    String,
}

impl fmt::Display for ExpectedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedKind::Number => f.write_str("number"),
            ExpectedKind::String => f.write_str("string"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub record: usize,
    pub feature: String,
    pub expected: ExpectedKind,
    /// JSON kind actually supplied (`"string"`, `"bool"`, ...).
    pub found: &'static str,
}

/// Every violation found in a prediction batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub empty_batch: bool,
    /// Indices of records that are not JSON objects.
    pub malformed_records: Vec<usize>,
    /// Schema features absent from at least one record, in schema order.
    pub missing_columns: Vec<String>,
    /// Keys outside the schema, sorted.
    pub unexpected_columns: Vec<String>,
    pub type_mismatches: Vec<TypeMismatch>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        !self.empty_batch
            && self.malformed_records.is_empty()
            && self.missing_columns.is_empty()
            && self.unexpected_columns.is_empty()
            && self.type_mismatches.is_empty()
    }

    /// One human-readable line per violation group or mismatch.
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.empty_batch {
            out.push("records must not be empty".to_string());
        }
        if !self.malformed_records.is_empty() {
            out.push(format!(
                "Invalid records format: records {:?} are not objects",
                self.malformed_records
            ));
        }
        if !self.missing_columns.is_empty() {
            out.push(format!("Missing columns: {:?}", self.missing_columns));
        }
        if !self.unexpected_columns.is_empty() {
            out.push(format!("Unexpected columns: {:?}", self.unexpected_columns));
        }
        for mismatch in &self.type_mismatches {
            out.push(format!(
                "Type mismatch: record {} field '{}' expected {}, found {}",
                mismatch.record, mismatch.feature, mismatch.expected, mismatch.found
            ));
        }
        out
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for ValidationReport {}

/// Check `records` against `schema` and reorder them into schema column order.
pub fn validate(records: &[Json], schema: &Schema) -> Result<FeatureFrame, ValidationReport> {
    let mut report = ValidationReport {
        empty_batch: records.is_empty(),
        ..ValidationReport::default()
    };
    let mut missing: BTreeSet<&str> = BTreeSet::new();
    let mut unexpected: BTreeSet<String> = BTreeSet::new();
    let mut objects: Vec<&Map<String, Json>> = Vec::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        let Some(object) = record.as_object() else {
            report.malformed_records.push(idx);
            continue;
        };
        for feature in &schema.feature_names {
            match object.get(feature) {
                None => {
                    missing.insert(feature.as_str());
                }
                Some(value) => {
                    if let Some(mismatch) = check_type(idx, feature, value, schema) {
                        report.type_mismatches.push(mismatch);
                    }
                }
            }
        }
        unexpected.extend(
            object
                .keys()
                .filter(|key| !schema.feature_names.contains(key))
                .cloned(),
        );
        objects.push(object);
    }

    report.missing_columns = schema
        .feature_names
        .iter()
        .filter(|name| missing.contains(name.as_str()))
        .cloned()
        .collect();
    report.unexpected_columns = unexpected.into_iter().collect();
    if !report.is_empty() {
        return Err(report);
    }

    let rows = objects
        .into_iter()
        .map(|object| {
            schema
                .feature_names
                .iter()
                .map(|feature| to_value(&object[feature]))
                .collect()
        })
        .collect();
    Ok(FeatureFrame {
        columns: schema.feature_names.clone(),
        rows,
    })
}

fn check_type(record: usize, feature: &str, value: &Json, schema: &Schema) -> Option<TypeMismatch> {
    let expected = if schema.is_numeric(feature) {
        ExpectedKind::Number
    } else {
        ExpectedKind::String
    };
    let ok = match (expected, value) {
        (_, Json::Null) => true,
        (ExpectedKind::Number, Json::Number(_)) => true,
        (ExpectedKind::String, Json::String(_)) => true,
        _ => false,
    };
    (!ok).then(|| TypeMismatch {
        record,
        feature: feature.to_string(),
        expected,
        found: json_kind(value),
    })
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn to_value(value: &Json) -> Value {
    match value {
        Json::Number(number) => number.as_f64().map(Value::Number).unwrap_or(Value::Null),
        Json::String(text) => Value::Text(text.clone()),
        _ => Value::Null,
    }
}
