//! Dataset sources and CSV loading with per-column type inference.

use csv::{ReaderBuilder, Trim};
use thiserror::Error;

use super::{Column, ColumnKind, Dataset, Value};

/// Bundled demo churn dataset.
const DEMO_CSV: &str = include_str!("../../assets/data/demo_churn.csv");

/// Cell spellings read as a missing value.
const MISSING_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Error)]
pub enum DatasetLoadError {
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset has no header row")]
    MissingHeader,
    #[error("header contains an empty column name at position {0}")]
    EmptyColumnName(usize),
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
    #[error("line {line}: expected {expected} cells, found {found}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("column {column} has {found} values (expected {expected})")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("column {column}, row {row}: {value} is not a finite number")]
    NonFinite {
        column: String,
        row: usize,
        value: String,
    },
}

/// Where a training dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    /// The fixed dataset bundled with the binary.
    Demo,
    /// Recognized but not implemented.
    Upload,
}

impl DatasetSource {
    /// Resolve a source name; `Err` carries the unrecognized name.
    pub fn parse(name: &str) -> Result<Self, String> {
        match name {
            "demo" => Ok(Self::Demo),
            "upload" => Ok(Self::Upload),
            other => Err(other.to_string()),
        }
    }
}

/// Load the bundled demo dataset.
pub fn load_demo() -> Result<Dataset, DatasetLoadError> {
    parse_csv(DEMO_CSV)
}

/// Parse CSV text with a header row.
///
/// Quoted cells may contain commas. Empty cells and the usual NA spellings
/// (`NA`, `NaN`, `null`, ...) are missing values. A column whose present cells
/// all parse as integers is `Integer`, else all floats is `Float`, else `Text`.
/// A column with no present cells is `Float`. Infinite numbers are rejected.
pub fn parse_csv(text: &str) -> Result<Dataset, DatasetLoadError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if names.is_empty() {
        return Err(DatasetLoadError::MissingHeader);
    }
    if let Some(pos) = names.iter().position(|name| name.is_empty()) {
        return Err(DatasetLoadError::EmptyColumnName(pos));
    }

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    for record in reader.records() {
        let record = record?;
        if record.len() != names.len() {
            return Err(DatasetLoadError::RaggedRow {
                line: record.position().map(|pos| pos.line()).unwrap_or(0),
                expected: names.len(),
                found: record.len(),
            });
        }
        for (column, cell) in raw.iter_mut().zip(record.iter()) {
            column.push(if MISSING_TOKENS.contains(&cell) {
                None
            } else {
                Some(cell.to_string())
            });
        }
    }

    let columns = names
        .into_iter()
        .zip(raw)
        .map(|(name, cells)| typed_column(name, &cells))
        .collect::<Result<Vec<_>, _>>()?;
    Dataset::new(columns)
}

fn typed_column(name: String, cells: &[Option<String>]) -> Result<Column, DatasetLoadError> {
    let kind = infer_kind(cells);
    let mut values = Vec::with_capacity(cells.len());
    for (row, cell) in cells.iter().enumerate() {
        let value = match (cell, kind) {
            (None, _) => Value::Null,
            (Some(text), ColumnKind::Text) => Value::Text(text.clone()),
            (Some(text), _) => match text.parse::<f64>() {
                Ok(number) if number.is_finite() => Value::Number(number),
                _ => {
                    return Err(DatasetLoadError::NonFinite {
                        column: name,
                        row,
                        value: text.clone(),
                    });
                }
            },
        };
        values.push(value);
    }
    Ok(Column { name, kind, values })
}

fn infer_kind(cells: &[Option<String>]) -> ColumnKind {
    let present: Vec<&str> = cells.iter().flatten().map(String::as_str).collect();
    if present.iter().all(|cell| cell.parse::<i64>().is_ok()) && !present.is_empty() {
        ColumnKind::Integer
    } else if present.iter().all(|cell| cell.parse::<f64>().is_ok()) {
        ColumnKind::Float
    } else {
        ColumnKind::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_column_kinds() {
        let dataset = parse_csv("age,plan,score,churn\n31,basic,0.5,0\n,pro,1,1\n").unwrap();
        let kinds: Vec<ColumnKind> = dataset.columns().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ColumnKind::Integer,
                ColumnKind::Text,
                ColumnKind::Float,
                ColumnKind::Integer
            ]
        );
        assert_eq!(dataset.row_count(), 2);
        assert_eq!(dataset.column("age").unwrap().values[1], Value::Null);
        assert_eq!(
            dataset.column("plan").unwrap().values[0],
            Value::Text("basic".into())
        );
    }

    #[test]
    fn all_missing_column_is_float() {
        let dataset = parse_csv("a,b\n,1\n,2\n").unwrap();
        assert_eq!(dataset.column("a").unwrap().kind, ColumnKind::Float);
    }

    #[test]
    fn ragged_row_reports_line() {
        let err = parse_csv("a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(
            err,
            DatasetLoadError::RaggedRow {
                line: 3,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn quoted_cells_keep_embedded_commas() {
        let dataset = parse_csv("city,y\n\"New York, NY\",1\n\"Austin, TX\",0\n").unwrap();
        assert_eq!(dataset.row_count(), 2);
        assert_eq!(
            dataset.column("city").unwrap().values,
            vec![Value::Text("New York, NY".into()), Value::Text("Austin, TX".into())]
        );
        assert_eq!(dataset.column("y").unwrap().kind, ColumnKind::Integer);
    }

    #[test]
    fn na_spellings_are_missing() {
        let dataset = parse_csv("age,plan,churn\n30,basic,0\nNaN,pro,1\n41,NA,0\nnull,,1\n").unwrap();
        let age = dataset.column("age").unwrap();
        assert_eq!(age.kind, ColumnKind::Integer);
        assert_eq!(age.values[1], Value::Null);
        assert_eq!(age.values[3], Value::Null);
        assert!(age.values.iter().flat_map(Value::as_number).all(f64::is_finite));
        let plan = dataset.column("plan").unwrap();
        assert_eq!(plan.values[2], Value::Null);
        assert_eq!(plan.values[3], Value::Null);
    }

    #[test]
    fn infinite_numbers_are_rejected() {
        let err = parse_csv("spend,churn\n1.5,0\ninf,1\n").unwrap_err();
        match err {
            DatasetLoadError::NonFinite { column, row, value } => {
                assert_eq!(column, "spend");
                assert_eq!(row, 1);
                assert_eq!(value, "inf");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_text_has_no_header() {
        assert!(matches!(parse_csv("\n\n"), Err(DatasetLoadError::MissingHeader)));
    }

    #[test]
    fn demo_dataset_has_expected_shape() {
        let dataset = load_demo().unwrap();
        assert_eq!(
            dataset.column_names(),
            vec![
                "age",
                "tenure_months",
                "monthly_spend",
                "support_tickets_last_90d",
                "plan",
                "region",
                "churn"
            ]
        );
        assert_eq!(dataset.row_count(), 400);
        assert_eq!(dataset.column("plan").unwrap().kind, ColumnKind::Text);
        assert_eq!(dataset.column("monthly_spend").unwrap().kind, ColumnKind::Float);
        assert_eq!(dataset.column("churn").unwrap().kind, ColumnKind::Integer);
    }

    #[test]
    fn source_names_resolve() {
        assert_eq!(DatasetSource::parse("demo"), Ok(DatasetSource::Demo));
        assert_eq!(DatasetSource::parse("upload"), Ok(DatasetSource::Upload));
        assert_eq!(DatasetSource::parse("s3"), Err("s3".to_string()));
    }
}
