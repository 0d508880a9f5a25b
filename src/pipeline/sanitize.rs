use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{ColumnKind, Dataset, Value};

static LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\n\r]+").expect("valid line break pattern"));
static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Counters produced by a sanitization pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SanitizeReport {
    pub columns_sanitized: Vec<String>,
    pub values_changed: usize,
    pub values_nulled: usize,
    /// Values of an unexpected type left untouched
    pub anomalies: usize,
}

/// Normalize one free-text value. Returns `None` when nothing but whitespace remains.
pub fn sanitize_text(raw: &str) -> Option<String> {
    let joined = LINE_BREAKS.replace_all(raw, " ");
    let collapsed = WHITESPACE_RUNS.replace_all(joined.trim(), " ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.into_owned())
    }
}

/// Sanitized form of a cell; numbers pass through.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Text(s) => sanitize_text(s).map(Value::Text).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Sanitize every column that can hold free text.
///
/// `text` columns are always sanitized; `natural` columns only when they hold at least
/// one text value. A number found in a `text` column is counted as an anomaly and kept.
pub fn sanitize(mut dataset: Dataset) -> (Dataset, SanitizeReport) {
    let mut report = SanitizeReport::default();

    let targets: Vec<(String, ColumnKind)> = dataset
        .schema
        .columns()
        .iter()
        .filter(|c| {
            c.kind == ColumnKind::Text
                || dataset
                    .records
                    .iter()
                    .any(|r| matches!(r.get(&c.name), Value::Text(_)))
        })
        .map(|c| (c.name.clone(), c.kind))
        .collect();

    for (column, kind) in &targets {
        let mut anomalies = 0;
        for record in dataset.records.iter_mut() {
            let Some(value) = record.get_mut(column) else {
                continue;
            };
            match value {
                Value::Text(s) => match sanitize_text(s) {
                    Some(clean) if clean == *s => {}
                    Some(clean) => {
                        *s = clean;
                        report.values_changed += 1;
                    }
                    None => {
                        *value = Value::Null;
                        report.values_changed += 1;
                        report.values_nulled += 1;
                    }
                },
                Value::Number(_) if *kind == ColumnKind::Text => anomalies += 1,
                Value::Number(_) | Value::Null => {}
            }
        }
        if anomalies > 0 {
            warn!("Column '{}' holds {} numeric value(s) in a text column; left as-is", column, anomalies);
            report.anomalies += anomalies;
        }
        report.columns_sanitized.push(column.clone());
    }

    debug!(
        "Sanitized {} column(s): {} value(s) changed, {} emptied",
        report.columns_sanitized.len(),
        report.values_changed,
        report.values_nulled
    );

    (dataset, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, Record, Schema};

    fn dataset(rows: Vec<Value>, kind: ColumnKind) -> Dataset {
        let mut ds = Dataset::new(Schema::from_columns([Column::new("nome", kind)]));
        for v in rows {
            ds.push(Record::new().with("nome", v));
        }
        ds
    }

    #[test]
    fn test_sanitize_text_collapses_whitespace_and_line_breaks() {
        assert_eq!(sanitize_text("  João   Silva\n").as_deref(), Some("João Silva"));
        assert_eq!(sanitize_text("Rua A\r\n\r\nNº 10").as_deref(), Some("Rua A Nº 10"));
        assert_eq!(sanitize_text("a\t\tb").as_deref(), Some("a b"));
        assert_eq!(sanitize_text(" \n\r "), None);
        assert_eq!(sanitize_text(""), None);
    }

    #[test]
    fn test_empty_text_becomes_null() {
        let (ds, report) = sanitize(dataset(vec![Value::text("   "), Value::Null], ColumnKind::Natural));

        assert!(ds.records[0].get("nome").is_null());
        assert!(ds.records[1].get("nome").is_null());
        assert_eq!(report.values_nulled, 1);
        assert_eq!(report.columns_sanitized, vec!["nome"]);
    }

    #[test]
    fn test_numeric_natural_column_is_not_touched() {
        let (ds, report) = sanitize(dataset(vec![Value::Number(10.0), Value::Null], ColumnKind::Natural));

        assert_eq!(ds.records[0].get("nome"), &Value::Number(10.0));
        assert!(report.columns_sanitized.is_empty());
    }

    #[test]
    fn test_number_in_text_column_is_an_anomaly() {
        let (ds, report) = sanitize(dataset(vec![Value::Number(7.0), Value::text(" x ")], ColumnKind::Text));

        assert_eq!(report.anomalies, 1);
        assert_eq!(ds.records[0].get("nome"), &Value::Number(7.0));
        assert_eq!(ds.records[1].get("nome"), &Value::text("x"));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let rows = vec![
            Value::text("  a \n b  "),
            Value::text("\r\n"),
            Value::text("c"),
            Value::Number(1.5),
            Value::Null,
        ];
        let (once, _) = sanitize(dataset(rows, ColumnKind::Natural));
        let (twice, report) = sanitize(once.clone());

        assert_eq!(once, twice);
        assert_eq!(report.values_changed, 0);
    }
}
