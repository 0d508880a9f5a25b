use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

use crate::constants::{name_matches_any, EMPTY_PLACEHOLDER, KEY_SEPARATOR, SAMPLE_COLUMNS, SAMPLE_VALUE_CHARS};
use crate::pipeline::sanitize::sanitize_text;
use crate::types::{Dataset, Record, Value};

// Escaped text never yields a lone backslash followed by `N`
const NULL_TOKEN: &str = "\\N";

/// Normalized string form of a cell for key construction.
///
/// Text goes through the same normalization as the sanitizer; identifier columns
/// additionally lose `-`, `.` and whitespace. Empty results count as null.
fn normalized_form(value: &Value, strip_identifier: bool) -> Option<String> {
    let raw = match value {
        Value::Null => return None,
        Value::Text(s) => sanitize_text(s)?,
        Value::Number(_) => value.to_key_string()?,
    };
    if !strip_identifier {
        return Some(raw);
    }
    let stripped: String = raw
        .chars()
        .filter(|c| *c != '-' && *c != '.' && !c.is_whitespace())
        .collect();
    (!stripped.is_empty()).then_some(stripped)
}

fn push_token(key: &mut String, token: Option<String>) {
    match token {
        None => key.push_str(NULL_TOKEN),
        Some(s) => {
            for c in s.chars() {
                if c == '\\' || c == KEY_SEPARATOR {
                    key.push('\\');
                }
                key.push(c);
            }
        }
    }
}

/// Builds composite keys over a fixed, ordered column list
#[derive(Debug, Clone)]
pub struct CompositeKeyBuilder {
    columns: Vec<String>,
    identifier_columns: HashSet<String>,
}

impl CompositeKeyBuilder {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            identifier_columns: HashSet::new(),
        }
    }

    /// Columns matching any of `matchers` compare without punctuation.
    pub fn with_identifier_matchers(mut self, matchers: &[String]) -> Self {
        self.identifier_columns = self
            .columns
            .iter()
            .filter(|c| name_matches_any(c, matchers))
            .cloned()
            .collect();
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn identifier_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| self.identifier_columns.contains(*c))
            .cloned()
            .collect()
    }

    pub fn key(&self, record: &Record) -> String {
        let mut key = String::new();
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            let strip = self.identifier_columns.contains(column);
            push_token(&mut key, normalized_form(record.get(column), strip));
        }
        key
    }
}

/// One group of identical rows, shown for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicateSample {
    pub occurrences: usize,
    pub values: BTreeMap<String, String>,
    /// `source:line` of every row in the group, in input order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub origins: Vec<String>,
}

/// Counters produced by intra-batch deduplication
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntraDedupReport {
    pub rows_before: usize,
    pub rows_after: usize,
    pub duplicate_groups: usize,
    /// Rows taking part in any duplicate group, first occurrences included
    pub duplicated_rows: usize,
    pub rows_dropped: usize,
    pub samples: Vec<DuplicateSample>,
}

impl IntraDedupReport {
    pub fn duplication_rate(&self) -> f64 {
        rate(self.rows_dropped, self.rows_before)
    }
}

/// Counters produced by baseline comparison
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BaselineReport {
    pub baseline_rows: usize,
    pub comparison_columns: Vec<String>,
    pub identifier_columns: Vec<String>,
    pub rows_before: usize,
    pub rows_removed: usize,
    pub skipped: Option<String>,
}

impl BaselineReport {
    pub fn duplication_rate(&self) -> f64 {
        rate(self.rows_removed, self.rows_before)
    }
}

pub(crate) fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn sample_of(dataset: &Dataset, members: &[usize]) -> DuplicateSample {
    let record = &dataset.records[members[0]];
    let values = dataset
        .schema
        .names()
        .take(SAMPLE_COLUMNS)
        .map(|name| {
            let shown = match record.get(name).to_key_string() {
                None => EMPTY_PLACEHOLDER.to_string(),
                Some(s) => s.chars().take(SAMPLE_VALUE_CHARS).collect(),
            };
            (name.to_string(), shown)
        })
        .collect();
    let origins = members
        .iter()
        .filter_map(|&i| dataset.records[i].origin())
        .map(ToString::to_string)
        .collect();
    DuplicateSample {
        occurrences: members.len(),
        values,
        origins,
    }
}

/// Drop exact duplicate rows, keeping the first occurrence of each.
///
/// Rows are compared over every schema column after text normalization; two nulls
/// are equal. Retained rows keep their relative order.
pub fn intra_batch_dedup(dataset: Dataset, sample_limit: usize) -> (Dataset, IntraDedupReport) {
    let keys = CompositeKeyBuilder::new(dataset.schema.names().map(str::to_string).collect());
    let rows_before = dataset.len();

    // key -> row indices sharing it, first occurrence first
    let mut seen: HashMap<String, Vec<usize>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut keep = Vec::with_capacity(rows_before);

    for (i, record) in dataset.records.iter().enumerate() {
        let key = keys.key(record);
        match seen.get_mut(&key) {
            Some(members) => {
                members.push(i);
                keep.push(false);
            }
            None => {
                seen.insert(key.clone(), vec![i]);
                order.push(key);
                keep.push(true);
            }
        }
    }

    let mut report = IntraDedupReport {
        rows_before,
        ..Default::default()
    };
    for key in &order {
        let members = &seen[key];
        if members.len() > 1 {
            report.duplicate_groups += 1;
            report.duplicated_rows += members.len();
            if report.samples.len() < sample_limit {
                report.samples.push(sample_of(&dataset, members));
            }
        }
    }

    let Dataset { schema, records } = dataset;
    let records: Vec<Record> = records
        .into_iter()
        .zip(keep)
        .filter_map(|(r, k)| k.then_some(r))
        .collect();

    report.rows_after = records.len();
    report.rows_dropped = rows_before - report.rows_after;
    if report.rows_dropped > 0 {
        info!(
            "Removed {} duplicate row(s) in {} group(s)",
            report.rows_dropped, report.duplicate_groups
        );
    } else {
        debug!("No duplicate rows found");
    }

    (Dataset { schema, records }, report)
}

/// Drop rows of `incoming` whose composite key already exists in `baseline`.
///
/// Identifier columns (per `identifier_matchers`) compare without punctuation on both
/// sides; the returned rows keep their original values and order. With no comparison
/// columns or an empty baseline, `incoming` passes through unchanged.
pub fn baseline_dedup(
    incoming: Dataset,
    baseline: &Dataset,
    comparison_columns: &[String],
    identifier_matchers: &[String],
) -> (Dataset, BaselineReport) {
    let mut report = BaselineReport {
        baseline_rows: baseline.len(),
        comparison_columns: comparison_columns.to_vec(),
        rows_before: incoming.len(),
        ..Default::default()
    };

    if comparison_columns.is_empty() {
        report.skipped = Some("no comparison columns".to_string());
        return (incoming, report);
    }
    if baseline.is_empty() {
        report.skipped = Some("baseline is empty".to_string());
        return (incoming, report);
    }

    let keys = CompositeKeyBuilder::new(comparison_columns.to_vec()).with_identifier_matchers(identifier_matchers);
    report.identifier_columns = keys.identifier_columns();

    let existing: HashSet<String> = baseline.records.iter().map(|r| keys.key(r)).collect();

    let Dataset { schema, records } = incoming;
    let records: Vec<Record> = records
        .into_iter()
        .filter(|r| !existing.contains(&keys.key(r)))
        .collect();

    report.rows_removed = report.rows_before - records.len();
    info!(
        "Baseline comparison removed {} of {} row(s) using {} column(s)",
        report.rows_removed,
        report.rows_before,
        comparison_columns.len()
    );

    (Dataset { schema, records }, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, ColumnKind, Schema};

    fn dataset(columns: &[&str], rows: &[&[Value]]) -> Dataset {
        let schema = Schema::from_columns(columns.iter().map(|c| Column::new(*c, ColumnKind::Natural)));
        let mut ds = Dataset::new(schema);
        for row in rows {
            let mut record = Record::new();
            for (c, v) in columns.iter().zip(row.iter()) {
                record.set(*c, v.clone());
            }
            ds.push(record);
        }
        ds
    }

    fn t(s: &str) -> Value {
        Value::text(s)
    }

    #[test]
    fn test_keeps_first_occurrence_in_order() {
        let ds = dataset(
            &["id", "nome"],
            &[
                &[Value::Number(1.0), t("Ana")],
                &[Value::Number(2.0), t("Bia")],
                &[Value::Number(1.0), t("Ana")],
                &[Value::Number(3.0), Value::Null],
                &[Value::Number(3.0), Value::Null],
            ],
        );

        let (out, report) = intra_batch_dedup(ds, 5);

        let ids: Vec<_> = out.records.iter().map(|r| r.get("id").clone()).collect();
        assert_eq!(ids, vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
        assert_eq!(report.rows_dropped, 2);
        assert_eq!(report.duplicate_groups, 2);
        assert_eq!(report.duplicated_rows, 4);
        assert_eq!(report.samples[1].values.get("nome").unwrap(), EMPTY_PLACEHOLDER);
    }

    #[test]
    fn test_whitespace_variants_are_duplicates() {
        let ds = dataset(&["nome"], &[&[t("João Silva")], &[t("  João   Silva\n")], &[t("   ")], &[Value::Null]]);

        let (out, report) = intra_batch_dedup(ds, 5);

        assert_eq!(out.len(), 2);
        assert_eq!(report.rows_dropped, 2);
        assert_eq!(out.records[0].get("nome"), &t("João Silva"));
    }

    #[test]
    fn test_concatenated_copy_dedups_to_original() {
        let a = dataset(
            &["id", "valor"],
            &[&[t("1"), t("x")], &[t("2"), t("y")], &[t("1"), t("x")]],
        );
        let (once, _) = intra_batch_dedup(a.clone(), 5);
        let doubled = Dataset::concat(a.schema.clone(), [a.clone(), a]);
        let (twice, _) = intra_batch_dedup(doubled, 5);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_separator_inside_values_does_not_collide() {
        let ds = dataset(&["a", "b"], &[&[t("x|y"), t("z")], &[t("x"), t("y|z")]]);
        let (out, _) = intra_batch_dedup(ds, 5);
        assert_eq!(out.len(), 2);

        let ds = dataset(&["a"], &[&[t("\\N")], &[Value::Null]]);
        let (out, _) = intra_batch_dedup(ds, 5);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_sample_limit_caps_samples_not_counts() {
        let rows: Vec<Vec<Value>> = (0..7).flat_map(|i| vec![vec![Value::Number(i as f64)]; 2]).collect();
        let refs: Vec<&[Value]> = rows.iter().map(|r| r.as_slice()).collect();
        let (_, report) = intra_batch_dedup(dataset(&["id"], &refs), 5);

        assert_eq!(report.duplicate_groups, 7);
        assert_eq!(report.samples.len(), 5);
    }

    #[test]
    fn test_sample_shows_first_columns_with_long_values_cut() {
        let long = "x".repeat(60);
        let row = [t(&long), Value::Null, Value::Number(7.0), t("hidden")];
        let ds = dataset(&["obs", "nome", "valor", "extra"], &[&row, &row]);

        let (_, report) = intra_batch_dedup(ds, 5);
        let sample = &report.samples[0];

        assert_eq!(sample.occurrences, 2);
        assert_eq!(sample.values.len(), SAMPLE_COLUMNS);
        assert_eq!(sample.values["obs"], "x".repeat(SAMPLE_VALUE_CHARS));
        assert_eq!(sample.values["nome"], EMPTY_PLACEHOLDER);
        assert_eq!(sample.values["valor"], "7");
        assert!(!sample.values.contains_key("extra"));
    }

    #[test]
    fn test_sample_cut_counts_characters_not_bytes() {
        let long = "ã".repeat(55);
        let ds = dataset(&["nome"], &[&[t(&long)], &[t(&long)]]);

        let (_, report) = intra_batch_dedup(ds, 5);

        assert_eq!(report.samples[0].values["nome"].chars().count(), SAMPLE_VALUE_CHARS);
    }

    #[test]
    fn test_sample_lists_where_each_copy_came_from() {
        let mut ds = dataset(&["id"], &[&[t("1")], &[t("2")], &[t("1")]]);
        for (i, record) in ds.records.iter_mut().enumerate() {
            record.set_origin(if i < 2 { "jan.csv" } else { "feb.csv" }, i as u64 + 2);
        }

        let (out, report) = intra_batch_dedup(ds, 5);

        assert_eq!(report.samples[0].origins, vec!["jan.csv:2", "feb.csv:4"]);
        assert_eq!(out.records[0].origin().map(|o| o.line), Some(2));
    }

    #[test]
    fn test_baseline_removes_differently_punctuated_identifier() {
        let baseline = dataset(&["numero_processo"], &[&[t("0082162-14.2016.8.09.0051")]]);
        let incoming = dataset(
            &["numero_processo"],
            &[&[t("00821621420168090051")], &[t("00821621420168090052")]],
        );
        let cols = vec!["numero_processo".to_string()];
        let matchers = vec!["processo".to_string()];

        let (out, report) = baseline_dedup(incoming, &baseline, &cols, &matchers);

        assert_eq!(out.len(), 1);
        assert_eq!(out.records[0].get("numero_processo"), &t("00821621420168090052"));
        assert_eq!(report.rows_removed, 1);
        assert_eq!(report.identifier_columns, cols);
    }

    #[test]
    fn test_baseline_keeps_display_values_and_order() {
        let baseline = dataset(&["id", "processo"], &[&[t("2"), t("1.2")]]);
        let incoming = dataset(
            &["id", "processo"],
            &[&[t("3"), t("9-9")], &[t("2"), t("12")], &[t("1"), t("1-1")]],
        );
        let cols = vec!["id".to_string(), "processo".to_string()];

        let (out, _) = baseline_dedup(incoming, &baseline, &cols, &["processo".to_string()]);

        let ids: Vec<_> = out.records.iter().map(|r| r.get("id").clone()).collect();
        assert_eq!(ids, vec![t("3"), t("1")]);
        assert_eq!(out.records[0].get("processo"), &t("9-9"));
    }

    #[test]
    fn test_baseline_without_matchers_is_punctuation_sensitive() {
        let baseline = dataset(&["processo"], &[&[t("1.2")]]);
        let incoming = dataset(&["processo"], &[&[t("12")]]);

        let (out, _) = baseline_dedup(incoming, &baseline, &["processo".to_string()], &[]);

        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_baseline_skips_when_nothing_to_compare() {
        let incoming = dataset(&["id"], &[&[t("1")]]);
        let empty = dataset(&["id"], &[]);

        let (out, report) = baseline_dedup(incoming.clone(), &empty, &["id".to_string()], &[]);
        assert_eq!(out, incoming);
        assert!(report.skipped.is_some());

        let baseline = dataset(&["id"], &[&[t("1")]]);
        let (out, report) = baseline_dedup(incoming.clone(), &baseline, &[], &[]);
        assert_eq!(out, incoming);
        assert_eq!(report.skipped.as_deref(), Some("no comparison columns"));
    }

    #[test]
    fn test_number_and_text_with_same_string_form_match() {
        let baseline = dataset(&["valor"], &[&[Value::Number(10.0)]]);
        let incoming = dataset(&["valor"], &[&[t("10")], &[t("10.5")]]);

        let (out, _) = baseline_dedup(incoming, &baseline, &["valor".to_string()], &[]);

        assert_eq!(out.len(), 1);
    }
}
