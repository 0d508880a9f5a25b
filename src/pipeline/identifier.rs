use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{name_matches_any, IDENTIFIER_WIDTH};
use crate::types::{Dataset, Schema, Value};

static CNJ_GROUPS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{7})(\d{2})(\d{4})(\d{1})(\d{2})(\d{4})$").expect("valid identifier pattern")
});

static CNJ_MASKED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{7}-\d{2}\.\d{4}\.\d{1}\.\d{2}\.\d{4}$").expect("valid masked pattern")
});

/// What the identifier stage does to the selected column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierMode {
    /// Rewrite into `AAAAAAA-BB.CCCC.D.EE.FFFF`
    Mask,
    /// Strip `-` and `.`
    Unmask,
}

impl fmt::Display for IdentifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierMode::Mask => f.write_str("mask"),
            IdentifierMode::Unmask => f.write_str("unmask"),
        }
    }
}

/// Why a value was left as it was
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnchangedReason {
    Null,
    NoDigits,
    TooManyDigits(usize),
}

impl UnchangedReason {
    pub fn label(&self) -> &'static str {
        match self {
            UnchangedReason::Null => "null",
            UnchangedReason::NoDigits => "no_digits",
            UnchangedReason::TooManyDigits(_) => "too_many_digits",
        }
    }
}

/// Result of masking a single value
#[derive(Debug, Clone, PartialEq)]
pub enum MaskOutcome {
    Masked(String),
    Unchanged { original: Value, reason: UnchangedReason },
}

impl MaskOutcome {
    pub fn is_masked(&self) -> bool {
        matches!(self, MaskOutcome::Masked(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            MaskOutcome::Masked(s) => Value::Text(s),
            MaskOutcome::Unchanged { original, .. } => original,
        }
    }
}

/// Format a judicial-process number as `AAAAAAA-BB.CCCC.D.EE.FFFF`.
///
/// Non-digits are dropped and the rest is left-padded to 20 digits. Values that do not
/// fit come back unchanged with the reason attached; this never fails.
pub fn mask(value: &Value) -> MaskOutcome {
    let Some(raw) = value.to_key_string() else {
        return MaskOutcome::Unchanged {
            original: value.clone(),
            reason: UnchangedReason::Null,
        };
    };

    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return MaskOutcome::Unchanged {
            original: value.clone(),
            reason: UnchangedReason::NoDigits,
        };
    }

    let padded = format!("{:0>width$}", digits, width = IDENTIFIER_WIDTH);
    match CNJ_GROUPS.captures(&padded) {
        Some(caps) => MaskOutcome::Masked(format!(
            "{}-{}.{}.{}.{}.{}",
            &caps[1], &caps[2], &caps[3], &caps[4], &caps[5], &caps[6]
        )),
        None => MaskOutcome::Unchanged {
            original: value.clone(),
            reason: UnchangedReason::TooManyDigits(digits.len()),
        },
    }
}

/// Remove exactly `-` and `.`, leaving every other character in place.
pub fn unmask_str(raw: &str) -> String {
    raw.chars().filter(|c| *c != '-' && *c != '.').collect()
}

pub fn unmask(value: &Value) -> Value {
    match value.to_key_string() {
        Some(raw) => Value::Text(unmask_str(&raw)),
        None => Value::Null,
    }
}

pub fn is_masked(raw: &str) -> bool {
    CNJ_MASKED.is_match(raw)
}

/// First column, in schema order, whose lowercased name contains any matcher.
pub fn select_identifier_column<'a>(schema: &'a Schema, matchers: &[String]) -> Option<&'a str> {
    schema.names().find(|name| name_matches_any(name, matchers))
}

/// Counters produced by the identifier stage
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentifierReport {
    pub column: Option<String>,
    pub mode: Option<IdentifierMode>,
    pub transformed: usize,
    pub unchanged: BTreeMap<String, usize>,
    /// Values in canonical masked form after the stage
    pub canonical: usize,
    pub example_before: Option<String>,
    pub example_after: Option<String>,
}

impl IdentifierReport {
    pub fn unchanged_total(&self) -> usize {
        self.unchanged.values().sum()
    }
}

/// Apply `mode` to every value of `column`.
pub fn transform_column(mut dataset: Dataset, column: &str, mode: IdentifierMode) -> (Dataset, IdentifierReport) {
    let mut report = IdentifierReport {
        column: Some(column.to_string()),
        mode: Some(mode),
        ..Default::default()
    };

    report.example_before = dataset
        .records
        .first()
        .and_then(|r| r.get(column).to_key_string());

    for record in dataset.records.iter_mut() {
        let current = record.get(column).clone();
        let next = match mode {
            IdentifierMode::Mask => {
                let outcome = mask(&current);
                match &outcome {
                    MaskOutcome::Masked(_) => report.transformed += 1,
                    MaskOutcome::Unchanged { reason, .. } => {
                        *report.unchanged.entry(reason.label().to_string()).or_insert(0) += 1;
                    }
                }
                outcome.into_value()
            }
            IdentifierMode::Unmask => {
                if current.is_null() {
                    *report
                        .unchanged
                        .entry(UnchangedReason::Null.label().to_string())
                        .or_insert(0) += 1;
                    continue;
                }
                report.transformed += 1;
                unmask(&current)
            }
        };
        if let Some(s) = next.as_text() {
            if is_masked(s) {
                report.canonical += 1;
            }
        }
        record.set(column, next);
    }

    report.example_after = dataset
        .records
        .first()
        .and_then(|r| r.get(column).to_key_string());

    (dataset, report)
}
