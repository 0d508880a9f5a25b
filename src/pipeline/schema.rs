use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{ConsolidatorError, Result};
use crate::types::{Column, ColumnKind, Schema};

/// Outcome of reconciling the schemas of several datasets
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReconciledSchema {
    /// Union of all columns; used for the consolidated dataset
    pub consolidated: Schema,
    /// Intersection of all column names; used for comparison keys
    pub comparison: Vec<String>,
    /// Columns of each source that are not in the intersection
    pub unique_by_source: BTreeMap<String, Vec<String>>,
    /// Whether every schema had the same column set
    pub identical: bool,
}

/// Union of every schema in order of first encounter.
///
/// A column is `text` if any source declared it so.
pub fn union_schema<'a>(schemas: impl IntoIterator<Item = &'a Schema>) -> Schema {
    let mut union = Schema::new();
    let mut forced_text: Vec<String> = Vec::new();
    for schema in schemas {
        for column in schema.columns() {
            if !union.push(column.clone()) && column.kind == ColumnKind::Text {
                forced_text.push(column.name.clone());
            }
        }
    }
    if forced_text.is_empty() {
        return union;
    }
    Schema::from_columns(union.columns().iter().map(|c| {
        if forced_text.contains(&c.name) {
            Column::new(c.name.clone(), ColumnKind::Text)
        } else {
            c.clone()
        }
    }))
}

/// Determine the consolidated and comparison column sets of named schemas.
///
/// Fails with `NoDatasets` for an empty input and with `NoCommonColumns` when the
/// schemas share no column name.
pub fn reconcile(schemas: &[(&str, &Schema)]) -> Result<ReconciledSchema> {
    let (_, first) = schemas.first().ok_or(ConsolidatorError::NoDatasets)?;

    let identical = schemas.iter().all(|(_, s)| s.set_eq(first));
    let consolidated = union_schema(schemas.iter().map(|(_, s)| *s));

    let comparison: Vec<String> = consolidated
        .names()
        .filter(|name| schemas.iter().all(|(_, s)| s.contains(name)))
        .map(str::to_string)
        .collect();

    let mut unique_by_source = BTreeMap::new();
    for (source, schema) in schemas {
        let unique: Vec<String> = schema
            .names()
            .filter(|n| !comparison.iter().any(|c| c == n))
            .map(str::to_string)
            .collect();
        if !unique.is_empty() {
            unique_by_source.insert((*source).to_string(), unique);
        }
    }

    if comparison.is_empty() {
        warn!("No column is shared by all {} schemas", schemas.len());
        return Err(ConsolidatorError::NoCommonColumns { unique_by_source });
    }

    if identical {
        debug!("All {} schemas are compatible ({} columns)", schemas.len(), comparison.len());
    } else {
        debug!(
            "Schemas differ: comparing on {} common column(s), consolidating {} column(s)",
            comparison.len(),
            consolidated.len()
        );
    }

    Ok(ReconciledSchema {
        consolidated,
        comparison,
        unique_by_source,
        identical,
    })
}
