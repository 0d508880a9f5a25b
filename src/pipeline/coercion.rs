use serde::{Deserialize, Serialize};

use crate::constants::{name_matches_any, TEXT_COLUMN_MARKERS};
use crate::types::{Column, ColumnKind, Schema};

/// Decides, from the column name alone, whether a column must be read as opaque text.
///
/// The decision has to be taken before any cell is parsed: once a leading zero has
/// been lost to numeric parsing it cannot be recovered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnKindPolicy {
    text_markers: Vec<String>,
}

impl ColumnKindPolicy {
    pub fn new(text_markers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            text_markers: text_markers
                .into_iter()
                .map(|m| m.into().to_lowercase())
                .collect(),
        }
    }

    pub fn kind_for(&self, column_name: &str) -> ColumnKind {
        if name_matches_any(column_name, &self.text_markers) {
            ColumnKind::Text
        } else {
            ColumnKind::Natural
        }
    }

    pub fn column(&self, name: impl Into<String>) -> Column {
        let name = name.into();
        let kind = self.kind_for(&name);
        Column::new(name, kind)
    }

    /// Schema for a header row.
    pub fn schema_for<'a>(&self, headers: impl IntoIterator<Item = &'a str>) -> Schema {
        Schema::from_columns(headers.into_iter().map(|h| self.column(h)))
    }

    pub fn text_markers(&self) -> &[String] {
        &self.text_markers
    }
}

impl Default for ColumnKindPolicy {
    fn default() -> Self {
        Self::new(TEXT_COLUMN_MARKERS.iter().copied())
    }
}
