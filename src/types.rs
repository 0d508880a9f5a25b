use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How values of a column are read from the source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Kept verbatim, never parsed as a number
    Text,
    /// Default inference: numbers become numbers, everything else text
    Natural,
}

/// A single cell value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Number(f64),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Returns `None` for non-finite input so NaN never enters a dataset.
    pub fn number(n: f64) -> Option<Self> {
        n.is_finite().then_some(Value::Number(n))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form used for keys and identifier transforms. Null has none.
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => f.write_str(&format_number(*n)),
        }
    }
}

// Integral values below 2^53 print without a fractional part
fn format_number(n: f64) -> String {
    const EXACT_LIMIT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() < EXACT_LIMIT {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered set of columns, order of first encounter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema, ignoring repeated names after the first.
    pub fn from_columns(columns: impl IntoIterator<Item = Column>) -> Self {
        let mut schema = Self::new();
        for column in columns {
            schema.push(column);
        }
        schema
    }

    /// Appends `column` unless a column of that name already exists. Returns whether it was added.
    pub fn push(&mut self, column: Column) -> bool {
        if self.contains(&column.name) {
            return false;
        }
        self.columns.push(column);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Same column names regardless of order.
    pub fn set_eq(&self, other: &Schema) -> bool {
        self.len() == other.len() && self.names().all(|n| other.contains(n))
    }
}

/// Sheet and 1-based line a record was read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOrigin {
    pub source: String,
    pub line: u64,
}

impl fmt::Display for RowOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.line)
    }
}

/// One row; missing columns read as null
///
/// The origin is bookkeeping for diagnostics and never takes part in equality.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Record {
    values: BTreeMap<String, Value>,
    #[serde(skip)]
    origin: Option<RowOrigin>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(&self) -> Option<&RowOrigin> {
        self.origin.as_ref()
    }

    pub fn set_origin(&mut self, source: impl Into<String>, line: u64) {
        self.origin = Some(RowOrigin {
            source: source.into(),
            line,
        });
    }

    pub fn get(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.set(column, value);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub(crate) fn get_mut(&mut self, column: &str) -> Option<&mut Value> {
        self.values.get_mut(column)
    }
}

/// Records sharing one schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Dataset {
    pub schema: Schema,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            records: Vec::new(),
        }
    }

    /// Adds a record, dropping keys that are not part of the schema.
    pub fn push(&mut self, mut record: Record) {
        record.values.retain(|k, _| self.schema.contains(k));
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Concatenate datasets under `schema`; records keep their original order.
    pub fn concat(schema: Schema, datasets: impl IntoIterator<Item = Dataset>) -> Self {
        let mut merged = Dataset::new(schema);
        for dataset in datasets {
            for record in dataset.records {
                merged.push(record);
            }
        }
        merged
    }

    /// Cells that are null across the whole schema.
    pub fn null_cells(&self) -> usize {
        self.records
            .iter()
            .map(|r| self.schema.names().filter(|n| r.get(n).is_null()).count())
            .sum()
    }

    pub fn total_cells(&self) -> usize {
        self.records.len() * self.schema.len()
    }
}

/// A dataset as handed over by the ingest collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDataset {
    pub name: String,
    pub dataset: Dataset,
    /// SHA-256 of the source bytes, when read from a file
    pub checksum: Option<String>,
    /// Rows that did not fit the header, plus cells that could not be decoded
    pub anomalies: usize,
}

impl SourceDataset {
    pub fn new(name: impl Into<String>, dataset: Dataset) -> Self {
        Self {
            name: name.into(),
            dataset,
            checksum: None,
            anomalies: 0,
        }
    }

    /// Give every record without an origin its position in this source.
    ///
    /// Line numbers count the header as line 1, as a spreadsheet viewer shows them.
    pub fn stamp_origins(&mut self) {
        for (idx, record) in self.dataset.records.iter_mut().enumerate() {
            if record.origin.is_none() {
                record.set_origin(self.name.clone(), idx as u64 + 2);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_key_string_drops_integral_fraction() {
        assert_eq!(Value::Number(123.0).to_key_string().as_deref(), Some("123"));
        assert_eq!(Value::Number(1.5).to_key_string().as_deref(), Some("1.5"));
        assert_eq!(Value::Null.to_key_string(), None);
    }

    #[test]
    fn test_non_finite_numbers_are_rejected() {
        assert!(Value::number(f64::NAN).is_none());
        assert!(Value::number(f64::INFINITY).is_none());
        assert_eq!(Value::number(2.0), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_schema_keeps_first_occurrence_order() {
        let schema = Schema::from_columns([
            Column::new("id", ColumnKind::Natural),
            Column::new("valor", ColumnKind::Natural),
            Column::new("id", ColumnKind::Text),
        ]);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["id", "valor"]);
        assert_eq!(schema.column("id").unwrap().kind, ColumnKind::Natural);
    }

    #[test]
    fn test_missing_keys_read_as_null_and_unknown_keys_are_dropped() {
        let schema = Schema::from_columns([Column::new("a", ColumnKind::Natural)]);
        let mut dataset = Dataset::new(schema);
        dataset.push(Record::new().with("b", Value::text("x")));

        assert!(dataset.records[0].get("a").is_null());
        assert_eq!(dataset.records[0].keys().count(), 0);
        assert_eq!(dataset.null_cells(), 1);
    }

    #[test]
    fn test_origin_is_ignored_by_equality_and_stamped_once() {
        let mut located = Record::new().with("a", Value::text("x"));
        located.set_origin("jan.csv", 7);
        assert_eq!(located, Record::new().with("a", Value::text("x")));

        let schema = Schema::from_columns([Column::new("a", ColumnKind::Natural)]);
        let mut dataset = Dataset::new(schema);
        dataset.push(located);
        dataset.push(Record::new().with("a", Value::text("y")));
        let mut source = SourceDataset::new("jan.csv", dataset);
        source.stamp_origins();

        let origins: Vec<String> = source
            .dataset
            .records
            .iter()
            .filter_map(|r| r.origin().map(ToString::to_string))
            .collect();
        assert_eq!(origins, vec!["jan.csv:7", "jan.csv:3"]);
    }
}
