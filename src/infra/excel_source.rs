use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use tracing::{debug, warn};

use crate::error::{ConsolidatorError, Result};
use crate::infra::csv_source::read_cell;
use crate::pipeline::ColumnKindPolicy;
use crate::types::{ColumnKind, Dataset, Record, SourceDataset, Value};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a workbook (xlsx, xlsm, xlsb, xls or ods) into a source dataset.
///
/// Only the first worksheet is read and its first row is the header. Cells follow
/// the same column policy as CSV: text columns never hold numbers.
pub fn parse_workbook(name: &str, bytes: &[u8], policy: &ColumnKindPolicy) -> Result<SourceDataset> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ConsolidatorError::Config(format!("{} has no worksheet", name)))??;

    let mut source = dataset_from_range(name, &range, policy);

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    source.checksum = Some(hex::encode(hasher.finalize()));
    Ok(source)
}

fn dataset_from_range(name: &str, range: &Range<Data>, policy: &ColumnKindPolicy) -> SourceDataset {
    let first_row = range.start().map(|(row, _)| u64::from(row)).unwrap_or(0);
    let mut rows = range.rows();

    let headers: Vec<String> = rows
        .next()
        .map(|cells| cells.iter().map(|c| c.to_string().trim().to_string()).collect())
        .unwrap_or_default();
    let schema = policy.schema_for(headers.iter().map(String::as_str));
    let kinds: Vec<ColumnKind> = headers.iter().map(|h| policy.kind_for(h)).collect();

    let mut dataset = Dataset::new(schema);
    let mut anomalies = 0;
    for (offset, cells) in rows.enumerate() {
        // +1 for the header, +1 for 1-based lines
        let line = first_row + offset as u64 + 2;
        let mut record = Record::new();
        for (idx, header) in headers.iter().enumerate() {
            if headers[..idx].contains(header) {
                continue;
            }
            let cell = cells.get(idx).unwrap_or(&Data::Empty);
            let value = read_workbook_cell(cell, kinds[idx]).unwrap_or_else(|| {
                debug!("{}: error cell {} at line {}", name, cell, line);
                anomalies += 1;
                Value::Null
            });
            record.set(header.clone(), value);
        }
        record.set_origin(name, line);
        dataset.push(record);
    }

    if anomalies > 0 {
        warn!("⚠️  {}: {} formula error cell(s) read as empty", name, anomalies);
    }

    SourceDataset {
        name: name.to_string(),
        dataset,
        checksum: None,
        anomalies,
    }
}

/// Convert one typed cell; `None` for formula error cells.
fn read_workbook_cell(cell: &Data, kind: ColumnKind) -> Option<Value> {
    let value = match cell {
        Data::Empty => Value::Null,
        Data::String(s) => match kind {
            ColumnKind::Text => read_cell(s, kind),
            // A cell typed as text in the sheet stays text
            ColumnKind::Natural if s.trim().is_empty() => Value::Null,
            ColumnKind::Natural => Value::text(s.as_str()),
        },
        Data::Float(f) => number_cell(*f, kind),
        Data::Int(i) => number_cell(*i as f64, kind),
        Data::Bool(b) => Value::text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(at) => Value::text(at.format(DATETIME_FORMAT).to_string()),
            None => number_cell(dt.as_f64(), kind),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::text(s.as_str()),
        Data::Error(_) => return None,
    };
    Some(value)
}

fn number_cell(n: f64, kind: ColumnKind) -> Value {
    match (Value::number(n), kind) {
        (None, _) => Value::Null,
        (Some(value), ColumnKind::Text) => Value::text(value.to_string()),
        (Some(value), ColumnKind::Natural) => value,
    }
}
