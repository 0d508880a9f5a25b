use csv::{ByteRecord, ReaderBuilder};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::constants::CANDIDATE_DELIMITERS;
use crate::error::Result;
use crate::pipeline::ColumnKindPolicy;
use crate::types::{ColumnKind, Dataset, Record, SourceDataset, Value};

/// How CSV bytes are split and decoded
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CsvOptions {
    /// Field separator; sniffed from the header line when unset
    pub delimiter: Option<u8>,
    /// Byte encoding; UTF-8, else Windows-1252, when unset
    pub encoding: Option<&'static Encoding>,
}

impl CsvOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }
}

/// Most frequent candidate separator outside quotes on the first line.
pub fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut quoted = false;
    for &b in bytes {
        match b {
            b'"' => quoted = !quoted,
            b'\n' | b'\r' if !quoted => break,
            _ if !quoted => {
                if let Some(i) = CANDIDATE_DELIMITERS.iter().position(|&d| d == b) {
                    counts[i] += 1;
                }
            }
            _ => {}
        }
    }

    let mut best = 0;
    for (i, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = i;
        }
    }
    CANDIDATE_DELIMITERS[best]
}

/// Exports from pt-BR spreadsheet tools are usually Windows-1252; anything that is
/// not valid UTF-8 is read that way.
fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        UTF_8
    } else {
        WINDOWS_1252
    }
}

struct FieldDecoder {
    encoding: &'static Encoding,
    malformed: usize,
}

impl FieldDecoder {
    fn decode(&mut self, field: &[u8]) -> String {
        let (text, had_errors) = self.encoding.decode_without_bom_handling(field);
        if had_errors {
            self.malformed += 1;
        }
        text.into_owned()
    }
}

/// Parse CSV bytes into a source dataset.
///
/// Empty cells are Null. Text columns keep the cell verbatim; other columns become
/// numbers when the trimmed cell parses as a finite number. Extra fields on a row are
/// dropped and counted as anomalies, missing ones read as Null. Cells that are not
/// valid in the configured encoding are replaced and counted as anomalies too.
pub fn parse_csv(name: &str, bytes: &[u8], policy: &ColumnKindPolicy, options: &CsvOptions) -> Result<SourceDataset> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let delimiter = options.delimiter.unwrap_or_else(|| sniff_delimiter(bytes));
    let encoding = options.encoding.unwrap_or_else(|| detect_encoding(bytes));
    if encoding != UTF_8 {
        info!("{}: reading as {}", name, encoding.name());
    }
    debug!("{}: delimiter {:?}", name, delimiter as char);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);
    let mut decoder = FieldDecoder {
        encoding,
        malformed: 0,
    };

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| decoder.decode(h).trim().to_string())
        .collect();
    let schema = policy.schema_for(headers.iter().map(String::as_str));
    let kinds: Vec<ColumnKind> = headers.iter().map(|h| policy.kind_for(h)).collect();

    let mut dataset = Dataset::new(schema);
    let mut anomalies = 0;
    let mut row = ByteRecord::new();
    while reader.read_byte_record(&mut row)? {
        let line = row.position().map(|p| p.line()).unwrap_or(dataset.len() as u64 + 2);
        if row.len() > headers.len() {
            debug!("{}: line {} has {} extra field(s)", name, line, row.len() - headers.len());
            anomalies += 1;
        }

        let mut record = Record::new();
        for (idx, header) in headers.iter().enumerate() {
            // Repeated header names keep the first column
            if headers[..idx].contains(header) {
                continue;
            }
            let cell = row.get(idx).map(|f| decoder.decode(f)).unwrap_or_default();
            record.set(header.clone(), read_cell(&cell, kinds[idx]));
        }
        record.set_origin(name, line);
        dataset.push(record);
    }

    if decoder.malformed > 0 {
        warn!(
            "⚠️  {}: {} field(s) are not valid {} and were read with replacement characters",
            name,
            decoder.malformed,
            encoding.name()
        );
        anomalies += decoder.malformed;
    }

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let checksum = hex::encode(hasher.finalize());

    Ok(SourceDataset {
        name: name.to_string(),
        dataset,
        checksum: Some(checksum),
        anomalies,
    })
}

pub(crate) fn read_cell(cell: &str, kind: ColumnKind) -> Value {
    if cell.trim().is_empty() {
        return Value::Null;
    }
    match kind {
        ColumnKind::Text => Value::text(cell),
        ColumnKind::Natural => cell
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Value::number)
            .unwrap_or_else(|| Value::text(cell)),
    }
}
