/// Column-name markers and identifier constants shared across the pipeline.
/// Every marker is matched as a substring of the lowercased column name.

// Columns whose values must never be coerced to numbers
pub const TEXT_COLUMN_MARKERS: &[&str] = &["cpf", "cnpj", "processo", "protocolo"];

// Columns that carry the judicial-process number; first matching column wins
pub const IDENTIFIER_COLUMN_MATCHERS: &[&str] = &["numero_processo", "nrprocesso", "nr_processo"];

// The standalone mask tool also accepted any column mentioning "processo"
pub const MASK_TOOL_MATCHERS: &[&str] = &["numero_processo", "nrprocesso", "processo", "nr_processo"];

pub const STRIP_TOOL_MATCHERS: &[&str] = &["nrprocesso", "processo"];

// Columns whose punctuation is ignored when comparing against a baseline
pub const COMPARISON_IDENTIFIER_MATCHERS: &[&str] = &["processo"];

/// Digit count of a judicial-process number (CNJ layout).
pub const IDENTIFIER_WIDTH: usize = 20;

/// Separator between values in a composite key.
pub const KEY_SEPARATOR: char = '|';

/// Number of duplicate groups kept as a diagnostic sample.
pub const DUPLICATE_SAMPLE_LIMIT: usize = 5;

/// Columns and characters shown per duplicate sample.
pub const SAMPLE_COLUMNS: usize = 3;
pub const SAMPLE_VALUE_CHARS: usize = 50;

/// Rendering of a null cell in console samples.
pub const EMPTY_PLACEHOLDER: &str = "(empty)";

// Field separators tried on the header line; ties go to the earlier one
pub const CANDIDATE_DELIMITERS: &[u8] = b",;\t|";

/// Extensions read as workbooks; only the first worksheet is loaded.
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

// Default directory layout of the automated run
pub const DEFAULT_BASELINE_DIR: &str = "0_baseline";
pub const DEFAULT_INPUT_DIR: &str = "1_raw_sheets";
pub const DEFAULT_OUTPUT_DIR: &str = "3_final_result";

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Lowercase `name` and test it against every marker.
pub fn name_matches_any(name: &str, markers: &[impl AsRef<str>]) -> bool {
    let lower = name.to_lowercase();
    markers.iter().any(|m| lower.contains(m.as_ref()))
}
