use encoding_rs::Encoding;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    COMPARISON_IDENTIFIER_MATCHERS, DEFAULT_BASELINE_DIR, DEFAULT_CONFIG_PATH, DEFAULT_INPUT_DIR,
    DEFAULT_OUTPUT_DIR, DUPLICATE_SAMPLE_LIMIT, IDENTIFIER_COLUMN_MATCHERS, MASK_TOOL_MATCHERS,
    STRIP_TOOL_MATCHERS, TEXT_COLUMN_MARKERS,
};
use crate::error::{ConsolidatorError, Result};
use crate::infra::CsvOptions;
use crate::pipeline::{ColumnKindPolicy, ErrorHandlingStrategy, PipelineConfig};

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub columns: ColumnsConfig,
    pub pipeline: PipelineSettings,
    pub csv: CsvSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub baseline_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            baseline_dir: PathBuf::from(DEFAULT_BASELINE_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnsConfig {
    /// Name fragments of columns read as text
    pub text_markers: Vec<String>,
    /// Process-number column matchers of the automated run
    pub identifier_matchers: Vec<String>,
    pub mask_matchers: Vec<String>,
    pub strip_matchers: Vec<String>,
    /// Columns compared without punctuation against the baseline
    pub comparison_identifier_matchers: Vec<String>,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            text_markers: owned(TEXT_COLUMN_MARKERS),
            identifier_matchers: owned(IDENTIFIER_COLUMN_MATCHERS),
            mask_matchers: owned(MASK_TOOL_MATCHERS),
            strip_matchers: owned(STRIP_TOOL_MATCHERS),
            comparison_identifier_matchers: owned(COMPARISON_IDENTIFIER_MATCHERS),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub error_handling: ErrorHandlingStrategy,
    pub duplicate_sample_limit: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            error_handling: ErrorHandlingStrategy::ContinueOnError,
            duplicate_sample_limit: DUPLICATE_SAMPLE_LIMIT,
        }
    }
}

/// Unset keys are detected per file
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CsvSettings {
    /// Single ASCII character, e.g. ";" or "\t"
    pub delimiter: Option<String>,
    /// WHATWG label such as "utf-8", "windows-1252" or "latin1"
    pub encoding: Option<String>,
}

impl CsvSettings {
    pub fn options(&self) -> Result<CsvOptions> {
        let mut options = CsvOptions::default();
        if let Some(delimiter) = &self.delimiter {
            match delimiter.as_bytes() {
                [b] if b.is_ascii() && *b != b'"' => options = options.with_delimiter(*b),
                _ => {
                    return Err(ConsolidatorError::Config(format!(
                        "csv delimiter must be one ASCII character, got {:?}",
                        delimiter
                    )))
                }
            }
        }
        if let Some(label) = &self.encoding {
            let encoding = Encoding::for_label(label.trim().as_bytes())
                .filter(|e| e.is_ascii_compatible())
                .ok_or_else(|| ConsolidatorError::Config(format!("unsupported csv encoding '{}'", label)))?;
            options = options.with_encoding(encoding);
        }
        Ok(options)
    }
}

impl Config {
    /// Load `config.toml` from the working directory, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH), false)
    }

    /// Load from `path`. A missing file is an error only when `required`.
    pub fn load_from(path: &Path, required: bool) -> Result<Self> {
        if !path.exists() && !required {
            return Ok(Self::default());
        }
        let config_content = fs::read_to_string(path).map_err(|e| {
            ConsolidatorError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::parse(&config_content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.columns.text_markers.iter().any(|m| m.trim().is_empty()) {
            return Err(ConsolidatorError::Config("empty text column marker".to_string()));
        }
        config.csv.options()?;
        Ok(config)
    }

    pub fn column_policy(&self) -> ColumnKindPolicy {
        ColumnKindPolicy::new(self.columns.text_markers.iter().cloned())
    }

    /// Apply file settings to a preset; the matcher list depends on the preset.
    pub fn apply(&self, mut pipeline: PipelineConfig) -> PipelineConfig {
        pipeline.error_handling = self.pipeline.error_handling;
        pipeline.duplicate_sample_limit = self.pipeline.duplicate_sample_limit;
        pipeline.comparison_identifier_matchers = self.columns.comparison_identifier_matchers.clone();
        let matchers = match pipeline.name.as_str() {
            "mask" => self.columns.mask_matchers.clone(),
            "strip" => self.columns.strip_matchers.clone(),
            _ => self.columns.identifier_matchers.clone(),
        };
        pipeline.with_identifier_matchers(matchers)
    }
}
