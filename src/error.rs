use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsolidatorError {
    #[error("No ingestible dataset was supplied")]
    NoDatasets,

    #[error("Datasets share no common column; unique columns per source: {unique_by_source:?}")]
    NoCommonColumns {
        unique_by_source: BTreeMap<String, Vec<String>>,
    },

    #[error("Invalid pipeline configuration: {0}")]
    InvalidPipeline(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConsolidatorError {
    /// Structural errors stop the run; everything else comes from the host adapters.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ConsolidatorError::NoDatasets
                | ConsolidatorError::NoCommonColumns { .. }
                | ConsolidatorError::InvalidPipeline(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConsolidatorError>;
