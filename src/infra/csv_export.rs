use async_trait::async_trait;
use chrono::Local;
use std::path::PathBuf;
use tracing::debug;

use crate::app::ports::DatasetSinkPort;
use crate::error::{ConsolidatorError, Result};
use crate::pipeline::RunReport;
use crate::types::Dataset;

/// Writes datasets as timestamped CSV files, each with a JSON run report beside it
pub struct CsvExportSink {
    /// Directory receiving every output file
    pub output_dir: PathBuf,
}

impl CsvExportSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// `<prefix>_<YYYYmmdd_HHMMSS>.csv`, stamped with the local start time of the run
    fn output_path(&self, prefix: &str, report: &RunReport) -> PathBuf {
        let timestamp = report.started_at.with_timezone(&Local).format("%Y%m%d_%H%M%S");
        self.output_dir.join(format!("{}_{}.csv", prefix, timestamp))
    }
}

/// Serialize a dataset with the schema as header. Null cells are empty.
pub fn dataset_to_csv(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(dataset.schema.names())?;
    for record in &dataset.records {
        writer.write_record(dataset.schema.names().map(|name| record.get(name).to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| ConsolidatorError::Io(e.into_error()))
}

#[async_trait]
impl DatasetSinkPort for CsvExportSink {
    async fn write(&self, prefix: &str, dataset: &Dataset, report: &RunReport) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let path = self.output_path(prefix, report);
        tokio::fs::write(&path, dataset_to_csv(dataset)?).await?;

        let report_path = path.with_extension("report.json");
        tokio::fs::write(&report_path, serde_json::to_vec_pretty(report)?).await?;
        debug!("Run report written to {}", report_path.display());

        Ok(path)
    }
}
