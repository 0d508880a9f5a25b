use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::app::ports::DatasetSourcePort;
use crate::constants::WORKBOOK_EXTENSIONS;
use crate::error::Result;
use crate::infra::csv_source::{parse_csv, CsvOptions};
use crate::infra::excel_source::parse_workbook;
use crate::pipeline::schema::union_schema;
use crate::pipeline::ColumnKindPolicy;
use crate::types::{Dataset, SourceDataset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Workbook,
}

impl SheetFormat {
    /// Format implied by the file extension, ignoring case.
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if ext == "csv" {
            Some(SheetFormat::Csv)
        } else if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
            Some(SheetFormat::Workbook)
        } else {
            None
        }
    }
}

/// Reads every CSV and workbook file of a directory as one source dataset
#[derive(Debug, Clone, Default)]
pub struct SheetDirectorySource {
    policy: ColumnKindPolicy,
    csv: CsvOptions,
}

impl SheetDirectorySource {
    pub fn new(policy: ColumnKindPolicy) -> Self {
        Self {
            policy,
            csv: CsvOptions::default(),
        }
    }

    pub fn with_csv_options(mut self, csv: CsvOptions) -> Self {
        self.csv = csv;
        self
    }

    /// Sheet files directly under `dir`, sorted by file name. A missing directory has none.
    async fn sheet_files(dir: &Path) -> Result<Vec<(PathBuf, SheetFormat)>> {
        if !tokio::fs::try_exists(dir).await? {
            warn!("Directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(format) = SheetFormat::of(&path) else {
                continue;
            };
            // Lock files left behind by an open spreadsheet
            let is_lock = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("~$"));
            if !is_lock && entry.file_type().await?.is_file() {
                files.push((path, format));
            }
        }
        files.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
        Ok(files)
    }

    fn parse(&self, name: &str, bytes: &[u8], format: SheetFormat) -> Result<SourceDataset> {
        match format {
            SheetFormat::Csv => parse_csv(name, bytes, &self.policy, &self.csv),
            SheetFormat::Workbook => parse_workbook(name, bytes, &self.policy),
        }
    }

    async fn read_all(&self, dir: &Path) -> Result<Vec<SourceDataset>> {
        let mut sources = Vec::new();
        for (path, format) in Self::sheet_files(dir).await? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("⚠️  Could not read {}: {}", path.display(), e);
                    continue;
                }
            };

            match self.parse(&name, &bytes, format) {
                Ok(source) => {
                    info!(
                        "📄 {}: {} row(s), {} column(s)",
                        name,
                        source.dataset.len(),
                        source.dataset.schema.len()
                    );
                    sources.push(source);
                }
                Err(e) => warn!("⚠️  Skipping {}: {}", name, e),
            }
        }
        Ok(sources)
    }
}

#[async_trait]
impl DatasetSourcePort for SheetDirectorySource {
    async fn load_sources(&self, location: &Path) -> Result<Vec<SourceDataset>> {
        self.read_all(location).await
    }

    async fn load_baseline(&self, location: &Path) -> Result<Option<Dataset>> {
        let sources = self.read_all(location).await?;
        if sources.is_empty() {
            info!("No baseline file under {}", location.display());
            return Ok(None);
        }

        let schema = union_schema(sources.iter().map(|s| &s.dataset.schema));
        let baseline = Dataset::concat(schema, sources.into_iter().map(|s| s.dataset));
        info!("📚 Baseline: {} row(s)", baseline.len());
        Ok(Some(baseline))
    }
}
