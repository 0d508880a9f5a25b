use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::pipeline::RunReport;
use crate::types::{Dataset, SourceDataset};

/// Where consolidated datasets come from
#[async_trait]
pub trait DatasetSourcePort: Send + Sync {
    /// Every readable dataset under `location`. Unreadable entries are skipped, not fatal.
    async fn load_sources(&self, location: &Path) -> Result<Vec<SourceDataset>>;

    /// All baseline files under `location` merged into one dataset; `None` when there are none.
    async fn load_baseline(&self, location: &Path) -> Result<Option<Dataset>>;
}

/// Where finished datasets are written
#[async_trait]
pub trait DatasetSinkPort: Send + Sync {
    /// Persist `dataset` and its report under a name derived from `prefix`; returns the data path.
    async fn write(&self, prefix: &str, dataset: &Dataset, report: &RunReport) -> Result<PathBuf>;
}
