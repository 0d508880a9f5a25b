use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::app::ports::{DatasetSinkPort, DatasetSourcePort};
use crate::error::{ConsolidatorError, Result};
use crate::pipeline::{PipelineOrchestrator, PipelineStepConfig, ReportSink, RunReport};

/// One written output together with the report of the run that produced it
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub output_path: PathBuf,
    pub rows: usize,
}

/// Use case for loading sheets, running the pipeline and exporting the result
pub struct ConsolidateUseCase {
    orchestrator: PipelineOrchestrator,
    source: Box<dyn DatasetSourcePort>,
    output: Box<dyn DatasetSinkPort>,
}

impl ConsolidateUseCase {
    pub fn new(
        orchestrator: PipelineOrchestrator,
        source: Box<dyn DatasetSourcePort>,
        output: Box<dyn DatasetSinkPort>,
    ) -> Self {
        Self {
            orchestrator,
            source,
            output,
        }
    }

    fn needs_baseline(&self) -> bool {
        self.orchestrator
            .config()
            .steps
            .contains(&PipelineStepConfig::BaselineDedup)
    }

    /// Consolidate every sheet under `input_dir` into a single output.
    ///
    /// Nothing is written when the pipeline aborts.
    pub async fn run(
        &self,
        input_dir: &Path,
        baseline_dir: Option<&Path>,
        prefix: &str,
        events: &mut dyn ReportSink,
    ) -> Result<RunOutcome> {
        let sources = self.source.load_sources(input_dir).await?;
        if sources.is_empty() {
            warn!("No readable sheet under {}", input_dir.display());
        }

        let baseline = match baseline_dir {
            Some(dir) if self.needs_baseline() => self.source.load_baseline(dir).await?,
            _ => None,
        };

        let output = self.orchestrator.run(sources, baseline, events)?;
        let output_path = self.output.write(prefix, &output.dataset, &output.report).await?;
        info!("💾 Wrote {} row(s) to {}", output.dataset.len(), output_path.display());

        Ok(RunOutcome {
            rows: output.dataset.len(),
            report: output.report,
            output_path,
        })
    }

    /// Run the pipeline on each sheet on its own, writing `<stem>_<suffix>` per sheet.
    ///
    /// A sheet whose run aborts is logged and left out; the others still get written.
    pub async fn run_each(
        &self,
        input_dir: &Path,
        suffix: &str,
        events: &mut dyn ReportSink,
    ) -> Result<Vec<RunOutcome>> {
        let sources = self.source.load_sources(input_dir).await?;
        if sources.is_empty() {
            return Err(ConsolidatorError::NoDatasets);
        }

        let mut outcomes = Vec::with_capacity(sources.len());
        for source in sources {
            let stem = Path::new(&source.name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&source.name)
                .to_string();

            let output = match self.orchestrator.run(vec![source], None, events) {
                Ok(output) => output,
                Err(e) if e.is_structural() => {
                    warn!("⚠️  Skipping '{}': {}", stem, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let prefix = format!("{}_{}", stem, suffix);
            let output_path = self.output.write(&prefix, &output.dataset, &output.report).await?;
            info!("💾 {} -> {}", stem, output_path.display());
            outcomes.push(RunOutcome {
                rows: output.dataset.len(),
                report: output.report,
                output_path,
            });
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineConfig, SilentSink};
    use crate::types::{Column, ColumnKind, Dataset, Record, Schema, SourceDataset, Value};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn sheet(name: &str, ids: &[&str]) -> SourceDataset {
        let schema = Schema::from_columns([
            Column::new("nrprocesso", ColumnKind::Text),
            Column::new("valor", ColumnKind::Natural),
        ]);
        let mut dataset = Dataset::new(schema);
        for id in ids {
            dataset.push(
                Record::new()
                    .with("nrprocesso", Value::text(*id))
                    .with("valor", Value::Number(1.0)),
            );
        }
        SourceDataset::new(name, dataset)
    }

    struct MockSource {
        sources: Vec<SourceDataset>,
        baseline: Option<Dataset>,
    }

    #[async_trait]
    impl DatasetSourcePort for MockSource {
        async fn load_sources(&self, _location: &Path) -> Result<Vec<SourceDataset>> {
            Ok(self.sources.clone())
        }

        async fn load_baseline(&self, _location: &Path) -> Result<Option<Dataset>> {
            Ok(self.baseline.clone())
        }
    }

    struct MockSink {
        pub written: Arc<tokio::sync::Mutex<Vec<(String, usize)>>>,
    }

    impl MockSink {
        pub fn new() -> Self {
            Self {
                written: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl DatasetSinkPort for MockSink {
        async fn write(&self, prefix: &str, dataset: &Dataset, _report: &RunReport) -> Result<PathBuf> {
            self.written.lock().await.push((prefix.to_string(), dataset.len()));
            Ok(PathBuf::from(format!("{prefix}.csv")))
        }
    }

    #[tokio::test]
    async fn test_full_run_writes_single_output() {
        let source = MockSource {
            sources: vec![
                sheet("a.csv", &["0001234-56.2020.8.26.0100", "2"]),
                sheet("b.csv", &["0001234-56.2020.8.26.0100"]),
            ],
            baseline: None,
        };
        let output = MockSink::new();
        let written = output.written.clone();
        let use_case = ConsolidateUseCase::new(
            PipelineOrchestrator::new(PipelineConfig::full()).unwrap(),
            Box::new(source),
            Box::new(output),
        );

        let outcome = use_case
            .run(Path::new("in"), Some(Path::new("base")), "unique", &mut SilentSink)
            .await
            .unwrap();

        assert_eq!(outcome.rows, 2);
        assert_eq!(outcome.report.rows_removed_intra(), 1);
        assert_eq!(*written.lock().await, vec![("unique".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_aborted_run_writes_nothing() {
        let output = MockSink::new();
        let written = output.written.clone();
        let use_case = ConsolidateUseCase::new(
            PipelineOrchestrator::new(PipelineConfig::merge()).unwrap(),
            Box::new(MockSource {
                sources: vec![],
                baseline: None,
            }),
            Box::new(output),
        );

        let result = use_case.run(Path::new("in"), None, "consolidated", &mut SilentSink).await;
        assert!(matches!(result, Err(ConsolidatorError::NoDatasets)));
        assert!(written.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_each_writes_one_file_per_sheet() {
        let output = MockSink::new();
        let written = output.written.clone();
        let use_case = ConsolidateUseCase::new(
            PipelineOrchestrator::new(PipelineConfig::mask()).unwrap(),
            Box::new(MockSource {
                sources: vec![sheet("jan.csv", &["12345678901234567890"]), sheet("feb.csv", &["1"])],
                baseline: None,
            }),
            Box::new(output),
        );

        let outcomes = use_case.run_each(Path::new("in"), "masked", &mut SilentSink).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].report.identifiers_masked(), 1);

        let prefixes: Vec<String> = written.lock().await.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(prefixes, vec!["jan_masked", "feb_masked"]);
    }
}
