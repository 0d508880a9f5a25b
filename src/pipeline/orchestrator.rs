use metrics::counter;
use tracing::{error, info, warn};

use super::pipeline_config::{ErrorHandlingStrategy, PipelineConfig};
use super::report::{
    PipelineEvent, QualitySummary, ReportSink, RunReport, SchemaReport, SourceSummary, Stage, StepResult,
};
use super::schema::{reconcile, union_schema};
use super::steps::{create_step, StepContext};
use crate::error::{ConsolidatorError, Result};
use crate::types::{ColumnKind, Dataset, Schema, SourceDataset};

/// Final dataset of a run with the report describing how it was produced
#[derive(Debug)]
pub struct PipelineOutput {
    pub dataset: Dataset,
    pub report: RunReport,
}

/// Runs the configured stages, strictly in order, over one batch of sources
#[derive(Debug, Clone)]
pub struct PipelineOrchestrator {
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    /// Create an orchestrator; the configuration is validated up front
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a complete pipeline over `sources`.
    ///
    /// Only structural failures return an error; skipped stages and per-row
    /// anomalies end up in the report.
    pub fn run(
        &self,
        sources: Vec<SourceDataset>,
        baseline: Option<Dataset>,
        sink: &mut dyn ReportSink,
    ) -> Result<PipelineOutput> {
        if sources.is_empty() {
            error!("No ingestible dataset; aborting pipeline '{}'", self.config.name);
            return Err(ConsolidatorError::NoDatasets);
        }

        let mut report = RunReport::new(self.config.name.clone());
        info!("🚀 Starting pipeline '{}' ({} source(s))", self.config.name, sources.len());
        info!("📋 {}", self.config.description);
        sink.emit(PipelineEvent::RunStarted {
            run_id: report.run_id,
            pipeline: self.config.name.clone(),
            sources: sources.len(),
        });

        // Ingested
        for source in &sources {
            let summary = SourceSummary {
                name: source.name.clone(),
                rows: source.dataset.len(),
                columns: source.dataset.schema.len(),
                text_columns: source
                    .dataset
                    .schema
                    .columns()
                    .iter()
                    .filter(|c| c.kind == ColumnKind::Text)
                    .map(|c| c.name.clone())
                    .collect(),
                checksum: source.checksum.clone(),
                anomalies: source.anomalies,
            };
            counter!("consolidator_rows_ingested_total").increment(summary.rows as u64);
            report.anomalies += source.anomalies;
            report.sources.push(summary.clone());
            sink.emit(PipelineEvent::SourceIngested(summary));
        }
        let rows_ingested = report.rows_ingested();
        self.record(
            &mut report,
            sink,
            StepResult::applied(
                Stage::Ingested,
                rows_ingested,
                rows_ingested,
                format!("read {} row(s) from {} source(s)", rows_ingested, sources.len()),
            ),
        );

        // SchemaReconciled
        let mut dataset = self.consolidate(sources, &mut report, sink)?;

        for step_config in &self.config.steps {
            let step = create_step(step_config);
            info!("🔄 Executing step: {}", step.step_name());

            let mut ctx = StepContext {
                report: &mut report,
                sink: &mut *sink,
                baseline: baseline.as_ref(),
                error_handling: self.config.error_handling,
                duplicate_sample_limit: self.config.duplicate_sample_limit,
                comparison_identifier_matchers: &self.config.comparison_identifier_matchers,
            };
            let output = step.execute(dataset, &mut ctx).map_err(|e| {
                error!("❌ Step '{}' aborted the run: {}", step.step_name(), e);
                e
            })?;
            dataset = output.dataset;
            self.record(&mut report, sink, output.result);
        }

        report.quality = Some(QualitySummary::measure(&dataset, &report));
        self.record(
            &mut report,
            sink,
            StepResult::applied(Stage::Final, dataset.len(), dataset.len(), "ready for export".to_string()),
        );
        report.complete();

        sink.emit(PipelineEvent::RunFinished {
            run_id: report.run_id,
            rows: dataset.len(),
            columns: dataset.schema.len(),
        });
        info!(
            "🎉 Pipeline '{}' finished: {} row(s) in, {} row(s) out",
            self.config.name,
            rows_ingested,
            dataset.len()
        );

        Ok(PipelineOutput { dataset, report })
    }

    /// Reconcile schemas and concatenate every source into one dataset.
    fn consolidate(
        &self,
        sources: Vec<SourceDataset>,
        report: &mut RunReport,
        sink: &mut dyn ReportSink,
    ) -> Result<Dataset> {
        let named: Vec<(&str, &Schema)> =
            sources.iter().map(|s| (s.name.as_str(), &s.dataset.schema)).collect();

        let (schema, schema_report, message) = match reconcile(&named) {
            Ok(reconciled) => {
                if !reconciled.identical {
                    warn!(
                        "⚠️ Columns differ between sources; {} common column(s)",
                        reconciled.comparison.len()
                    );
                    sink.emit(PipelineEvent::SchemaMismatch {
                        unique_by_source: reconciled.unique_by_source.clone(),
                    });
                }
                let message = format!(
                    "{} consolidated column(s), {} common",
                    reconciled.consolidated.len(),
                    reconciled.comparison.len()
                );
                let schema_report = SchemaReport {
                    consolidated_columns: reconciled.consolidated.names().map(str::to_string).collect(),
                    comparison_columns: reconciled.comparison,
                    unique_by_source: reconciled.unique_by_source,
                    identical: reconciled.identical,
                };
                (reconciled.consolidated, schema_report, message)
            }
            Err(ConsolidatorError::NoCommonColumns { unique_by_source }) => {
                if self.config.error_handling == ErrorHandlingStrategy::StopOnFirstError {
                    error!("❌ Sources share no column; stopping");
                    return Err(ConsolidatorError::NoCommonColumns { unique_by_source });
                }
                warn!("⚠️ Sources share no column; consolidating without a comparison schema");
                sink.emit(PipelineEvent::SchemaMismatch {
                    unique_by_source: unique_by_source.clone(),
                });
                let union = union_schema(named.iter().map(|(_, s)| *s));
                let schema_report = SchemaReport {
                    consolidated_columns: union.names().map(str::to_string).collect(),
                    comparison_columns: Vec::new(),
                    unique_by_source,
                    identical: false,
                };
                let message = format!("no common column; {} column(s) merged by union", union.len());
                (union, schema_report, message)
            }
            Err(e) => return Err(e),
        };

        report.schema = Some(schema_report);
        let rows = report.rows_ingested();
        let dataset = Dataset::concat(
            schema,
            sources.into_iter().map(|mut s| {
                s.stamp_origins();
                s.dataset
            }),
        );
        info!("✓ Consolidated {} row(s) x {} column(s)", dataset.len(), dataset.schema.len());
        self.record(
            report,
            sink,
            StepResult::applied(Stage::SchemaReconciled, rows, dataset.len(), message),
        );

        Ok(dataset)
    }

    fn record(&self, report: &mut RunReport, sink: &mut dyn ReportSink, result: StepResult) {
        report.stages.push(result.clone());
        sink.emit(PipelineEvent::StageCompleted(result));
    }
}
