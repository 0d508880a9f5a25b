use metrics::counter;
use tracing::{info, instrument, warn};

use super::dedup::{baseline_dedup, intra_batch_dedup};
use super::identifier::{select_identifier_column, transform_column, IdentifierMode};
use super::pipeline_config::{ErrorHandlingStrategy, PipelineStepConfig};
use super::report::{PipelineEvent, ReportSink, RunReport, Stage, StepResult};
use super::sanitize::sanitize;
use super::schema::reconcile;
use crate::error::{ConsolidatorError, Result};
use crate::types::Dataset;

/// Everything a step may read or append to besides the dataset it owns
pub struct StepContext<'a> {
    pub report: &'a mut RunReport,
    pub sink: &'a mut dyn ReportSink,
    pub baseline: Option<&'a Dataset>,
    pub error_handling: ErrorHandlingStrategy,
    pub duplicate_sample_limit: usize,
    pub comparison_identifier_matchers: &'a [String],
}

/// Dataset returned by a step together with what the step did
#[derive(Debug)]
pub struct StepOutput {
    pub dataset: Dataset,
    pub result: StepResult,
}

impl StepOutput {
    fn skipped(stage: Stage, dataset: Dataset, reason: impl Into<String>) -> Self {
        let result = StepResult::skipped(stage, dataset.len(), reason);
        Self { dataset, result }
    }
}

/// Common trait for all pipeline steps
///
/// A step takes ownership of the dataset and hands it back, transformed or not.
pub trait PipelineStep {
    fn execute(&self, dataset: Dataset, ctx: &mut StepContext<'_>) -> Result<StepOutput>;

    fn stage(&self) -> Stage;

    fn step_name(&self) -> &'static str;
}

/// Create a step instance from configuration
pub fn create_step(config: &PipelineStepConfig) -> Box<dyn PipelineStep> {
    match config {
        PipelineStepConfig::IntraDedup => Box::new(IntraDedupStep),
        PipelineStepConfig::BaselineDedup => Box::new(BaselineDedupStep),
        PipelineStepConfig::Sanitize => Box::new(SanitizeStep),
        PipelineStepConfig::Identifier { mode, matchers } => Box::new(IdentifierStep {
            mode: *mode,
            matchers: matchers.clone(),
        }),
    }
}

/// Removes exact duplicate rows within the consolidated batch
pub struct IntraDedupStep;

impl PipelineStep for IntraDedupStep {
    #[instrument(skip_all, fields(step = "intra_dedup", rows = dataset.len()))]
    fn execute(&self, dataset: Dataset, ctx: &mut StepContext<'_>) -> Result<StepOutput> {
        let (dataset, report) = intra_batch_dedup(dataset, ctx.duplicate_sample_limit);

        for sample in &report.samples {
            ctx.sink.emit(PipelineEvent::DuplicateGroup(sample.clone()));
        }
        counter!("consolidator_intra_duplicates_removed_total").increment(report.rows_dropped as u64);

        let message = if report.rows_dropped > 0 {
            format!(
                "removed {} duplicate row(s) in {} group(s) ({:.2}%)",
                report.rows_dropped,
                report.duplicate_groups,
                report.duplication_rate()
            )
        } else {
            "no internal duplicates".to_string()
        };
        let result = StepResult::applied(self.stage(), report.rows_before, report.rows_after, message);
        ctx.report.intra_dedup = Some(report);

        Ok(StepOutput { dataset, result })
    }

    fn stage(&self) -> Stage {
        Stage::IntraDeduped
    }

    fn step_name(&self) -> &'static str {
        "intra_dedup"
    }
}

/// Removes rows already present in the baseline dataset
pub struct BaselineDedupStep;

impl PipelineStep for BaselineDedupStep {
    #[instrument(skip_all, fields(step = "baseline_dedup", rows = dataset.len()))]
    fn execute(&self, dataset: Dataset, ctx: &mut StepContext<'_>) -> Result<StepOutput> {
        let Some(baseline) = ctx.baseline else {
            info!("No baseline supplied; skipping comparison");
            return Ok(StepOutput::skipped(self.stage(), dataset, "no baseline supplied"));
        };
        if baseline.is_empty() {
            info!("Baseline has no rows; skipping comparison");
            return Ok(StepOutput::skipped(self.stage(), dataset, "baseline is empty"));
        }

        let comparison = match reconcile(&[("incoming", &dataset.schema), ("baseline", &baseline.schema)]) {
            Ok(reconciled) => {
                if !reconciled.identical {
                    ctx.sink.emit(PipelineEvent::SchemaMismatch {
                        unique_by_source: reconciled.unique_by_source.clone(),
                    });
                }
                reconciled.comparison
            }
            Err(err @ ConsolidatorError::NoCommonColumns { .. }) => match ctx.error_handling {
                ErrorHandlingStrategy::StopOnFirstError => return Err(err),
                ErrorHandlingStrategy::ContinueOnError => {
                    warn!("Baseline shares no column with the incoming data; comparison skipped");
                    return Ok(StepOutput::skipped(
                        self.stage(),
                        dataset,
                        "no common columns with baseline",
                    ));
                }
            },
            Err(err) => return Err(err),
        };

        let (dataset, report) = baseline_dedup(dataset, baseline, &comparison, ctx.comparison_identifier_matchers);
        counter!("consolidator_baseline_duplicates_removed_total").increment(report.rows_removed as u64);

        let result = match &report.skipped {
            Some(reason) => StepResult::skipped(self.stage(), dataset.len(), reason.clone()),
            None => StepResult::applied(
                self.stage(),
                report.rows_before,
                dataset.len(),
                format!(
                    "removed {} row(s) already in the baseline ({:.2}%) using {} column(s)",
                    report.rows_removed,
                    report.duplication_rate(),
                    report.comparison_columns.len()
                ),
            ),
        };
        ctx.report.baseline = Some(report);

        Ok(StepOutput { dataset, result })
    }

    fn stage(&self) -> Stage {
        Stage::BaselineDeduped
    }

    fn step_name(&self) -> &'static str {
        "baseline_dedup"
    }
}

/// Normalizes whitespace in free-text columns
pub struct SanitizeStep;

impl PipelineStep for SanitizeStep {
    #[instrument(skip_all, fields(step = "sanitize", rows = dataset.len()))]
    fn execute(&self, dataset: Dataset, ctx: &mut StepContext<'_>) -> Result<StepOutput> {
        let rows = dataset.len();
        let (dataset, report) = sanitize(dataset);

        if report.anomalies > 0 {
            ctx.report.anomalies += report.anomalies;
            ctx.sink.emit(PipelineEvent::AnomaliesRecorded {
                stage: self.stage(),
                count: report.anomalies,
            });
        }
        counter!("consolidator_columns_sanitized_total").increment(report.columns_sanitized.len() as u64);

        let result = StepResult::applied(
            self.stage(),
            rows,
            dataset.len(),
            format!(
                "sanitized {} text column(s), {} value(s) changed",
                report.columns_sanitized.len(),
                report.values_changed
            ),
        );
        ctx.report.sanitize = Some(report);

        Ok(StepOutput { dataset, result })
    }

    fn stage(&self) -> Stage {
        Stage::Sanitized
    }

    fn step_name(&self) -> &'static str {
        "sanitize"
    }
}

/// Masks or unmasks the judicial-process number column
pub struct IdentifierStep {
    pub mode: IdentifierMode,
    pub matchers: Vec<String>,
}

impl PipelineStep for IdentifierStep {
    #[instrument(skip_all, fields(step = "identifier", mode = %self.mode, rows = dataset.len()))]
    fn execute(&self, dataset: Dataset, ctx: &mut StepContext<'_>) -> Result<StepOutput> {
        let Some(column) = select_identifier_column(&dataset.schema, &self.matchers).map(str::to_string) else {
            warn!(
                "No process-number column found among: {}",
                dataset.schema.names().take(5).collect::<Vec<_>>().join(", ")
            );
            return Ok(StepOutput::skipped(self.stage(), dataset, "no identifier column found"));
        };

        info!("Identifier column: '{}'", column);
        ctx.sink.emit(PipelineEvent::IdentifierColumnSelected {
            column: column.clone(),
            mode: self.mode,
        });

        let rows = dataset.len();
        let (dataset, report) = transform_column(dataset, &column, self.mode);
        counter!("consolidator_identifiers_transformed_total", "mode" => self.mode.to_string())
            .increment(report.transformed as u64);

        let message = match self.mode {
            IdentifierMode::Mask => format!(
                "masked {}/{} value(s) in '{}'",
                report.transformed, rows, column
            ),
            IdentifierMode::Unmask => format!(
                "stripped separators from {}/{} value(s) in '{}'",
                report.transformed, rows, column
            ),
        };
        let result = StepResult::applied(self.stage(), rows, dataset.len(), message);
        ctx.report.identifier = Some(report);

        Ok(StepOutput { dataset, result })
    }

    fn stage(&self) -> Stage {
        Stage::IdentifierTransformed
    }

    fn step_name(&self) -> &'static str {
        "identifier"
    }
}
