use tracing::{debug, info, warn};

use crate::pipeline::{PipelineEvent, ReportSink};

/// Renders pipeline events as structured log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReportSink;

impl ReportSink for TracingReportSink {
    fn emit(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { run_id, pipeline, sources } => {
                info!(%run_id, %pipeline, sources, "run started");
            }
            PipelineEvent::SourceIngested(source) => {
                info!(
                    source = %source.name,
                    rows = source.rows,
                    columns = source.columns,
                    text_columns = ?source.text_columns,
                    "source ingested"
                );
            }
            PipelineEvent::SchemaMismatch { unique_by_source } => {
                for (source, columns) in unique_by_source.iter().filter(|(_, c)| !c.is_empty()) {
                    warn!(%source, columns = ?columns, "columns missing from the other datasets");
                }
            }
            PipelineEvent::StageCompleted(result) => {
                info!(
                    stage = %result.stage,
                    rows_in = result.rows_in,
                    rows_out = result.rows_out,
                    skipped = result.is_skipped(),
                    "{}",
                    result.message
                );
            }
            PipelineEvent::DuplicateGroup(sample) => {
                debug!(
                    occurrences = sample.occurrences,
                    values = ?sample.values,
                    origins = ?sample.origins,
                    "duplicate group"
                );
            }
            PipelineEvent::IdentifierColumnSelected { column, mode } => {
                info!(%column, %mode, "identifier column selected");
            }
            PipelineEvent::AnomaliesRecorded { stage, count } => {
                warn!(%stage, count, "anomalies recorded");
            }
            PipelineEvent::RunFinished { run_id, rows, columns } => {
                info!(%run_id, rows, columns, "run finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Stage, StepResult};

    #[test]
    fn test_emits_without_subscriber() {
        let mut sink = TracingReportSink;
        sink.emit(PipelineEvent::StageCompleted(StepResult::skipped(
            Stage::BaselineDeduped,
            3,
            "no baseline supplied",
        )));
        sink.emit(PipelineEvent::AnomaliesRecorded {
            stage: Stage::Sanitized,
            count: 2,
        });
    }
}
