use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::dedup::{rate, BaselineReport, IntraDedupReport};
use super::identifier::IdentifierReport;
use super::sanitize::SanitizeReport;
use crate::types::Dataset;

/// Pipeline stages in their only permitted order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingested,
    SchemaReconciled,
    IntraDeduped,
    BaselineDeduped,
    Sanitized,
    IdentifierTransformed,
    Final,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Ingested => "ingested",
            Stage::SchemaReconciled => "schema_reconciled",
            Stage::IntraDeduped => "intra_deduped",
            Stage::BaselineDeduped => "baseline_deduped",
            Stage::Sanitized => "sanitized",
            Stage::IdentifierTransformed => "identifier_transformed",
            Stage::Final => "final",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Applied,
    Skipped { reason: String },
}

/// Result of executing a pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub stage: Stage,
    #[serde(flatten)]
    pub status: StageStatus,
    pub rows_in: usize,
    pub rows_out: usize,
    pub message: String,
}

impl StepResult {
    pub fn applied(stage: Stage, rows_in: usize, rows_out: usize, message: String) -> Self {
        Self {
            stage,
            status: StageStatus::Applied,
            rows_in,
            rows_out,
            message,
        }
    }

    pub fn skipped(stage: Stage, rows: usize, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            stage,
            message: format!("skipped: {}", reason),
            status: StageStatus::Skipped { reason },
            rows_in: rows,
            rows_out: rows,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, StageStatus::Skipped { .. })
    }
}

/// Provenance of one ingested source
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceSummary {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub text_columns: Vec<String>,
    pub checksum: Option<String>,
    pub anomalies: usize,
}

/// Reconciliation outcome as recorded in the report
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaReport {
    pub consolidated_columns: Vec<String>,
    pub comparison_columns: Vec<String>,
    pub unique_by_source: BTreeMap<String, Vec<String>>,
    pub identical: bool,
}

/// Fill statistics of the final dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QualitySummary {
    pub rows: usize,
    pub columns: usize,
    pub total_cells: usize,
    pub empty_cells: usize,
    /// Percentage of filled cells
    pub fill_rate: f64,
    /// Percentage of ingested rows dropped as internal duplicates
    pub intra_duplication_rate: f64,
    /// Percentage of deduplicated rows already present in the baseline
    pub baseline_duplication_rate: f64,
}

impl QualitySummary {
    /// Fill statistics of `dataset`; the duplication rates come from `report`.
    pub fn measure(dataset: &Dataset, report: &RunReport) -> Self {
        let total_cells = dataset.total_cells();
        let empty_cells = dataset.null_cells();
        Self {
            rows: dataset.len(),
            columns: dataset.schema.len(),
            total_cells,
            empty_cells,
            fill_rate: rate(total_cells - empty_cells, total_cells),
            intra_duplication_rate: report.intra_dedup.as_ref().map_or(0.0, |r| r.duplication_rate()),
            baseline_duplication_rate: report.baseline.as_ref().map_or(0.0, |r| r.duplication_rate()),
        }
    }

    pub fn fill_rate(&self) -> f64 {
        self.fill_rate
    }
}

/// Everything a run did, built stage by stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceSummary>,
    pub schema: Option<SchemaReport>,
    pub intra_dedup: Option<IntraDedupReport>,
    pub baseline: Option<BaselineReport>,
    pub sanitize: Option<SanitizeReport>,
    pub identifier: Option<IdentifierReport>,
    pub quality: Option<QualitySummary>,
    pub stages: Vec<StepResult>,
    pub anomalies: usize,
}

impl RunReport {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            started_at: Utc::now(),
            finished_at: None,
            sources: Vec::new(),
            schema: None,
            intra_dedup: None,
            baseline: None,
            sanitize: None,
            identifier: None,
            quality: None,
            stages: Vec::new(),
            anomalies: 0,
        }
    }

    pub fn rows_ingested(&self) -> usize {
        self.sources.iter().map(|s| s.rows).sum()
    }

    pub fn rows_removed_intra(&self) -> usize {
        self.intra_dedup.as_ref().map_or(0, |r| r.rows_dropped)
    }

    pub fn rows_removed_baseline(&self) -> usize {
        self.baseline.as_ref().map_or(0, |r| r.rows_removed)
    }

    pub fn columns_sanitized(&self) -> usize {
        self.sanitize.as_ref().map_or(0, |r| r.columns_sanitized.len())
    }

    pub fn identifiers_masked(&self) -> usize {
        self.identifier.as_ref().map_or(0, |r| r.transformed)
    }

    pub fn stage(&self, stage: Stage) -> Option<&StepResult> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    pub(crate) fn complete(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

/// Structured progress emitted while a pipeline runs
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted { run_id: Uuid, pipeline: String, sources: usize },
    SourceIngested(SourceSummary),
    SchemaMismatch { unique_by_source: BTreeMap<String, Vec<String>> },
    StageCompleted(StepResult),
    DuplicateGroup(super::dedup::DuplicateSample),
    IdentifierColumnSelected { column: String, mode: super::identifier::IdentifierMode },
    AnomaliesRecorded { stage: Stage, count: usize },
    RunFinished { run_id: Uuid, rows: usize, columns: usize },
}

/// Receives pipeline events; implementations decide how (or whether) to render them.
pub trait ReportSink {
    fn emit(&mut self, event: PipelineEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl ReportSink for SilentSink {
    fn emit(&mut self, _event: PipelineEvent) {}
}

/// Keeps every event in memory
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub events: Vec<PipelineEvent>,
}

impl ReportSink for CollectingSink {
    fn emit(&mut self, event: PipelineEvent) {
        self.events.push(event);
    }
}
