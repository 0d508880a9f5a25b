// Consolidation pipeline: reconcile, deduplicate, sanitize, normalize identifiers

pub mod coercion;
pub mod dedup;
pub mod identifier;
pub mod orchestrator;
pub mod pipeline_config;
pub mod report;
pub mod sanitize;
pub mod schema;
pub mod steps;

// Re-export key types for convenience
pub use coercion::ColumnKindPolicy;
pub use dedup::{baseline_dedup, intra_batch_dedup, CompositeKeyBuilder};
pub use identifier::{mask, select_identifier_column, unmask, IdentifierMode, MaskOutcome, UnchangedReason};
pub use orchestrator::{PipelineOrchestrator, PipelineOutput};
pub use pipeline_config::{ErrorHandlingStrategy, PipelineConfig, PipelineStepConfig};
pub use report::{CollectingSink, PipelineEvent, ReportSink, RunReport, SilentSink, Stage, StepResult};
pub use sanitize::{sanitize, sanitize_text};
pub use schema::{reconcile, ReconciledSchema};
pub use steps::{PipelineStep, StepContext, StepOutput};
