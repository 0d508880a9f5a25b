pub mod consolidate_use_case;
pub mod ports;

pub use consolidate_use_case::{ConsolidateUseCase, RunOutcome};
