use serde::{Deserialize, Serialize};

use super::identifier::IdentifierMode;
use super::report::Stage;
use crate::constants::{
    COMPARISON_IDENTIFIER_MATCHERS, DUPLICATE_SAMPLE_LIMIT, IDENTIFIER_COLUMN_MATCHERS, MASK_TOOL_MATCHERS,
    STRIP_TOOL_MATCHERS,
};
use crate::error::{ConsolidatorError, Result};

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Configuration for a complete pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub name: String,
    pub description: String,
    pub steps: Vec<PipelineStepConfig>,
    pub error_handling: ErrorHandlingStrategy,
    pub duplicate_sample_limit: usize,
    /// Columns compared without punctuation against the baseline
    pub comparison_identifier_matchers: Vec<String>,
}

/// Configuration for individual pipeline steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PipelineStepConfig {
    IntraDedup,
    BaselineDedup,
    Sanitize,
    Identifier {
        mode: IdentifierMode,
        matchers: Vec<String>,
    },
}

/// Strategy for handling structural failures inside a stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandlingStrategy {
    /// Abort the run on the first structural failure
    StopOnFirstError,
    /// Skip the failing stage and keep every row
    #[default]
    ContinueOnError,
}

impl PipelineConfig {
    fn preset(name: &str, description: &str, steps: Vec<PipelineStepConfig>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            steps,
            error_handling: ErrorHandlingStrategy::ContinueOnError,
            duplicate_sample_limit: DUPLICATE_SAMPLE_LIMIT,
            comparison_identifier_matchers: owned(COMPARISON_IDENTIFIER_MATCHERS),
        }
    }

    /// Merge, deduplicate, compare with the baseline, sanitize and mask
    pub fn full() -> Self {
        Self::preset(
            "full",
            "Merge sheets, drop internal and baseline duplicates, sanitize text and mask process numbers",
            vec![
                PipelineStepConfig::IntraDedup,
                PipelineStepConfig::BaselineDedup,
                PipelineStepConfig::Sanitize,
                PipelineStepConfig::Identifier {
                    mode: IdentifierMode::Mask,
                    matchers: owned(IDENTIFIER_COLUMN_MATCHERS),
                },
            ],
        )
    }

    /// Merge sheets, drop exact duplicates and sanitize text
    pub fn merge() -> Self {
        Self::preset(
            "merge",
            "Merge sheets, drop exact duplicates and sanitize text",
            vec![PipelineStepConfig::IntraDedup, PipelineStepConfig::Sanitize],
        )
    }

    /// Keep only incoming rows that are not in the baseline
    pub fn compare() -> Self {
        Self::preset(
            "compare",
            "Remove incoming rows that already exist in the baseline",
            vec![PipelineStepConfig::BaselineDedup],
        )
    }

    /// Mask the process number of a single sheet
    pub fn mask() -> Self {
        Self::preset(
            "mask",
            "Rewrite process numbers as 0000000-00.0000.0.00.0000",
            vec![PipelineStepConfig::Identifier {
                mode: IdentifierMode::Mask,
                matchers: owned(MASK_TOOL_MATCHERS),
            }],
        )
    }

    /// Strip dashes and dots from the process number of a single sheet
    pub fn strip() -> Self {
        Self::preset(
            "strip",
            "Remove dashes and dots from process numbers",
            vec![PipelineStepConfig::Identifier {
                mode: IdentifierMode::Unmask,
                matchers: owned(STRIP_TOOL_MATCHERS),
            }],
        )
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "full" => Some(Self::full()),
            "merge" => Some(Self::merge()),
            "compare" => Some(Self::compare()),
            "mask" => Some(Self::mask()),
            "strip" => Some(Self::strip()),
            _ => None,
        }
    }

    /// Replace the matchers of the identifier step, if any.
    pub fn with_identifier_matchers(mut self, matchers: Vec<String>) -> Self {
        for step in self.steps.iter_mut() {
            if let PipelineStepConfig::Identifier { matchers: m, .. } = step {
                *m = matchers.clone();
            }
        }
        self
    }

    pub fn with_error_handling(mut self, strategy: ErrorHandlingStrategy) -> Self {
        self.error_handling = strategy;
        self
    }

    /// Drop the identifier step.
    pub fn without_identifier(mut self) -> Self {
        self.steps
            .retain(|s| !matches!(s, PipelineStepConfig::Identifier { .. }));
        self
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(ConsolidatorError::InvalidPipeline(format!(
                "pipeline '{}' must have at least one step",
                self.name
            )));
        }

        // Stages only move forward
        let mut previous: Option<&PipelineStepConfig> = None;
        for step in &self.steps {
            if let Some(prev) = previous {
                if step.stage() <= prev.stage() {
                    return Err(ConsolidatorError::InvalidPipeline(format!(
                        "step '{}' cannot follow '{}'",
                        step.step_name(),
                        prev.step_name()
                    )));
                }
            }
            if let PipelineStepConfig::Identifier { matchers, .. } = step {
                if matchers.iter().all(|m| m.trim().is_empty()) {
                    return Err(ConsolidatorError::InvalidPipeline(
                        "identifier step needs at least one column matcher".to_string(),
                    ));
                }
            }
            previous = Some(step);
        }

        Ok(())
    }
}

impl PipelineStepConfig {
    /// Get the step name for ordering checks
    pub fn step_name(&self) -> &'static str {
        match self {
            PipelineStepConfig::IntraDedup => "intra_dedup",
            PipelineStepConfig::BaselineDedup => "baseline_dedup",
            PipelineStepConfig::Sanitize => "sanitize",
            PipelineStepConfig::Identifier { .. } => "identifier",
        }
    }

    /// Stage this step moves the dataset into
    pub fn stage(&self) -> Stage {
        match self {
            PipelineStepConfig::IntraDedup => Stage::IntraDeduped,
            PipelineStepConfig::BaselineDedup => Stage::BaselineDeduped,
            PipelineStepConfig::Sanitize => Stage::Sanitized,
            PipelineStepConfig::Identifier { .. } => Stage::IdentifierTransformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for name in ["full", "merge", "compare", "mask", "strip"] {
            let config = PipelineConfig::by_name(name).unwrap();
            assert!(config.validate().is_ok(), "preset {name} should validate");
        }
        assert!(PipelineConfig::by_name("unknown").is_none());
    }

    #[test]
    fn test_backwards_step_is_rejected() {
        let mut config = PipelineConfig::merge();
        config.steps = vec![PipelineStepConfig::Sanitize, PipelineStepConfig::IntraDedup];

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cannot follow"));
    }

    #[test]
    fn test_repeated_step_is_rejected() {
        let mut config = PipelineConfig::merge();
        config.steps = vec![PipelineStepConfig::Sanitize, PipelineStepConfig::Sanitize];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_pipeline_is_rejected() {
        let mut config = PipelineConfig::compare();
        config.steps.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identifier_matchers_can_be_replaced_or_removed() {
        let config = PipelineConfig::full().with_identifier_matchers(vec!["processo".to_string()]);
        let matchers = config.steps.iter().find_map(|s| match s {
            PipelineStepConfig::Identifier { matchers, .. } => Some(matchers.clone()),
            _ => None,
        });
        assert_eq!(matchers, Some(vec!["processo".to_string()]));

        let config = config.without_identifier();
        assert_eq!(config.steps.len(), 3);
    }

    #[test]
    fn test_step_config_serializes_with_step_tag() {
        let json = serde_json::to_value(&PipelineConfig::strip().steps[0]).unwrap();
        assert_eq!(json["step"], "identifier");
        assert_eq!(json["mode"], "unmask");
    }
}
