//! Error types for schedule configuration and lookup.

use thiserror::Error;

/// Errors raised while validating or querying a training schedule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    /// A stepwise learning-rate table needs an initial entry plus at least one change.
    #[error("stepwise learning-rate schedule needs at least 2 entries, got {found}")]
    TooFewSteps { found: usize },

    /// Step thresholds must be strictly increasing.
    #[error("schedule step thresholds must be strictly increasing: entry {index} has step {step} after {previous}")]
    NonIncreasingSteps {
        index: usize,
        previous: u64,
        step: u64,
    },

    /// The gradual-training table has no entries.
    #[error("gradual training schedule is empty")]
    EmptySchedule,

    /// Noam warm-up needs a positive number of warm-up steps.
    #[error("warmup_steps must be positive and finite, got {0}")]
    InvalidWarmup(f64),

    /// `lr_scheduler = "stepwise_gradual"` without `gradual_learning_rates`.
    #[error("stepwise gradual scheduler selected but no gradual_learning_rates configured")]
    MissingStepwiseRates,

    /// No gradual-training entry has a threshold at or below the scaled step.
    #[error("no gradual training schedule entry for step {step} (scaled step {scaled_step})")]
    NoEntryForStep { step: u64, scaled_step: u64 },

    /// A per-group value list does not match the number of optimizer groups.
    #[error("expected {expected} values (one per param group), got {found}")]
    GroupCountMismatch { expected: usize, found: usize },
}
