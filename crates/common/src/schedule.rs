//! Step-indexed schedule tables.
//!
//! Both tables are stored in the training config as JSON arrays of tuples,
//! e.g. `[[0, 1e-3], [10000, 5e-4]]`, and are validated when deserialised:
//! thresholds must be strictly increasing, so a loaded table can be scanned
//! without further checks.

use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

fn check_increasing(steps: impl Iterator<Item = u64>) -> Result<(), ScheduleError> {
    let mut previous: Option<u64> = None;
    for (index, step) in steps.enumerate() {
        if let Some(previous) = previous {
            if step <= previous {
                return Err(ScheduleError::NonIncreasingSteps {
                    index,
                    previous,
                    step,
                });
            }
        }
        previous = Some(step);
    }
    Ok(())
}

// ── Stepwise learning rates ─────────────────────────────────────────────────

/// One `(step, lr)` row of a stepwise learning-rate table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrStep {
    pub step: u64,
    pub lr: f64,
}

/// Piecewise-constant learning-rate table.
///
/// The first row is the initial rate; it stays active until the second
/// threshold is reached, whatever its own threshold says.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(u64, f64)>", into = "Vec<(u64, f64)>")]
pub struct StepwiseLrConfig {
    steps: Vec<LrStep>,
}

impl StepwiseLrConfig {
    pub fn new(steps: Vec<LrStep>) -> Result<Self, ScheduleError> {
        if steps.len() < 2 {
            return Err(ScheduleError::TooFewSteps { found: steps.len() });
        }
        check_increasing(steps.iter().map(|s| s.step))?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[LrStep] {
        &self.steps
    }

    /// Learning rate active at `step`: the rate of the last row whose
    /// threshold is `<= step`, or the initial rate below the second threshold.
    pub fn rate_at(&self, step: u64) -> f64 {
        let initial = self.steps[0].lr;
        if step < self.steps[1].step {
            return initial;
        }
        self.steps
            .iter()
            .rev()
            .find(|s| s.step <= step)
            .map_or(initial, |s| s.lr)
    }
}

impl TryFrom<Vec<(u64, f64)>> for StepwiseLrConfig {
    type Error = ScheduleError;

    fn try_from(rows: Vec<(u64, f64)>) -> Result<Self, Self::Error> {
        Self::new(rows.into_iter().map(|(step, lr)| LrStep { step, lr }).collect())
    }
}

impl From<StepwiseLrConfig> for Vec<(u64, f64)> {
    fn from(config: StepwiseLrConfig) -> Self {
        config.steps.into_iter().map(|s| (s.step, s.lr)).collect()
    }
}

// ── Gradual training ────────────────────────────────────────────────────────

/// One `(step, batch_size, grad_accum_steps)` row of a gradual-training table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradualStep {
    pub step: u64,
    pub batch_size: usize,
    pub grad_accum_steps: usize,
}

/// Batch-size / accumulation table, indexed by device-scaled step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<(u64, usize, usize)>",
    into = "Vec<(u64, usize, usize)>"
)]
pub struct GradualTrainingConfig {
    steps: Vec<GradualStep>,
}

impl GradualTrainingConfig {
    pub fn new(steps: Vec<GradualStep>) -> Result<Self, ScheduleError> {
        if steps.is_empty() {
            return Err(ScheduleError::EmptySchedule);
        }
        check_increasing(steps.iter().map(|s| s.step))?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[GradualStep] {
        &self.steps
    }

    /// Last row whose threshold is `<= scaled_step`, if any.
    pub fn entry_at(&self, scaled_step: u64) -> Option<&GradualStep> {
        self.steps.iter().rev().find(|s| s.step <= scaled_step)
    }
}

impl TryFrom<Vec<(u64, usize, usize)>> for GradualTrainingConfig {
    type Error = ScheduleError;

    fn try_from(rows: Vec<(u64, usize, usize)>) -> Result<Self, Self::Error> {
        Self::new(
            rows.into_iter()
                .map(|(step, batch_size, grad_accum_steps)| GradualStep {
                    step,
                    batch_size,
                    grad_accum_steps,
                })
                .collect(),
        )
    }
}

impl From<GradualTrainingConfig> for Vec<(u64, usize, usize)> {
    fn from(config: GradualTrainingConfig) -> Self {
        config
            .steps
            .into_iter()
            .map(|s| (s.step, s.batch_size, s.grad_accum_steps))
            .collect()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
