//! Learning-rate schedules.
//!
//! A closed set of schedules ([`LrSchedule`]) behind one query,
//! [`LrSchedule::rate_at`], plus a stateful [`LrScheduler`] that tracks the
//! optimizer step counter and yields one rate per param group.

use prosody_common::{LrSchedulerKind, ScheduleError, StepwiseLrConfig, TrainingConfig};

use crate::optimizer::GroupedAdamW;

// ── Noam warm-up ────────────────────────────────────────────────────────────

/// Inverse-square-root warm-up ("Noam") learning rate.
///
/// Rises linearly until `warmup_steps`, then decays as `step^-0.5`; both
/// branches meet at `step == warmup_steps`. `global_step` is zero-based.
pub fn noam_lr(init_lr: f64, global_step: u64, warmup_steps: f64) -> f64 {
    let step = global_step as f64 + 1.0;
    noam_factor(step, warmup_steps) * init_lr
}

fn noam_factor(step: f64, warmup_steps: f64) -> f64 {
    warmup_steps.sqrt() * f64::min(step * warmup_steps.powf(-1.5), step.powf(-0.5))
}

// ── Schedule variants ───────────────────────────────────────────────────────

/// How the learning rate evolves with the optimizer step.
#[derive(Debug, Clone, PartialEq)]
pub enum LrSchedule {
    /// Keep each group's base rate.
    Constant,
    /// Warm-up then inverse-square-root decay, scaled by each base rate.
    Noam { warmup_steps: f64 },
    /// Piecewise-constant table; the same rate for every group.
    StepwiseGradual(StepwiseLrConfig),
}

impl LrSchedule {
    pub fn noam(warmup_steps: f64) -> Result<Self, ScheduleError> {
        if !(warmup_steps.is_finite() && warmup_steps > 0.0) {
            return Err(ScheduleError::InvalidWarmup(warmup_steps));
        }
        Ok(Self::Noam { warmup_steps })
    }

    /// Build the schedule selected by `config.lr_scheduler`.
    pub fn from_config(config: &TrainingConfig) -> Result<Self, ScheduleError> {
        match config.lr_scheduler {
            LrSchedulerKind::Noam => Self::noam(config.warmup_steps),
            LrSchedulerKind::StepwiseGradual => config
                .gradual_learning_rates
                .clone()
                .map(Self::StepwiseGradual)
                .ok_or(ScheduleError::MissingStepwiseRates),
            LrSchedulerKind::None => Ok(Self::Constant),
        }
    }

    /// Rate for a group with base rate `base_lr` at scheduler step `step`.
    ///
    /// Step 0 is treated as step 1, matching the optimizer-step convention of
    /// [`LrScheduler`].
    pub fn rate_at(&self, base_lr: f64, step: u64) -> f64 {
        let step = step.max(1);
        match self {
            Self::Constant => base_lr,
            Self::Noam { warmup_steps } => base_lr * noam_factor(step as f64, *warmup_steps),
            Self::StepwiseGradual(table) => table.rate_at(step),
        }
    }
}

// ── Stateful scheduler ──────────────────────────────────────────────────────

/// Per-group learning-rate scheduler.
///
/// `last_step` follows the usual optimizer convention: `-1` before any
/// step. Construction advances once, so a fresh scheduler reports the rates
/// for step 0 (evaluated as step 1).
#[derive(Debug, Clone)]
pub struct LrScheduler {
    schedule: LrSchedule,
    base_lrs: Vec<f64>,
    last_step: i64,
}

impl LrScheduler {
    pub fn new(schedule: LrSchedule, base_lrs: Vec<f64>, last_step: i64) -> Self {
        let mut scheduler = Self {
            schedule,
            base_lrs,
            last_step,
        };
        scheduler.advance();
        scheduler
    }

    /// Scheduler over the current learning rates of `optimizer`'s groups.
    pub fn for_optimizer(schedule: LrSchedule, optimizer: &GroupedAdamW, last_step: i64) -> Self {
        Self::new(schedule, optimizer.learning_rates(), last_step)
    }

    /// Rates at an arbitrary step, one per group.
    pub fn rates_at(&self, step: i64) -> Vec<f64> {
        let step = step.max(1) as u64;
        self.base_lrs
            .iter()
            .map(|&base| self.schedule.rate_at(base, step))
            .collect()
    }

    /// Rates at the current step.
    pub fn current_rates(&self) -> Vec<f64> {
        self.rates_at(self.last_step)
    }

    pub fn advance(&mut self) {
        self.last_step += 1;
    }

    /// Push the current rates into the optimizer.
    pub fn apply(&self, optimizer: &mut GroupedAdamW) -> Result<(), ScheduleError> {
        optimizer.set_learning_rates(&self.current_rates())
    }

    pub fn last_step(&self) -> i64 {
        self.last_step
    }

    pub fn base_lrs(&self) -> &[f64] {
        &self.base_lrs
    }

    pub fn schedule(&self) -> &LrSchedule {
        &self.schedule
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
