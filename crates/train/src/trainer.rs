//! Trainer: one optimisation step over a caller-computed loss.
//!
//! The model and its forward pass stay with the caller. The trainer owns
//! the optimisation side: backward, gradient guard, optional decoupled
//! weight decay, grouped AdamW and LR-schedule advance.

use candle_core::{DType, Device, Tensor};
use candle_nn::ParamsAdamW;

use prosody_common::{ScheduleError, TrainingConfig};

use crate::env::TrainingEnv;
use crate::grad::check_gradient;
use crate::gradual::gradual_training_scheduler;
use crate::optimizer::GroupedAdamW;
use crate::params::ParamSet;
use crate::scheduler::{LrSchedule, LrScheduler};
use crate::weight_decay::set_weight_decay;

/// Metrics returned after each training step.
#[derive(Debug, Clone)]
pub struct StepMetrics {
    pub step: u64,
    /// Mean of the micro-batch losses.
    pub loss: f32,
    /// Learning rates used for this step, one per param group.
    pub lrs: Vec<f64>,
    pub grad_norm: f64,
    /// The optimizer step was dropped because of a non-finite gradient.
    pub skipped: bool,
}

/// The optimisation engine for one training run.
pub struct Trainer {
    params: ParamSet,
    optimizer: GroupedAdamW,
    lr_scheduler: LrScheduler,
    pub config: TrainingConfig,
    env: TrainingEnv,
    pub global_step: u64,
    pub skipped_steps: u64,
}

impl Trainer {
    pub fn new(params: ParamSet, config: TrainingConfig, env: TrainingEnv) -> anyhow::Result<Self> {
        let groups = set_weight_decay(&params, config.weight_decay, &config.skip_list());
        let base = ParamsAdamW {
            lr: config.lr,
            ..Default::default()
        };
        let mut optimizer = if config.decoupled_weight_decay {
            GroupedAdamW::decoupled(groups, base)?
        } else {
            GroupedAdamW::new(groups, base)?
        };

        let schedule = LrSchedule::from_config(&config)?;
        let lr_scheduler = LrScheduler::for_optimizer(schedule, &optimizer, -1);
        lr_scheduler.apply(&mut optimizer)?;

        Ok(Self {
            params,
            optimizer,
            lr_scheduler,
            config,
            env,
            global_step: 0,
            skipped_steps: 0,
        })
    }

    /// Take one optimizer step over N accumulated micro-batch losses.
    ///
    /// The losses are averaged and back-propagated once, so an accumulated
    /// step matches a single step on the mean loss. A non-finite gradient
    /// norm drops the optimizer update; the step counter and the LR
    /// schedule still advance.
    pub fn step(&mut self, losses: &[Tensor]) -> anyhow::Result<StepMetrics> {
        let n = losses.len();

        // Loss accumulation
        let mut total_loss: Option<Tensor> = None;
        let mut loss_sum = 0.0f32;
        for loss in losses {
            loss_sum += loss.to_dtype(DType::F32)?.to_scalar::<f32>()?;
            let scaled = loss.affine(1.0 / n as f64, 0.0)?;
            total_loss = Some(match total_loss {
                None => scaled,
                Some(prev) => (prev + scaled)?,
            });
        }
        let mut grads = match total_loss {
            Some(total) => total.backward()?,
            None => anyhow::bail!("no micro-batch losses for step {}", self.global_step),
        };
        let loss_val = loss_sum / n as f32;

        // A non-positive threshold disables clipping but keeps the check.
        let max_norm = if self.config.grad_clip > 0.0 {
            self.config.grad_clip
        } else {
            f64::INFINITY
        };
        let check = check_gradient(
            &mut grads,
            &self.params,
            max_norm,
            self.config.grad_clip_exclude.as_deref(),
            None,
        )?;

        let lrs = self.optimizer.learning_rates();
        if check.skip {
            self.skipped_steps += 1;
            tracing::warn!(step = self.global_step, "skipping optimizer step");
        } else {
            if self.config.decoupled_weight_decay {
                self.optimizer.apply_weight_decay()?;
            }
            self.optimizer.step(&grads)?;
        }

        self.lr_scheduler.advance();
        self.lr_scheduler.apply(&mut self.optimizer)?;
        self.global_step += 1;
        tracing::debug!(step = self.global_step, lrs = ?self.optimizer.learning_rates(), "lr updated");

        Ok(StepMetrics {
            step: self.global_step - 1,
            loss: loss_val,
            lrs,
            grad_norm: check.grad_norm,
            skipped: check.skip,
        })
    }

    /// `(batch_size, grad_accum_steps)` for the current step.
    pub fn batch_settings(&self) -> Result<(usize, usize), ScheduleError> {
        match &self.config.gradual_training {
            Some(table) => gradual_training_scheduler(self.global_step, table, self.env.num_devices),
            None => Ok((self.config.batch_size, self.config.grad_accum_steps)),
        }
    }

    pub fn current_lrs(&self) -> Vec<f64> {
        self.optimizer.learning_rates()
    }

    pub fn optimizer(&self) -> &GroupedAdamW {
        &self.optimizer
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn env(&self) -> &TrainingEnv {
        &self.env
    }

    pub fn device(&self) -> &Device {
        &self.env.device
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
