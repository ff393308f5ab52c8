//! # prosody-train — Training-Loop Utilities
//!
//! Helpers a TTS training driver calls around its own forward pass:
//!
//! * **[`setup_training_env`]** — device, seed, accelerator count.
//! * **[`check_gradient`]** — global-norm clipping with a non-finite flag.
//! * **[`noam_lr`]** / **[`LrSchedule`]** / **[`LrScheduler`]** — warm-up,
//!   stepwise and constant learning-rate schedules.
//! * **[`set_weight_decay`]** — split parameters into decay / no-decay groups.
//! * **[`gradual_training_scheduler`]** — batch size and accumulation by step.
//! * **[`GroupedAdamW`]** / **[`Trainer`]** — per-group AdamW and a step
//!   driver wiring all of the above.

pub mod env;
pub mod grad;
pub mod gradual;
pub mod optimizer;
pub mod params;
pub mod scheduler;
pub mod trainer;
pub mod weight_decay;

pub use env::{setup_training_env, TrainingEnv};
pub use grad::{check_gradient, clip_grad_norm, grad_norm, GradCheck, STOPNET};
pub use gradual::gradual_training_scheduler;
pub use optimizer::{apply_weight_decay, GroupedAdamW, ParamGroup};
pub use params::{NamedParam, ParamSet};
pub use scheduler::{noam_lr, LrSchedule, LrScheduler};
pub use trainer::{StepMetrics, Trainer};
pub use weight_decay::{default_weight_decay_groups, set_weight_decay, RESERVED_PARAM};
