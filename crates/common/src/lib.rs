//! # prosody-common — Shared Configuration
//!
//! Types shared by every crate in the workspace:
//!
//! * **[`TrainingConfig`]** — optimisation hyper-parameters (serialised as JSON).
//! * **[`BackendConfig`]** — numeric-backend toggles and the run seed.
//! * **[`StepwiseLrConfig`]** / **[`GradualTrainingConfig`]** — validated
//!   step-indexed schedule tables.
//! * **[`ScheduleError`]** — configuration and lookup failures.

pub mod config;
pub mod error;
pub mod schedule;

pub use config::{BackendConfig, LrSchedulerKind, TrainingConfig, DEFAULT_SEED, DEFAULT_SKIP_LIST};
pub use error::ScheduleError;
pub use schedule::{GradualStep, GradualTrainingConfig, LrStep, StepwiseLrConfig};
