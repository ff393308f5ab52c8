//! Gradual training: batch size and gradient accumulation by step.
//!
//! Thresholds are compared against `global_step * num_devices`, so a
//! multi-device run moves through the table as fast as the number of
//! samples it has seen, not the number of optimizer steps.

use prosody_common::{GradualTrainingConfig, ScheduleError};

/// `(batch_size, grad_accum_steps)` active at `global_step`.
///
/// `num_devices == 0` (CPU-only) counts as one device.
pub fn gradual_training_scheduler(
    global_step: u64,
    config: &GradualTrainingConfig,
    num_devices: usize,
) -> Result<(usize, usize), ScheduleError> {
    let scaled_step = global_step.saturating_mul(num_devices.max(1) as u64);
    config
        .entry_at(scaled_step)
        .map(|entry| (entry.batch_size, entry.grad_accum_steps))
        .ok_or(ScheduleError::NoEntryForStep {
            step: global_step,
            scaled_step,
        })
}
