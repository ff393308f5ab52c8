//! Training configuration for the prosody trainer.
//!
//! Serialised as JSON next to checkpoints. Every field has a default, so a
//! minimal `{}` JSON produces a usable (Noam-scheduled, AdamW) setup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::schedule::{GradualTrainingConfig, StepwiseLrConfig};

/// Name substrings excluded from weight decay by default: attention `v`
/// projection, recurrent cells and embeddings.
pub const DEFAULT_SKIP_LIST: &[&str] = &["decoder.attention.v", "rnn", "lstm", "gru", "embedding"];

/// Seed used when the config does not pick one.
pub const DEFAULT_SEED: u64 = 54321;

// ── Backend ─────────────────────────────────────────────────────────────────

/// Numeric-backend toggles, fixed once at process start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Allow cuDNN kernels on CUDA devices.
    pub cudnn_enabled: bool,
    /// Let cuDNN benchmark and pick the fastest (non-deterministic) kernels.
    pub cudnn_benchmark: bool,
    pub seed: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cudnn_enabled: true,
            cudnn_benchmark: false,
            seed: DEFAULT_SEED,
        }
    }
}

// ── LR scheduler choice ─────────────────────────────────────────────────────

/// Which learning-rate schedule drives the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LrSchedulerKind {
    /// Inverse-square-root warm-up.
    Noam,
    /// Piecewise-constant rates from `gradual_learning_rates`.
    StepwiseGradual,
    /// Keep the base learning rate.
    None,
}

// ── Training config ─────────────────────────────────────────────────────────

/// Optimisation hyper-parameters for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Base learning rate for every param group.
    pub lr: f64,
    /// Global gradient-norm threshold.
    pub grad_clip: f64,
    /// Parameters whose name contains this are left out of clipping (e.g. `"stopnet"`).
    pub grad_clip_exclude: Option<String>,
    pub weight_decay: f64,
    /// Name substrings that never receive weight decay.
    pub wd_skip_list: Vec<String>,
    /// Apply weight decay directly to the weights instead of through AdamW.
    pub decoupled_weight_decay: bool,
    pub lr_scheduler: LrSchedulerKind,
    /// Noam warm-up length, in optimizer steps.
    pub warmup_steps: f64,
    pub gradual_learning_rates: Option<StepwiseLrConfig>,
    pub gradual_training: Option<GradualTrainingConfig>,
    /// Batch size when no gradual-training table is configured.
    pub batch_size: usize,
    pub grad_accum_steps: usize,
    pub backend: BackendConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            grad_clip: 1.0,
            grad_clip_exclude: None,
            weight_decay: 1e-6,
            wd_skip_list: DEFAULT_SKIP_LIST.iter().map(|s| s.to_string()).collect(),
            decoupled_weight_decay: false,
            lr_scheduler: LrSchedulerKind::Noam,
            warmup_steps: 4000.0,
            gradual_learning_rates: None,
            gradual_training: None,
            batch_size: 32,
            grad_accum_steps: 1,
            backend: BackendConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Save config to a JSON file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file. Schedule tables are validated here.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Skip list as borrowed slices, the shape the weight-decay grouping takes.
    pub fn skip_list(&self) -> Vec<&str> {
        self.wd_skip_list.iter().map(String::as_str).collect()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
