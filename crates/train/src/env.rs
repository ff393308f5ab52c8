//! Training environment: device selection, seeding and accelerator count.
//!
//! Backend toggles are carried on [`TrainingEnv`] instead of being written
//! to process-global state; whatever builds kernels reads them from there.

use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;
use rand::rngs::StdRng;
use rand::SeedableRng;

use prosody_common::BackendConfig;

/// Upper bound when probing CUDA ordinals.
const MAX_CUDA_DEVICES: usize = 64;

/// Everything the training driver needs to know about where it runs.
#[derive(Debug)]
pub struct TrainingEnv {
    /// Device for model parameters (first accelerator, else CPU).
    pub device: Device,
    pub use_accelerator: bool,
    /// Number of usable accelerators; 0 on CPU-only hosts.
    pub num_devices: usize,
    pub backend: BackendConfig,
    /// Host-side RNG seeded with `backend.seed` (shuffling, dropout masks on CPU).
    pub rng: StdRng,
}

impl TrainingEnv {
    /// `(use_accelerator, num_devices)`.
    pub fn summary(&self) -> (bool, usize) {
        (self.use_accelerator, self.num_devices)
    }
}

fn count_cuda_devices() -> usize {
    if !cuda_is_available() {
        return 0;
    }
    (0..MAX_CUDA_DEVICES)
        .take_while(|&ordinal| Device::new_cuda(ordinal).is_ok())
        .count()
}

/// Pick the device, fix the seed and report accelerator availability.
pub fn setup_training_env(backend: &BackendConfig) -> anyhow::Result<TrainingEnv> {
    let cuda_devices = count_cuda_devices();
    let (device, num_devices) = if cuda_devices > 0 {
        (Device::new_cuda(0)?, cuda_devices)
    } else if metal_is_available() {
        (Device::new_metal(0)?, 1)
    } else {
        (Device::Cpu, 0)
    };

    // The CPU backend draws from a thread-local RNG that cannot be seeded.
    if !device.is_cpu() {
        device.set_seed(backend.seed)?;
    }
    let rng = StdRng::seed_from_u64(backend.seed);

    let use_accelerator = num_devices > 0;
    tracing::info!(use_accelerator, num_devices, device = ?device, "training device");
    tracing::info!(
        cudnn_enabled = backend.cudnn_enabled,
        cudnn_benchmark = backend.cudnn_benchmark,
        seed = backend.seed,
        "backend config"
    );

    Ok(TrainingEnv {
        device,
        use_accelerator,
        num_devices,
        backend: backend.clone(),
        rng,
    })
}
