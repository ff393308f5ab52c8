//! Example: fit `y = 3x + 1` with the prosody trainer.
//!
//! Exercises the whole loop on a toy model: environment setup, weight-decay
//! groups, the configured LR schedule, gradient guard and gradual batching.
//!
//! Run:
//!   RUST_LOG=info cargo run -p prosody-train --example fit_line -- --config fit_line.json --steps 500

use std::path::PathBuf;

use candle_core::{DType, Tensor};
use candle_nn::{linear, Module, VarBuilder, VarMap};
use clap::Parser;
use rand::Rng;

use prosody_common::{LrSchedulerKind, TrainingConfig};
use prosody_train::{setup_training_env, ParamSet, Trainer};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "fit_line.json")]
    config: PathBuf,
    #[arg(long, default_value = "500")]
    steps: u64,
    #[arg(long, default_value = "50")]
    log_every: u64,
    /// Save the fitted weights here (safetensors).
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = if args.config.exists() {
        TrainingConfig::load(&args.config)?
    } else {
        let default = TrainingConfig {
            lr: 0.05,
            lr_scheduler: LrSchedulerKind::Noam,
            warmup_steps: 50.0,
            ..Default::default()
        };
        default.save(&args.config)?;
        eprintln!("Created default config at {}", args.config.display());
        default
    };

    let mut env = setup_training_env(&config.backend)?;
    let device = env.device.clone();

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = linear(1, 1, vb.pp("decoder.linear"))?;
    let params = ParamSet::from_varmap(&varmap)?;

    // Draw the data up front so the trainer can own the environment.
    let xs: Vec<f32> = (0..4096).map(|_| env.rng.gen_range(-1.0f32..1.0)).collect();
    let mut trainer = Trainer::new(params, config, env)?;

    let mut cursor = 0usize;
    while trainer.global_step < args.steps {
        let (batch_size, accum) = trainer.batch_settings()?;
        let mut losses = Vec::with_capacity(accum);
        for _ in 0..accum {
            let batch: Vec<f32> = (0..batch_size).map(|i| xs[(cursor + i) % xs.len()]).collect();
            cursor = (cursor + batch_size) % xs.len();

            let x = Tensor::from_slice(&batch, (batch_size, 1), &device)?;
            let y = x.affine(3.0, 1.0)?;
            losses.push((model.forward(&x)? - y)?.sqr()?.mean_all()?);
        }

        let metrics = trainer.step(&losses)?;
        if args.log_every > 0 && metrics.step % args.log_every == 0 {
            tracing::info!(
                step = metrics.step,
                loss = %metrics.loss,
                lr = %metrics.lrs[0],
                grad_norm = %metrics.grad_norm,
                batch_size,
                accum,
                "step"
            );
        }
    }

    let w = model.weight().flatten_all()?.to_vec1::<f32>()?;
    tracing::info!(weight = ?w, skipped = trainer.skipped_steps, "training done");

    if let Some(path) = args.output {
        varmap.save(&path)?;
        tracing::info!(path = %path.display(), "weights saved");
    }
    Ok(())
}
