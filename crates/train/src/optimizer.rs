//! Param groups and a grouped AdamW optimizer.
//!
//! Candle's `AdamW` carries one set of hyper-parameters for all of its
//! variables. [`GroupedAdamW`] keeps one `AdamW` per [`ParamGroup`] so each
//! group can have its own weight decay and learning rate.

use candle_core::{backprop::GradStore, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};

use prosody_common::ScheduleError;

use crate::params::NamedParam;

/// Optimizer-level bucket of parameters sharing a weight decay.
#[derive(Debug, Clone)]
pub struct ParamGroup {
    pub name: String,
    pub params: Vec<NamedParam>,
    pub weight_decay: f64,
}

impl ParamGroup {
    pub fn vars(&self) -> Vec<Var> {
        self.params.iter().map(|p| p.var.clone()).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// One AdamW per param group.
pub struct GroupedAdamW {
    groups: Vec<ParamGroup>,
    optimizers: Vec<AdamW>,
}

impl GroupedAdamW {
    /// AdamW applies each group's weight decay itself.
    pub fn new(groups: Vec<ParamGroup>, base: ParamsAdamW) -> candle_core::Result<Self> {
        Self::build(groups, base, true)
    }

    /// AdamW runs without weight decay; call [`apply_weight_decay`](Self::apply_weight_decay)
    /// before each step to decay the weights directly.
    pub fn decoupled(groups: Vec<ParamGroup>, base: ParamsAdamW) -> candle_core::Result<Self> {
        Self::build(groups, base, false)
    }

    fn build(groups: Vec<ParamGroup>, base: ParamsAdamW, adam_decay: bool) -> candle_core::Result<Self> {
        let optimizers = groups
            .iter()
            .map(|group| {
                let params = ParamsAdamW {
                    weight_decay: if adam_decay { group.weight_decay } else { 0.0 },
                    ..base.clone()
                };
                AdamW::new(group.vars(), params)
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { groups, optimizers })
    }

    pub fn step(&mut self, grads: &GradStore) -> candle_core::Result<()> {
        for optimizer in &mut self.optimizers {
            optimizer.step(grads)?;
        }
        Ok(())
    }

    pub fn learning_rates(&self) -> Vec<f64> {
        self.optimizers.iter().map(|o| o.learning_rate()).collect()
    }

    /// Set one learning rate per group.
    pub fn set_learning_rates(&mut self, lrs: &[f64]) -> Result<(), ScheduleError> {
        if lrs.len() != self.optimizers.len() {
            return Err(ScheduleError::GroupCountMismatch {
                expected: self.optimizers.len(),
                found: lrs.len(),
            });
        }
        for (optimizer, &lr) in self.optimizers.iter_mut().zip(lrs) {
            optimizer.set_learning_rate(lr);
        }
        Ok(())
    }

    /// Decay each group's weights by `weight_decay * lr`. Returns the
    /// learning rate of the last group.
    pub fn apply_weight_decay(&self) -> anyhow::Result<f64> {
        apply_weight_decay(&self.groups, &self.learning_rates())
    }

    pub fn groups(&self) -> &[ParamGroup] {
        &self.groups
    }
}

/// Decoupled weight decay: `w <- w - weight_decay * lr * w` for every
/// parameter, gradients untouched. `lrs` holds one rate per group; the last
/// one is returned.
pub fn apply_weight_decay(groups: &[ParamGroup], lrs: &[f64]) -> anyhow::Result<f64> {
    if groups.len() != lrs.len() {
        return Err(ScheduleError::GroupCountMismatch {
            expected: groups.len(),
            found: lrs.len(),
        }
        .into());
    }
    let mut current_lr = 0.0;
    for (group, &lr) in groups.iter().zip(lrs) {
        current_lr = lr;
        if group.weight_decay == 0.0 {
            continue;
        }
        let factor = 1.0 - group.weight_decay * lr;
        for p in &group.params {
            let decayed = p.var.as_tensor().affine(factor, 0.0)?;
            p.var.set(&decayed)?;
        }
    }
    Ok(current_lr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};

    fn group(name: &str, weight_decay: f64, values: &[f32]) -> ParamGroup {
        let var = Var::from_slice(values, values.len(), &Device::Cpu).unwrap();
        ParamGroup {
            name: name.to_string(),
            params: vec![NamedParam {
                name: format!("{name}.weight"),
                var,
                trainable: true,
            }],
            weight_decay,
        }
    }

    fn values(group: &ParamGroup) -> Vec<f32> {
        group.params[0].var.as_tensor().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn learning_rates_per_group() {
        let groups = vec![group("no_decay", 0.0, &[1.0]), group("decay", 0.1, &[1.0])];
        let mut opt = GroupedAdamW::new(groups, ParamsAdamW { lr: 1e-3, ..Default::default() }).unwrap();
        assert_eq!(opt.learning_rates(), vec![1e-3, 1e-3]);

        opt.set_learning_rates(&[1e-4, 2e-4]).unwrap();
        assert_eq!(opt.learning_rates(), vec![1e-4, 2e-4]);

        assert_eq!(
            opt.set_learning_rates(&[1e-4]),
            Err(ScheduleError::GroupCountMismatch { expected: 2, found: 1 })
        );
    }

    #[test]
    fn step_moves_parameters_against_gradient() {
        let groups = vec![group("decay", 0.0, &[1.0, 1.0])];
        let var = groups[0].params[0].var.clone();
        let mut opt = GroupedAdamW::new(groups, ParamsAdamW { lr: 0.1, ..Default::default() }).unwrap();

        let loss = var.as_tensor().sum_all().unwrap();
        let grads = loss.backward().unwrap();
        opt.step(&grads).unwrap();

        let after = var.as_tensor().to_vec1::<f32>().unwrap();
        assert!(after.iter().all(|&v| v < 1.0));
    }

    #[test]
    fn decoupled_decay_scales_weights() {
        let groups = vec![group("no_decay", 0.0, &[2.0]), group("decay", 0.5, &[2.0, -4.0])];
        let opt = GroupedAdamW::decoupled(groups, ParamsAdamW { lr: 0.1, ..Default::default() }).unwrap();

        let lr = opt.apply_weight_decay().unwrap();
        assert_eq!(lr, 0.1);
        // factor = 1 - 0.5 * 0.1 = 0.95
        assert_eq!(values(&opt.groups()[0]), vec![2.0]);
        let decayed = values(&opt.groups()[1]);
        assert!((decayed[0] - 1.9).abs() < 1e-6);
        assert!((decayed[1] + 3.8).abs() < 1e-6);
    }

    #[test]
    fn weight_decay_leaves_gradients_alone() {
        let groups = vec![group("decay", 0.5, &[2.0])];
        let var = groups[0].params[0].var.clone();
        let coeff = Tensor::new(&[3.0f32], &Device::Cpu).unwrap();
        let grads = var.as_tensor().mul(&coeff).unwrap().sum_all().unwrap().backward().unwrap();

        apply_weight_decay(&groups, &[0.1]).unwrap();
        let g = grads.get(var.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(g, vec![3.0]);
        assert!(apply_weight_decay(&groups, &[]).is_err());
    }
}
