//! Gradient guard: global-norm clipping with a non-finite check.
//!
//! Run after `backward()` and before the optimizer step. A NaN or infinite
//! norm is reported through [`GradCheck::skip`] rather than as an error; the
//! caller decides whether to drop the step.

use candle_core::{backprop::GradStore, DType, Tensor, Var};

use crate::params::ParamSet;

/// Name fragment of the stop-token predictor, commonly left out of clipping.
pub const STOPNET: &str = "stopnet";

/// Outcome of [`check_gradient`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheck {
    /// Global L2 norm before clipping.
    pub grad_norm: f64,
    /// `true` when the norm is NaN or infinite.
    pub skip: bool,
}

/// Squared L2 norm of one gradient, accumulated in `f64` whatever its dtype.
fn sq_norm(grad: &Tensor) -> candle_core::Result<f64> {
    grad.to_dtype(DType::F64)?.sqr()?.sum_all()?.to_scalar::<f64>()
}

/// Total L2 norm of the gradients of `vars`. Variables without a gradient
/// contribute nothing.
pub fn grad_norm(grads: &GradStore, vars: &[Var]) -> anyhow::Result<f64> {
    let mut total = 0.0f64;
    for var in vars {
        if let Some(g) = grads.get(var.as_tensor()) {
            total += sq_norm(g)?;
        }
    }
    Ok(total.sqrt())
}

/// Rescale the gradients of `vars` so their global L2 norm is at most
/// `max_norm`. Returns the norm measured before scaling.
///
/// A non-finite norm leaves the gradients untouched.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> anyhow::Result<f64> {
    let norm = grad_norm(grads, vars)?;
    if !norm.is_finite() {
        return Ok(norm);
    }
    let scale = (max_norm / norm).min(1.0);
    if scale < 1.0 {
        for var in vars {
            if let Some(g) = grads.remove(var.as_tensor()) {
                let clipped = g.affine(scale, 0.0)?;
                grads.insert(var.as_tensor(), clipped);
            }
        }
    }
    Ok(norm)
}

/// Clip gradients and flag a non-finite global norm.
///
/// The clipped set is `explicit` when given and non-empty (used as-is, e.g.
/// the parameter list handed to a mixed-precision optimizer); otherwise every
/// trainable parameter of `params`, minus those whose name contains
/// `exclude`.
pub fn check_gradient(
    grads: &mut GradStore,
    params: &ParamSet,
    max_norm: f64,
    exclude: Option<&str>,
    explicit: Option<&[Var]>,
) -> anyhow::Result<GradCheck> {
    let grad_norm = match (explicit.filter(|vars| !vars.is_empty()), exclude) {
        (Some(vars), _) => clip_grad_norm(grads, vars, max_norm)?,
        (None, Some(pattern)) => {
            clip_grad_norm(grads, &params.trainable_vars_excluding(pattern), max_norm)?
        }
        (None, None) => clip_grad_norm(grads, &params.trainable_vars(), max_norm)?,
    };

    let skip = !grad_norm.is_finite();
    if skip {
        tracing::warn!(grad_norm, "gradient norm is not finite");
    }
    Ok(GradCheck { grad_norm, skip })
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    /// Build a var plus a loss whose gradient w.r.t. the var is `grad`.
    fn var_with_grad(grad: &[f32]) -> (Var, Tensor) {
        let dev = Device::Cpu;
        let var = Var::from_slice(&vec![1.0f32; grad.len()], grad.len(), &dev).unwrap();
        let coeff = Tensor::from_slice(grad, grad.len(), &dev).unwrap();
        let loss = var.as_tensor().mul(&coeff).unwrap().sum_all().unwrap();
        (var, loss)
    }

    fn grad_values(grads: &GradStore, var: &Var) -> Vec<f32> {
        grads.get(var.as_tensor()).unwrap().to_vec1::<f32>().unwrap()
    }

    fn set_of(params: &[(&str, &Var)]) -> ParamSet {
        let mut set = ParamSet::new();
        for (name, var) in params {
            set.push(*name, (*var).clone());
        }
        set
    }

    #[test]
    fn clips_to_threshold() {
        let (var, loss) = var_with_grad(&[3.0, 4.0]);
        let mut grads = loss.backward().unwrap();
        let set = set_of(&[("decoder.weight", &var)]);

        let check = check_gradient(&mut grads, &set, 1.0, None, None).unwrap();
        assert!((check.grad_norm - 5.0).abs() < 1e-6);
        assert!(!check.skip);

        let g = grad_values(&grads, &var);
        assert!((g[0] - 0.6).abs() < 1e-6);
        assert!((g[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn small_gradients_untouched() {
        let (var, loss) = var_with_grad(&[0.3, 0.4]);
        let mut grads = loss.backward().unwrap();
        let set = set_of(&[("decoder.weight", &var)]);

        let check = check_gradient(&mut grads, &set, 1.0, None, None).unwrap();
        assert!((check.grad_norm - 0.5).abs() < 1e-6);
        assert_eq!(grad_values(&grads, &var), vec![0.3, 0.4]);
    }

    #[test]
    fn zero_gradient_is_finite() {
        let (var, loss) = var_with_grad(&[0.0, 0.0]);
        let mut grads = loss.backward().unwrap();
        let set = set_of(&[("w", &var)]);

        let check = check_gradient(&mut grads, &set, 1.0, None, None).unwrap();
        assert_eq!(check.grad_norm, 0.0);
        assert!(!check.skip);
    }

    #[test]
    fn infinite_gradient_flags_skip() {
        let (var, loss) = var_with_grad(&[f32::INFINITY, 1.0]);
        let mut grads = loss.backward().unwrap();
        let set = set_of(&[("w", &var)]);

        let check = check_gradient(&mut grads, &set, 1.0, None, None).unwrap();
        assert!(check.grad_norm.is_infinite());
        assert!(check.skip);
        // Left as-is for the caller to inspect.
        assert_eq!(grad_values(&grads, &var)[1], 1.0);
    }

    #[test]
    fn nan_gradient_flags_skip() {
        let (var, loss) = var_with_grad(&[f32::NAN, 1.0]);
        let mut grads = loss.backward().unwrap();
        let set = set_of(&[("w", &var)]);

        let check = check_gradient(&mut grads, &set, 1.0, None, None).unwrap();
        assert!(check.grad_norm.is_nan());
        assert!(check.skip);
    }

    #[test]
    fn excluded_params_are_neither_measured_nor_clipped() {
        let (decoder, loss_a) = var_with_grad(&[3.0, 4.0]);
        let (stopnet, loss_b) = var_with_grad(&[30.0, 40.0]);
        let loss = (loss_a + loss_b).unwrap();
        let mut grads = loss.backward().unwrap();
        let set = set_of(&[("decoder.weight", &decoder), ("decoder.stopnet.weight", &stopnet)]);

        let check = check_gradient(&mut grads, &set, 1.0, Some(STOPNET), None).unwrap();
        assert!((check.grad_norm - 5.0).abs() < 1e-6);
        assert_eq!(grad_values(&grads, &stopnet), vec![30.0, 40.0]);
        assert!((grad_values(&grads, &decoder)[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn explicit_vars_override_the_set() {
        let (a, loss_a) = var_with_grad(&[3.0, 4.0]);
        let (b, loss_b) = var_with_grad(&[6.0, 8.0]);
        let loss = (loss_a + loss_b).unwrap();
        let mut grads = loss.backward().unwrap();
        let set = set_of(&[("a", &a), ("stopnet", &b)]);

        // The explicit list wins over both the set and the exclusion.
        let explicit = [b.clone()];
        let check = check_gradient(&mut grads, &set, 100.0, Some(STOPNET), Some(&explicit)).unwrap();
        assert!((check.grad_norm - 10.0).abs() < 1e-6);
    }

    #[test]
    fn empty_explicit_list_falls_back_to_the_set() {
        let (var, loss) = var_with_grad(&[30.0, 40.0]);
        let mut grads = loss.backward().unwrap();
        let set = set_of(&[("decoder.weight", &var)]);

        let empty: Vec<Var> = Vec::new();
        let check = check_gradient(&mut grads, &set, 1.0, None, Some(empty.as_slice())).unwrap();
        assert!((check.grad_norm - 50.0).abs() < 1e-6);
        let g = grad_values(&grads, &var);
        assert!((g[0] - 0.6).abs() < 1e-6);
        assert!((g[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn frozen_params_not_clipped() {
        let (a, loss_a) = var_with_grad(&[3.0, 4.0]);
        let (b, loss_b) = var_with_grad(&[6.0, 8.0]);
        let mut grads = (loss_a + loss_b).unwrap().backward().unwrap();
        let mut set = set_of(&[("encoder.weight", &a), ("speaker_embedding.weight", &b)]);
        set.freeze("speaker_embedding");

        let check = check_gradient(&mut grads, &set, 1.0, None, None).unwrap();
        assert!((check.grad_norm - 5.0).abs() < 1e-6);
        assert_eq!(grad_values(&grads, &b), vec![6.0, 8.0]);
    }

    #[test]
    fn grad_norm_ignores_vars_without_gradients() {
        let (var, loss) = var_with_grad(&[3.0, 4.0]);
        let unused = Var::from_slice(&[1.0f32, 2.0], 2, &Device::Cpu).unwrap();
        let grads = loss.backward().unwrap();
        let norm = grad_norm(&grads, &[var, unused]).unwrap();
        assert!((norm - 5.0).abs() < 1e-6);
    }
}
