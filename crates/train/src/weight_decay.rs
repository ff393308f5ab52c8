//! Weight-decay grouping.
//!
//! Biases, normalisation gains and every parameter matching the skip list
//! (recurrent cells, embeddings, the attention `v` projection) are trained
//! without weight decay; everything else gets the configured coefficient.

use prosody_common::DEFAULT_SKIP_LIST;

use crate::optimizer::ParamGroup;
use crate::params::ParamSet;

/// Trained by a separate optimizer, so never part of these groups.
pub const RESERVED_PARAM: &str = "capacitron_layer.beta";

/// Split the trainable parameters of `params` into `[no_decay, decay]`.
///
/// Rank-1 tensors and names containing any `skip_list` entry land in
/// `no_decay` (weight decay 0). Set order is preserved within each group.
pub fn set_weight_decay(params: &ParamSet, weight_decay: f64, skip_list: &[&str]) -> Vec<ParamGroup> {
    let mut decay = Vec::new();
    let mut no_decay = Vec::new();
    for p in params.iter() {
        if p.name == RESERVED_PARAM || !p.trainable {
            continue;
        }
        if p.var.rank() == 1 || skip_list.iter().any(|skip| p.name.contains(skip)) {
            no_decay.push(p.clone());
        } else {
            decay.push(p.clone());
        }
    }
    tracing::info!(
        decay = decay.len(),
        no_decay = no_decay.len(),
        weight_decay,
        "weight decay groups"
    );
    vec![
        ParamGroup {
            name: "no_decay".to_string(),
            params: no_decay,
            weight_decay: 0.0,
        },
        ParamGroup {
            name: "decay".to_string(),
            params: decay,
            weight_decay,
        },
    ]
}

/// [`set_weight_decay`] with [`DEFAULT_SKIP_LIST`].
pub fn default_weight_decay_groups(params: &ParamSet, weight_decay: f64) -> Vec<ParamGroup> {
    set_weight_decay(params, weight_decay, DEFAULT_SKIP_LIST)
}
