//! Named parameter listing.
//!
//! Candle's `VarMap` stores variables in a `HashMap`, so it has no stable
//! order. [`ParamSet`] keeps an explicit, insertion-ordered list of
//! `(name, Var)` pairs plus a per-parameter trainable flag, which is what
//! the gradient guard and the weight-decay grouping iterate over.

use candle_core::Var;
use candle_nn::VarMap;

/// A model parameter with its fully-qualified name.
#[derive(Debug, Clone)]
pub struct NamedParam {
    pub name: String,
    pub var: Var,
    /// Frozen parameters keep `false` and are ignored by optimizer grouping.
    pub trainable: bool,
}

/// Ordered collection of named parameters.
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    params: Vec<NamedParam>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every variable of a `VarMap`, ordered by name.
    ///
    /// `VarMap` does not remember creation order; build the set with
    /// [`push`](Self::push) to keep model-definition order instead.
    pub fn from_varmap(varmap: &VarMap) -> anyhow::Result<Self> {
        let data = varmap
            .data()
            .lock()
            .map_err(|e| anyhow::anyhow!("varmap lock poisoned: {e}"))?;
        let mut params: Vec<NamedParam> = data
            .iter()
            .map(|(name, var)| NamedParam {
                name: name.clone(),
                var: var.clone(),
                trainable: true,
            })
            .collect();
        params.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { params })
    }

    /// Append a trainable parameter.
    pub fn push(&mut self, name: impl Into<String>, var: Var) {
        self.params.push(NamedParam {
            name: name.into(),
            var,
            trainable: true,
        });
    }

    /// Mark every parameter whose name contains `pattern` as frozen.
    /// Returns how many were frozen.
    pub fn freeze(&mut self, pattern: &str) -> usize {
        let mut frozen = 0;
        for p in self.params.iter_mut().filter(|p| p.name.contains(pattern)) {
            p.trainable = false;
            frozen += 1;
        }
        frozen
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedParam> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&NamedParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// All variables, in set order.
    pub fn vars(&self) -> Vec<Var> {
        self.params.iter().map(|p| p.var.clone()).collect()
    }

    /// Variables of trainable parameters.
    pub fn trainable_vars(&self) -> Vec<Var> {
        self.params
            .iter()
            .filter(|p| p.trainable)
            .map(|p| p.var.clone())
            .collect()
    }

    /// Variables of trainable parameters whose name does not contain `pattern`.
    pub fn trainable_vars_excluding(&self, pattern: &str) -> Vec<Var> {
        self.params
            .iter()
            .filter(|p| p.trainable && !p.name.contains(pattern))
            .map(|p| p.var.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
