//! # Belief States
//!
//! A [`Belief`] is a probability distribution over the hidden state of a
//! [`Pomdp`](crate::model::Pomdp), index-aligned with the model's state set.
//! Beliefs are immutable values: the filter and the search never mutate a
//! belief in place, they construct a new one and hand it back.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{MetisError, Result};
use crate::model::Pomdp;

/// Tolerance for normalization and terminal-mass checks.
pub const BELIEF_TOLERANCE: f64 = 1e-9;

/// A probability distribution over model states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    probs: Array1<f64>,
}

impl Belief {
    /// Uniform belief over the non-terminal states of a model, with zero
    /// mass on terminals. The natural initial belief for an agent that knows
    /// only that it did not start on a terminal cell.
    pub fn uniform<S, A, E>(model: &Pomdp<S, A, E>) -> Result<Belief>
    where
        S: Clone + Eq + Hash + Debug,
        A: Clone + Eq + Hash + Debug,
        E: Clone + Eq + Hash + Debug,
    {
        let n = model.num_states();
        let open = (0..n).filter(|&s| !model.is_terminal(s)).count();
        if open == 0 {
            return Err(MetisError::invalid_parameter(
                "model",
                "every state is terminal; no uniform belief exists",
            ));
        }
        let p = 1.0 / open as f64;
        let probs = Array1::from_shape_fn(n, |s| if model.is_terminal(s) { 0.0 } else { p });
        Ok(Belief { probs })
    }

    /// Belief with all mass on a single state.
    pub fn delta(num_states: usize, state: usize) -> Result<Belief> {
        if state >= num_states {
            return Err(MetisError::dimension_mismatch(
                format!("state index < {}", num_states),
                format!("{}", state),
            ));
        }
        let mut probs = Array1::zeros(num_states);
        probs[state] = 1.0;
        Ok(Belief { probs })
    }

    /// Build a belief from raw probabilities.
    ///
    /// Entries must be finite and non-negative. The mass is *not* forced to
    /// one: the belief filter legitimately produces sub-normalized outputs,
    /// so normalization is a caller-side check (see [`Belief::is_normalized`]).
    pub fn from_probs(probs: Array1<f64>) -> Result<Belief> {
        if probs.is_empty() {
            return Err(MetisError::invalid_parameter("probs", "must not be empty"));
        }
        for &p in probs.iter() {
            if !p.is_finite() || p < 0.0 {
                return Err(MetisError::NumericalError(format!(
                    "belief entry {} is negative or not finite",
                    p
                )));
            }
        }
        Ok(Belief { probs })
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    /// Probability assigned to a state index.
    pub fn get(&self, state: usize) -> f64 {
        self.probs[state]
    }

    pub fn probs(&self) -> &Array1<f64> {
        &self.probs
    }

    /// Total probability mass.
    pub fn mass(&self) -> f64 {
        self.probs.sum()
    }

    /// Whether the mass is one within `tol`.
    pub fn is_normalized(&self, tol: f64) -> bool {
        (self.mass() - 1.0).abs() <= tol
    }

    /// A rescaled copy with mass one. Fails on zero total mass.
    pub fn normalized(&self) -> Result<Belief> {
        let mass = self.mass();
        if mass <= 0.0 {
            return Err(MetisError::NumericalError(
                "cannot normalize a zero-mass belief".to_string(),
            ));
        }
        Ok(Belief {
            probs: &self.probs / mass,
        })
    }

    /// Expected reward under this belief: `sum_s b(s) * R(s)`.
    ///
    /// Linear in the belief by construction.
    pub fn expected_reward<S, A, E>(&self, model: &Pomdp<S, A, E>) -> Result<f64>
    where
        S: Clone + Eq + Hash + Debug,
        A: Clone + Eq + Hash + Debug,
        E: Clone + Eq + Hash + Debug,
    {
        self.check_len(model.num_states())?;
        Ok(self.probs.dot(model.rewards()))
    }

    /// Probability mass sitting on terminal states.
    pub fn terminal_mass<S, A, E>(&self, model: &Pomdp<S, A, E>) -> Result<f64>
    where
        S: Clone + Eq + Hash + Debug,
        A: Clone + Eq + Hash + Debug,
        E: Clone + Eq + Hash + Debug,
    {
        self.check_len(model.num_states())?;
        Ok(model.terminal_indices().map(|s| self.probs[s]).sum())
    }

    /// Shannon entropy of the distribution (nats). Zero-probability entries
    /// contribute nothing.
    pub fn entropy(&self) -> f64 {
        -self
            .probs
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| p * p.ln())
            .sum::<f64>()
    }

    fn check_len(&self, expected: usize) -> Result<()> {
        if self.probs.len() != expected {
            return Err(MetisError::dimension_mismatch(
                format!("belief of length {}", expected),
                format!("length {}", self.probs.len()),
            ));
        }
        Ok(())
    }
}
