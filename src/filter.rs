//! # Bayesian Belief Filter
//!
//! Fuses an executed action and an observed evidence symbol into an updated
//! belief. For every candidate next state `s'` the posterior entry is the
//! product of three factors:
//!
//! 1. the predicted mass `sum_s P(s' | s, a) * b(s)` from the transition
//!    model,
//! 2. the observation likelihood `P(e | s')` from the sensor model,
//! 3. a per-state normalizer `b(s') / sum_{u in successors(s')} b(u)`,
//!    defined as zero when the denominator is zero.
//!
//! The per-state normalizer does not guarantee a unit-mass posterior for
//! arbitrary inputs; callers that need one check
//! [`Belief::is_normalized`](crate::belief::Belief::is_normalized) or
//! rescale with [`Belief::normalized`](crate::belief::Belief::normalized).
//! The update is a pure function of its inputs.

use ndarray::Array1;
use std::fmt::Debug;
use std::hash::Hash;

use crate::belief::Belief;
use crate::error::{MetisError, Result};
use crate::model::Pomdp;

/// Posterior belief after taking `action` and observing `evidence`.
///
/// Label-based entry point; unknown labels fail with
/// [`MetisError::UnknownLabel`].
pub fn update<S, A, E>(
    model: &Pomdp<S, A, E>,
    belief: &Belief,
    action: &A,
    evidence: &E,
) -> Result<Belief>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
{
    let action = model.action_index(action)?;
    let evidence = model.evidence_index(evidence)?;
    update_indexed(model, belief, action, evidence)
}

/// Index-based variant of [`update`], used by the decision search to avoid
/// label lookups inside its scan loop.
pub fn update_indexed<S, A, E>(
    model: &Pomdp<S, A, E>,
    belief: &Belief,
    action: usize,
    evidence: usize,
) -> Result<Belief>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
{
    let n = model.num_states();
    if belief.len() != n {
        return Err(MetisError::dimension_mismatch(
            format!("belief of length {}", n),
            format!("length {}", belief.len()),
        ));
    }
    if action >= model.num_actions() {
        return Err(MetisError::unknown_label("action", action));
    }
    if evidence >= model.num_evidence() {
        return Err(MetisError::unknown_label("evidence", evidence));
    }

    // Prediction step: push the prior through the transition model once.
    let mut predicted = Array1::<f64>::zeros(n);
    for s in 0..n {
        let prior = belief.get(s);
        if prior == 0.0 {
            continue;
        }
        for &(p, next) in model.transition_row(s, action) {
            predicted[next] += p * prior;
        }
    }

    // Correction step: weight by the sensor likelihood and the per-state
    // normalizer. A zero denominator means no prior mass can flow onward
    // from s'; its posterior entry is zero, never a division error.
    let mut posterior = Array1::<f64>::zeros(n);
    for next in 0..n {
        let denominator: f64 = model.successors(next).iter().map(|&u| belief.get(u)).sum();
        if denominator == 0.0 {
            continue;
        }
        let normalizer = belief.get(next) / denominator;
        let likelihood = model.evidence_probability(next, evidence);
        posterior[next] = normalizer * likelihood * predicted[next];
    }

    Belief::from_probs(posterior)
}
