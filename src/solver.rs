//! # Offline Value-Iteration Solver
//!
//! Approximates the optimal value function over the belief simplex by
//! backward induction on conditional plans. Each iteration enumerates every
//! way of assigning one current alpha vector to each evidence symbol, backs
//! each assignment up through the transition and sensor matrices for every
//! action,
//!
//! ```text
//! alpha'(s) = R(s) + gamma * sum_e  T_a . (O_e * alpha_e)
//! ```
//!
//! and prunes the resulting candidates down to the undominated set. The loop
//! stops once the maximum aggregate value difference between consecutive
//! plan sets drops below `epsilon * (1 - gamma) / gamma`, the standard
//! POMDP value-iteration bound; the first ten iterations never terminate.
//! An iteration ceiling turns a
//! non-converging run into [`MetisError::ConvergenceNotReached`] instead of
//! an endless loop.
//!
//! The candidate count is `|A| * |U|^|E|` per iteration, so the solver is
//! only practical for small evidence alphabets; prune with the fast variant
//! to keep `|U|` bounded by its 101 sample points.

use ndarray::{Array1, Array2};
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{MetisError, Result};
use crate::model::Pomdp;
use crate::pruning::{self, AlphaVector, PlanSet};

/// Which dominated-plan removal runs after each backup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PruningMode {
    /// Exact upper-envelope walk.
    Exact,
    /// 101-point sampled approximation (the default).
    Fast,
}

/// Minimum number of iterations before the convergence bound is consulted.
const MIN_ITERATIONS: usize = 10;

/// Default iteration ceiling.
const DEFAULT_MAX_ITERATIONS: usize = 200;

/// Offline solver producing a [`PlanSet`] for a model.
pub struct ValueIterationSolver<'a, S, A, E> {
    model: &'a Pomdp<S, A, E>,
    epsilon: f64,
    max_iterations: usize,
    pruning: PruningMode,
}

impl<'a, S, A, E> ValueIterationSolver<'a, S, A, E>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
{
    pub fn new(model: &'a Pomdp<S, A, E>) -> Self {
        ValueIterationSolver {
            model,
            epsilon: 0.1,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            pruning: PruningMode::Fast,
        }
    }

    /// Convergence threshold parameter. Must be positive and finite.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Iteration ceiling; exceeding it is an error, not a silent loop.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_pruning(mut self, pruning: PruningMode) -> Self {
        self.pruning = pruning;
        self
    }

    /// Run value iteration to convergence.
    pub fn solve(&self) -> Result<PlanSet> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(MetisError::invalid_parameter(
                "epsilon".to_string(),
                format!("must be positive and finite, got {}", self.epsilon),
            ));
        }

        let n = self.model.num_states();
        let gamma = self.model.gamma();
        let rewards = self.model.rewards();
        let threshold = self.epsilon * (1.0 - gamma) / gamma;

        // The model matrices are fixed across iterations.
        let transition: Vec<Array2<f64>> = (0..self.model.num_actions())
            .map(|a| self.model.transition_matrix(a))
            .collect();
        let likelihood: Vec<Array1<f64>> = (0..self.model.num_evidence())
            .map(|e| self.model.evidence_likelihood(e))
            .collect();

        let mut plans = PlanSet::trivial(n);
        for iteration in 1..=self.max_iterations {
            let previous = plans.clone();
            let vectors: Vec<Array1<f64>> =
                plans.iter().map(|p| p.values.clone()).collect();

            let mut candidates = PlanSet::new();
            for (a, t) in transition.iter().enumerate() {
                for combo in EvidenceCombinations::new(vectors.len(), likelihood.len()) {
                    // Sum the evidence-conditioned continuations, push the
                    // result through the transition model, discount, and add
                    // the immediate reward.
                    let mut onward = Array1::<f64>::zeros(n);
                    for (e, &v) in combo.iter().enumerate() {
                        onward = onward + &(&likelihood[e] * &vectors[v]);
                    }
                    let values = rewards + &(t.dot(&onward) * gamma);
                    candidates.push(AlphaVector::new(Some(a), values));
                }
            }

            plans = match self.pruning {
                PruningMode::Exact => pruning::remove_dominated_plans(&candidates),
                PruningMode::Fast => pruning::remove_dominated_plans_fast(&candidates),
            };

            if iteration > MIN_ITERATIONS && plans.max_difference(&previous) < threshold {
                return Ok(plans);
            }
        }

        Err(MetisError::ConvergenceNotReached {
            iterations: self.max_iterations,
        })
    }
}

/// Odometer over every assignment of one vector index to each evidence
/// symbol: `num_vectors ^ num_evidence` combinations.
struct EvidenceCombinations {
    digits: Vec<usize>,
    base: usize,
    done: bool,
}

impl EvidenceCombinations {
    fn new(base: usize, num_evidence: usize) -> Self {
        EvidenceCombinations {
            digits: vec![0; num_evidence],
            base,
            done: base == 0 || num_evidence == 0,
        }
    }
}

impl Iterator for EvidenceCombinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let current = self.digits.clone();
        // increment with carry; overflow past the last digit exhausts the iterator
        for d in self.digits.iter_mut() {
            *d += 1;
            if *d < self.base {
                return Some(current);
            }
            *d = 0;
        }
        self.done = true;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pomdp;

    fn two_state(gamma: f64, reward_b: f64) -> Pomdp<&'static str, &'static str, u8> {
        Pomdp::builder()
            .states(["a", "b"])
            .actions(["stay", "go"])
            .evidence([0u8, 1u8])
            .transition("a", "stay", [(1.0, "a")])
            .transition("a", "go", [(1.0, "b")])
            .transition("b", "stay", [(1.0, "b")])
            .transition("b", "go", [(1.0, "a")])
            .sensor("a", [(0.85, 0u8), (0.15, 1u8)])
            .sensor("b", [(0.15, 0u8), (0.85, 1u8)])
            .reward("b", reward_b)
            .gamma(gamma)
            .build()
            .unwrap()
    }

    #[test]
    fn test_evidence_combinations() {
        let combos: Vec<_> = EvidenceCombinations::new(3, 2).collect();
        assert_eq!(combos.len(), 9);
        assert_eq!(combos[0], vec![0, 0]);
        assert_eq!(combos[8], vec![2, 2]);
        assert_eq!(EvidenceCombinations::new(0, 2).count(), 0);
    }

    #[test]
    fn test_zero_reward_model_converges_to_trivial_values() {
        // With all rewards zero every backup produces all-zero vectors, so
        // the aggregate difference is zero from the start; the solver must
        // still run its mandatory ten iterations before stopping.
        let model = two_state(0.9, 0.0);
        let plans = ValueIterationSolver::new(&model)
            .with_pruning(PruningMode::Exact)
            .solve()
            .unwrap();
        assert!(!plans.is_empty());
        for plan in plans.iter() {
            assert!(plan.action.is_some());
            assert!(plan.values.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_iteration_ceiling_is_an_error() {
        // Fewer than ten iterations can never satisfy the stop rule.
        let model = two_state(0.9, 1.0);
        let result = ValueIterationSolver::new(&model)
            .with_max_iterations(5)
            .solve();
        assert!(matches!(
            result,
            Err(MetisError::ConvergenceNotReached { iterations: 5 })
        ));
    }

    #[test]
    fn test_invalid_epsilon_rejected() {
        let model = two_state(0.9, 1.0);
        assert!(ValueIterationSolver::new(&model)
            .with_epsilon(0.0)
            .solve()
            .is_err());
        assert!(ValueIterationSolver::new(&model)
            .with_epsilon(f64::NAN)
            .solve()
            .is_err());
    }

    #[test]
    fn test_solver_output_is_tagged_and_sized() {
        // Exact pruning keeps every envelope piece, so the plan count (and
        // with it the aggregate metric) grows without bound on this model;
        // the sampled variant caps the set and reaches the loose bound.
        let model = two_state(0.5, 1.0);
        let plans = ValueIterationSolver::new(&model)
            .with_epsilon(1.0)
            .with_pruning(PruningMode::Fast)
            .solve()
            .unwrap();
        assert!(!plans.is_empty());
        for plan in plans.iter() {
            assert_eq!(plan.values.len(), 2);
            assert!(plan.action.is_some());
            assert!(plan.values.iter().all(|v| v.is_finite()));
        }
    }
}
