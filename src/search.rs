//! # Finite-Horizon Decision Search
//!
//! Greedy depth-bounded search over belief states. At every level the search
//! scans the full action x evidence cross-product, computes the posterior
//! belief for each pair through the Bayesian filter, and descends into the
//! single pair whose posterior has the highest expected reward. The scan is
//! a *joint* maximum: evidence branches compete with each other across
//! actions.
//!
//! This treats the most favorable observation as if the agent could choose
//! it, which overestimates attainable reward compared to a full expectimax.
//! The behavior is kept deliberately; it is a heuristic, not an expectation
//! over actual outcomes.
//!
//! Recursion is replaced by an explicit depth-indexed loop, so `max_depth`
//! bounds both the search and the native stack.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt::Debug;
use std::hash::Hash;

use crate::belief::{Belief, BELIEF_TOLERANCE};
use crate::error::{MetisError, Result};
use crate::filter;
use crate::model::Pomdp;

/// How equal-scoring (action, evidence) pairs are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TieBreak {
    /// Scan actions in declaration order; the first maximal pair wins.
    /// Deterministic, the default.
    DeclarationOrder,
    /// Shuffle the action order at every depth level with a seeded RNG.
    /// Randomized tie-breaking that stays reproducible for a fixed seed.
    Shuffled { seed: u64 },
}

/// Result of one search: the root action (or `None` when the belief was
/// already terminal or the depth bound was zero), the posterior the search
/// descended into at the root, and the expected reward at the leaf of the
/// greedy rollout.
#[derive(Clone, Debug)]
pub struct Decision<A> {
    pub action: Option<A>,
    pub belief: Belief,
    pub reward: f64,
}

/// Depth-bounded greedy searcher over a model.
pub struct DecisionSearch<'a, S, A, E> {
    model: &'a Pomdp<S, A, E>,
    max_depth: usize,
    tie_break: TieBreak,
}

impl<'a, S, A, E> DecisionSearch<'a, S, A, E>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
{
    pub fn new(model: &'a Pomdp<S, A, E>, max_depth: usize) -> Result<Self> {
        // The builder guarantees non-empty sets; re-checked here because an
        // empty scan would otherwise return a silent default.
        if model.num_actions() == 0 {
            return Err(MetisError::invalid_parameter("actions", "must not be empty"));
        }
        if model.num_evidence() == 0 {
            return Err(MetisError::invalid_parameter("evidence", "must not be empty"));
        }
        Ok(DecisionSearch {
            model,
            max_depth,
            tie_break: TieBreak::DeclarationOrder,
        })
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Run the search from `belief`.
    pub fn best_action(&self, belief: &Belief) -> Result<Decision<A>> {
        let mut rng = match self.tie_break {
            TieBreak::Shuffled { seed } => Some(StdRng::seed_from_u64(seed)),
            TieBreak::DeclarationOrder => None,
        };
        let mut action_order: Vec<usize> = (0..self.model.num_actions()).collect();

        let mut current = belief.clone();
        let mut root: Option<(usize, Belief)> = None;

        for depth in 0.. {
            let terminal = current.terminal_mass(self.model)? >= 1.0 - BELIEF_TOLERANCE;
            if terminal || depth == self.max_depth {
                let reward = current.expected_reward(self.model)?;
                let (action, belief) = match root {
                    Some((a, posterior)) => {
                        (Some(self.model.actions()[a].clone()), posterior)
                    }
                    None => (None, current),
                };
                return Ok(Decision { action, belief, reward });
            }

            if let Some(rng) = rng.as_mut() {
                action_order.shuffle(rng);
            }

            // Joint max over the full action x evidence cross-product; first
            // maximal pair in scan order wins under the strict comparison.
            let mut best: Option<(f64, usize, Belief)> = None;
            for &a in &action_order {
                for e in 0..self.model.num_evidence() {
                    let posterior = filter::update_indexed(self.model, &current, a, e)?;
                    let score = posterior.expected_reward(self.model)?;
                    let better = match &best {
                        Some((top, _, _)) => score > *top,
                        None => true,
                    };
                    if better {
                        best = Some((score, a, posterior));
                    }
                }
            }
            let (_, a, posterior) = best.ok_or_else(|| {
                MetisError::invalid_parameter("search", "empty action/evidence scan")
            })?;

            if root.is_none() {
                root = Some((a, posterior.clone()));
            }
            current = posterior;
        }
        unreachable!("depth loop always returns at the depth bound")
    }
}
