//! # Conditional Plans and Dominated-Plan Pruning
//!
//! An [`AlphaVector`] gives the expected value of committing to one
//! conditional plan from every possible true state; the value function over
//! beliefs is the upper envelope (pointwise maximum) of a set of such
//! vectors. A vector that never attains the maximum anywhere on the belief
//! simplex is *dominated* and can be discarded without changing the value
//! function.
//!
//! Both pruning variants evaluate a vector as the line through its first
//! and last coordinates over the unit interval, a two-point projection of
//! the belief simplex (exact for two-state models). The exact variant
//! reconstructs the upper envelope by walking its crossing points; the fast
//! variant samples the interval at 101 points and keeps each argmax.
//!
//! Pruning never fabricates vectors: every survivor is one of the inputs,
//! carried over untouched together with its action tag.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sample count minus one for the fast pruning variant (101 points).
const SAMPLE_RESOLUTION: usize = 100;

/// Tolerance for the exact-prune termination check on the second coordinate.
const ENVELOPE_TOLERANCE: f64 = 1e-12;

/// A conditional-plan value vector: one expected value per state, tagged
/// with the root action the plan recommends (`None` for the trivial
/// do-nothing plan that seeds value iteration).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlphaVector {
    pub action: Option<usize>,
    pub values: Array1<f64>,
}

impl AlphaVector {
    pub fn new(action: Option<usize>, values: Array1<f64>) -> Self {
        AlphaVector { action, values }
    }

    /// All-zero plan over `num_states` states, recommending nothing.
    pub fn trivial(num_states: usize) -> Self {
        AlphaVector {
            action: None,
            values: Array1::zeros(num_states),
        }
    }

    /// First coordinate of the two-point projection.
    fn lo(&self) -> f64 {
        self.values[0]
    }

    /// Last coordinate of the two-point projection.
    fn hi(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Value of the plan's line at `x` in `[0, 1]` of the two-point simplex.
    pub fn value_at(&self, x: f64) -> f64 {
        (self.hi() - self.lo()) * x + self.lo()
    }

    /// Value of the plan under a full belief: the dot product.
    pub fn belief_value(&self, belief: &Array1<f64>) -> f64 {
        self.values.dot(belief)
    }
}

/// A set of undominated conditional plans, grouped by root action.
///
/// Replaced wholesale by each value-iteration step; never mutated in place
/// by consumers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSet {
    plans: Vec<AlphaVector>,
}

impl PlanSet {
    pub fn new() -> Self {
        PlanSet { plans: Vec::new() }
    }

    /// The seed set for value iteration: a single all-zero plan.
    pub fn trivial(num_states: usize) -> Self {
        PlanSet {
            plans: vec![AlphaVector::trivial(num_states)],
        }
    }

    pub fn push(&mut self, plan: AlphaVector) {
        self.plans.push(plan);
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlphaVector> {
        self.plans.iter()
    }

    /// Plans whose root action is `action`.
    pub fn plans_for(&self, action: Option<usize>) -> impl Iterator<Item = &AlphaVector> {
        self.plans.iter().filter(move |p| p.action == action)
    }

    /// Action tags present in the set, in first-seen order.
    pub fn actions(&self) -> Vec<Option<usize>> {
        let mut out: Vec<Option<usize>> = Vec::new();
        for p in &self.plans {
            if !out.contains(&p.action) {
                out.push(p.action);
            }
        }
        out
    }

    /// Policy extraction: the plan maximizing the dot product with `belief`,
    /// or `None` for an empty set.
    pub fn best_plan(&self, belief: &Array1<f64>) -> Option<&AlphaVector> {
        let mut best: Option<(&AlphaVector, f64)> = None;
        for p in &self.plans {
            let v = p.belief_value(belief);
            match best {
                Some((_, top)) if v <= top => {}
                _ => best = Some((p, v)),
            }
        }
        best.map(|(p, _)| p)
    }

    /// Maximum over action tags of the absolute difference between the
    /// aggregate plan values of `self` and `other`. The value-iteration
    /// convergence metric.
    pub fn max_difference(&self, other: &PlanSet) -> f64 {
        let mut actions = self.actions();
        for a in other.actions() {
            if !actions.contains(&a) {
                actions.push(a);
            }
        }
        actions
            .into_iter()
            .map(|a| {
                let sum1: f64 = self.plans_for(a).map(|p| p.values.sum()).sum();
                let sum2: f64 = other.plans_for(a).map(|p| p.values.sum()).sum();
                (sum1 - sum2).abs()
            })
            .fold(0.0, f64::max)
    }

    /// Serialize to a file with bincode.
    pub fn save(&self, path: &str) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a set previously written by [`PlanSet::save`].
    pub fn load(path: &str) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let set = bincode::deserialize(&bytes)?;
        Ok(set)
    }

    /// Serialize to a human-readable JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Load a set previously written by [`PlanSet::save_json`].
    pub fn load_json(path: &str) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let set = serde_json::from_str(&data)?;
        Ok(set)
    }
}

impl FromIterator<AlphaVector> for PlanSet {
    fn from_iter<T: IntoIterator<Item = AlphaVector>>(iter: T) -> Self {
        PlanSet {
            plans: iter.into_iter().collect(),
        }
    }
}

/// Exact upper-envelope extraction.
///
/// Sorts candidates by first coordinate descending, then repeatedly finds
/// the candidate whose line crosses the current envelope segment at the
/// smallest parameter in `[0, 1]` strictly beyond the previous crossing,
/// until the kept plan attains the global maximum of the last coordinate.
pub fn remove_dominated_plans(candidates: &PlanSet) -> PlanSet {
    let mut values: Vec<&AlphaVector> = candidates.iter().collect();
    if values.is_empty() {
        return PlanSet::new();
    }
    values.sort_by(|a, b| b.lo().partial_cmp(&a.lo()).unwrap_or(std::cmp::Ordering::Equal));

    let hi_max = values
        .iter()
        .map(|v| v.hi())
        .fold(f64::NEG_INFINITY, f64::max);

    let mut kept: Vec<&AlphaVector> = vec![values[0]];
    let mut tgt = values[0];
    let mut prev_b = 0.0;
    let mut prev_ix = 0;
    while (tgt.hi() - hi_max).abs() > ENVELOPE_TOLERANCE {
        let mut min_b = 1.0;
        let mut min_ix = None;
        for (i, candidate) in values.iter().enumerate().skip(prev_ix + 1) {
            let denom = candidate.lo() - tgt.lo() + tgt.hi() - candidate.hi();
            if denom != 0.0 {
                let b = (candidate.lo() - tgt.lo()) / denom;
                if (0.0..=1.0).contains(&b) && b > prev_b && b < min_b {
                    min_b = b;
                    min_ix = Some(i);
                }
            }
        }
        // No crossing advances the envelope: the remaining candidates are
        // dominated, stop with what was found.
        let Some(ix) = min_ix else { break };
        prev_b = min_b;
        prev_ix = ix;
        tgt = values[ix];
        kept.push(tgt);
    }

    kept.into_iter().cloned().collect()
}

/// Sampled upper-envelope approximation.
///
/// Evaluates every candidate at 101 evenly spaced points of `[0, 1]` and
/// keeps the argmax at each point, deduplicated. Cheaper than the exact
/// walk but may miss thin dominant segments between sample points.
pub fn remove_dominated_plans_fast(candidates: &PlanSet) -> PlanSet {
    let mut values: Vec<&AlphaVector> = candidates.iter().collect();
    if values.is_empty() {
        return PlanSet::new();
    }
    values.sort_by(|a, b| b.lo().partial_cmp(&a.lo()).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept_ix: Vec<usize> = Vec::new();
    for i in 0..=SAMPLE_RESOLUTION {
        let x = i as f64 / SAMPLE_RESOLUTION as f64;
        let mut best_ix = 0;
        let mut best_val = values[0].value_at(x);
        for (ix, candidate) in values.iter().enumerate().skip(1) {
            let val = candidate.value_at(x);
            if val > best_val {
                best_val = val;
                best_ix = ix;
            }
        }
        if !kept_ix.contains(&best_ix) {
            kept_ix.push(best_ix);
        }
    }

    kept_ix.into_iter().map(|ix| values[ix].clone()).collect()
}
