//! # Environment Model
//!
//! A [`Pomdp`] bundles everything the planning algorithms need to know about
//! the world: the finite state, action and evidence sets, a stochastic
//! transition model, a noisy sensor model, per-state rewards, terminal states
//! and a discount factor.
//!
//! Models are immutable once built. Construction goes through the fluent
//! [`PomdpBuilder`], which validates the model up front: probability rows
//! must sum to one, gamma must lie in `(0, 1]`, and none of the three sets
//! may be empty. Algorithms can therefore rely on a well-formed model and
//! never re-check these invariants in their hot loops.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use ndarray::{Array1, Array2};

use crate::error::{MetisError, Result};

/// Tolerance used when checking that a probability row sums to one.
pub const PROB_TOLERANCE: f64 = 1e-9;

/// An immutable partially observable Markov decision process.
///
/// `S`, `A` and `E` are opaque caller-chosen labels for states, actions and
/// evidence symbols. Internally everything is index-aligned: beliefs, reward
/// vectors and alpha vectors all use the state order given to the builder.
pub struct Pomdp<S, A, E> {
    states: Vec<S>,
    state_index: HashMap<S, usize>,
    actions: Vec<A>,
    action_index: HashMap<A, usize>,
    evidence: Vec<E>,
    evidence_index: HashMap<E, usize>,
    // transitions[s][a] -> (probability, next state index) pairs
    transitions: Vec<Vec<Vec<(f64, usize)>>>,
    // sensor[s] -> (probability, evidence index) pairs
    sensor: Vec<Vec<(f64, usize)>>,
    // union over actions of transition targets, per state
    successors: Vec<Vec<usize>>,
    rewards: Array1<f64>,
    terminal: Vec<bool>,
    gamma: f64,
}

impl<S, A, E> Pomdp<S, A, E>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
{
    /// Start building a model.
    pub fn builder() -> PomdpBuilder<S, A, E> {
        PomdpBuilder::new()
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn num_evidence(&self) -> usize {
        self.evidence.len()
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn actions(&self) -> &[A] {
        &self.actions
    }

    pub fn evidence(&self) -> &[E] {
        &self.evidence
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Reward vector, index-aligned with `states()`.
    pub fn rewards(&self) -> &Array1<f64> {
        &self.rewards
    }

    pub fn reward(&self, state: usize) -> f64 {
        self.rewards[state]
    }

    pub fn is_terminal(&self, state: usize) -> bool {
        self.terminal[state]
    }

    /// Indices of all terminal states.
    pub fn terminal_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.terminal
            .iter()
            .enumerate()
            .filter(|(_, &t)| t)
            .map(|(i, _)| i)
    }

    pub fn state_index(&self, state: &S) -> Result<usize> {
        self.state_index
            .get(state)
            .copied()
            .ok_or_else(|| MetisError::unknown_label("state", state))
    }

    pub fn action_index(&self, action: &A) -> Result<usize> {
        self.action_index
            .get(action)
            .copied()
            .ok_or_else(|| MetisError::unknown_label("action", action))
    }

    pub fn evidence_index(&self, evidence: &E) -> Result<usize> {
        self.evidence_index
            .get(evidence)
            .copied()
            .ok_or_else(|| MetisError::unknown_label("evidence", evidence))
    }

    /// Transition row for `(state, action)` as (probability, next state) pairs.
    ///
    /// Rows sum to one but may list the same successor more than once (a
    /// corner cell in a grid can be re-entered by several slip outcomes).
    pub fn transition_row(&self, state: usize, action: usize) -> &[(f64, usize)] {
        &self.transitions[state][action]
    }

    /// Total probability of reaching `next` from `state` under `action`.
    pub fn transition_probability(&self, state: usize, action: usize, next: usize) -> f64 {
        self.transitions[state][action]
            .iter()
            .filter(|&&(_, s)| s == next)
            .map(|&(p, _)| p)
            .sum()
    }

    /// Sensor row for `state` as (probability, evidence index) pairs.
    pub fn sensor_row(&self, state: usize) -> &[(f64, usize)] {
        &self.sensor[state]
    }

    /// `P(evidence | state)` from the sensor model.
    pub fn evidence_probability(&self, state: usize, evidence: usize) -> f64 {
        self.sensor[state]
            .iter()
            .filter(|&&(_, e)| e == evidence)
            .map(|&(p, _)| p)
            .sum()
    }

    /// States reachable from `state` in one step under any action,
    /// deduplicated. This is the denominator set of the belief-filter
    /// normalizer.
    pub fn successors(&self, state: usize) -> &[usize] {
        &self.successors[state]
    }

    /// The full `|S| x |S|` transition matrix for one action, with
    /// `m[[s, s']] = P(s' | s, action)`.
    pub fn transition_matrix(&self, action: usize) -> Array2<f64> {
        let n = self.states.len();
        let mut m = Array2::zeros((n, n));
        for s in 0..n {
            for &(p, next) in &self.transitions[s][action] {
                m[[s, next]] += p;
            }
        }
        m
    }

    /// The observation likelihood vector for one evidence symbol, with
    /// `v[s] = P(evidence | s)`.
    pub fn evidence_likelihood(&self, evidence: usize) -> Array1<f64> {
        let n = self.states.len();
        let mut v = Array1::zeros(n);
        for s in 0..n {
            v[s] = self.evidence_probability(s, evidence);
        }
        v
    }
}

/// Fluent builder for [`Pomdp`] models.
///
/// ```
/// use metis::model::Pomdp;
///
/// let model = Pomdp::builder()
///     .states(["left", "right"])
///     .actions(["stay", "go"])
///     .evidence([0u8, 1u8])
///     .transition("left", "stay", [(1.0, "left")])
///     .transition("left", "go", [(1.0, "right")])
///     .transition("right", "stay", [(1.0, "right")])
///     .transition("right", "go", [(1.0, "left")])
///     .sensor("left", [(0.85, 0u8), (0.15, 1u8)])
///     .sensor("right", [(0.15, 0u8), (0.85, 1u8)])
///     .reward("right", 1.0)
///     .gamma(0.9)
///     .build()
///     .unwrap();
/// assert_eq!(model.num_states(), 2);
/// ```
pub struct PomdpBuilder<S, A, E> {
    states: Vec<S>,
    actions: Vec<A>,
    evidence: Vec<E>,
    transitions: Vec<(S, A, Vec<(f64, S)>)>,
    sensor: Vec<(S, Vec<(f64, E)>)>,
    rewards: Vec<(S, f64)>,
    terminals: Vec<S>,
    gamma: f64,
}

impl<S, A, E> PomdpBuilder<S, A, E>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        PomdpBuilder {
            states: Vec::new(),
            actions: Vec::new(),
            evidence: Vec::new(),
            transitions: Vec::new(),
            sensor: Vec::new(),
            rewards: Vec::new(),
            terminals: Vec::new(),
            gamma: 0.95,
        }
    }

    /// Declare the state set. Order is preserved and defines belief and
    /// alpha-vector indexing.
    pub fn states(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.states.extend(states);
        self
    }

    /// Declare the action set. Order is preserved and is the default
    /// tie-breaking order of the decision search.
    pub fn actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Declare the evidence alphabet.
    pub fn evidence(mut self, evidence: impl IntoIterator<Item = E>) -> Self {
        self.evidence.extend(evidence);
        self
    }

    /// Set the transition row for `(state, action)`.
    pub fn transition(
        mut self,
        state: S,
        action: A,
        row: impl IntoIterator<Item = (f64, S)>,
    ) -> Self {
        self.transitions.push((state, action, row.into_iter().collect()));
        self
    }

    /// Set the sensor row for `state`.
    pub fn sensor(mut self, state: S, row: impl IntoIterator<Item = (f64, E)>) -> Self {
        self.sensor.push((state, row.into_iter().collect()));
        self
    }

    /// Set the reward for `state`. Unset states default to zero reward.
    pub fn reward(mut self, state: S, reward: f64) -> Self {
        self.rewards.push((state, reward));
        self
    }

    /// Mark `state` as terminal.
    pub fn terminal(mut self, state: S) -> Self {
        self.terminals.push(state);
        self
    }

    /// Set the discount factor. Must lie in `(0, 1]`.
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Validate and build the model.
    pub fn build(self) -> Result<Pomdp<S, A, E>> {
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(MetisError::invalid_parameter(
                "gamma".to_string(),
                format!("must be in (0, 1], got {}", self.gamma),
            ));
        }
        if self.states.is_empty() {
            return Err(MetisError::invalid_parameter("states", "must not be empty"));
        }
        if self.actions.is_empty() {
            return Err(MetisError::invalid_parameter("actions", "must not be empty"));
        }
        if self.evidence.is_empty() {
            return Err(MetisError::invalid_parameter("evidence", "must not be empty"));
        }

        let state_index = index_labels("states", &self.states)?;
        let action_index = index_labels("actions", &self.actions)?;
        let evidence_index = index_labels("evidence", &self.evidence)?;

        let n = self.states.len();
        let na = self.actions.len();

        // Transition rows, indexed and checked.
        let mut transitions: Vec<Vec<Option<Vec<(f64, usize)>>>> = vec![vec![None; na]; n];
        for (state, action, row) in &self.transitions {
            let s = *state_index
                .get(state)
                .ok_or_else(|| MetisError::unknown_label("state", state))?;
            let a = *action_index
                .get(action)
                .ok_or_else(|| MetisError::unknown_label("action", action))?;
            let mut indexed = Vec::with_capacity(row.len());
            for (p, next) in row {
                let next = *state_index
                    .get(next)
                    .ok_or_else(|| MetisError::unknown_label("state", next))?;
                indexed.push((*p, next));
            }
            check_row(&format!("transition({:?}, {:?})", state, action), &indexed)?;
            transitions[s][a] = Some(indexed);
        }
        let transitions: Vec<Vec<Vec<(f64, usize)>>> = transitions
            .into_iter()
            .enumerate()
            .map(|(s, rows)| {
                rows.into_iter()
                    .enumerate()
                    .map(|(a, row)| {
                        row.ok_or_else(|| {
                            MetisError::invalid_parameter(
                                "transitions".to_string(),
                                format!(
                                    "missing row for state {:?}, action {:?}",
                                    self.states[s], self.actions[a]
                                ),
                            )
                        })
                    })
                    .collect()
            })
            .collect::<Result<_>>()?;

        // Sensor rows, indexed and checked.
        let mut sensor: Vec<Option<Vec<(f64, usize)>>> = vec![None; n];
        for (state, row) in &self.sensor {
            let s = *state_index
                .get(state)
                .ok_or_else(|| MetisError::unknown_label("state", state))?;
            let mut indexed = Vec::with_capacity(row.len());
            for (p, e) in row {
                let e = *evidence_index
                    .get(e)
                    .ok_or_else(|| MetisError::unknown_label("evidence", e))?;
                indexed.push((*p, e));
            }
            check_row(&format!("sensor({:?})", state), &indexed)?;
            sensor[s] = Some(indexed);
        }
        let sensor: Vec<Vec<(f64, usize)>> = sensor
            .into_iter()
            .enumerate()
            .map(|(s, row)| {
                row.ok_or_else(|| {
                    MetisError::invalid_parameter(
                        "sensor".to_string(),
                        format!("missing row for state {:?}", self.states[s]),
                    )
                })
            })
            .collect::<Result<_>>()?;

        let mut rewards = Array1::zeros(n);
        for (state, r) in &self.rewards {
            let s = *state_index
                .get(state)
                .ok_or_else(|| MetisError::unknown_label("state", state))?;
            if !r.is_finite() {
                return Err(MetisError::NumericalError(format!(
                    "reward for state {:?} is not finite",
                    state
                )));
            }
            rewards[s] = *r;
        }

        let mut terminal = vec![false; n];
        for state in &self.terminals {
            let s = *state_index
                .get(state)
                .ok_or_else(|| MetisError::unknown_label("state", state))?;
            terminal[s] = true;
        }

        // Cache the one-step successor set of every state.
        let successors = (0..n)
            .map(|s| {
                let mut out: Vec<usize> = Vec::new();
                for row in &transitions[s] {
                    for &(_, next) in row {
                        if !out.contains(&next) {
                            out.push(next);
                        }
                    }
                }
                out
            })
            .collect();

        Ok(Pomdp {
            states: self.states,
            state_index,
            actions: self.actions,
            action_index,
            evidence: self.evidence,
            evidence_index,
            transitions,
            sensor,
            successors,
            rewards,
            terminal,
            gamma: self.gamma,
        })
    }
}

impl<S, A, E> Default for PomdpBuilder<S, A, E>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

fn index_labels<T: Clone + Eq + Hash + Debug>(
    name: &'static str,
    labels: &[T],
) -> Result<HashMap<T, usize>> {
    let mut index = HashMap::with_capacity(labels.len());
    for (i, label) in labels.iter().enumerate() {
        if index.insert(label.clone(), i).is_some() {
            return Err(MetisError::invalid_parameter(
                name.to_string(),
                format!("duplicate label {:?}", label),
            ));
        }
    }
    Ok(index)
}

fn check_row(context: &str, row: &[(f64, usize)]) -> Result<()> {
    if row.is_empty() {
        return Err(MetisError::invalid_parameter(
            context.to_string(),
            "probability row is empty".to_string(),
        ));
    }
    let mut sum = 0.0;
    for &(p, _) in row {
        if !p.is_finite() || p < 0.0 {
            return Err(MetisError::NumericalError(format!(
                "{}: probability {} is negative or not finite",
                context, p
            )));
        }
        sum += p;
    }
    if (sum - 1.0).abs() > PROB_TOLERANCE {
        return Err(MetisError::invalid_parameter(
            context.to_string(),
            format!("probabilities sum to {}, expected 1", sum),
        ));
    }
    Ok(())
}
