//! # Metis - Planning Under Partial Observability
//!
//! Metis is a Rust library for agents that act in worlds they cannot see
//! directly. It models such problems as partially observable Markov decision
//! processes (POMDPs): the agent tracks a belief state (a probability
//! distribution over where it might be), fuses noisy observations into that
//! belief with a Bayesian filter, and plans either online with a
//! depth-bounded decision search or offline with value iteration over
//! conditional plans.
//!
//! ## Key Features
//!
//! - **Belief Tracking**: Explicit probability distributions over hidden
//!   states with a pure Bayesian update
//! - **Online Search**: Finite-horizon greedy search over the
//!   action/evidence tree with pluggable tie-breaking
//! - **Offline Solving**: POMDP value iteration producing alpha-vector plan
//!   sets, with exact and sampled dominated-plan pruning
//! - **Grid Worlds**: The classic slippery-grid navigation environment with
//!   a wall-count sensor, usable as both model and simulator
//! - **Determinism**: All randomness flows through caller-supplied or
//!   seeded RNGs
//!
//! ## Quick Start
//!
//! ```rust
//! use metis::belief::Belief;
//! use metis::grid::GridWorld;
//! use metis::search::DecisionSearch;
//!
//! let world = GridWorld::four_by_three().unwrap();
//! let belief = Belief::uniform(world.model()).unwrap();
//!
//! let search = DecisionSearch::new(world.model(), 3).unwrap();
//! let decision = search.best_action(&belief).unwrap();
//! println!("take {:?}, expect {}", decision.action, decision.reward);
//! ```
//!
//! ## Module Organization
//!
//! - [`belief`] - Belief-state distributions over hidden states
//! - [`error`] - Error types and result handling
//! - [`filter`] - Bayesian belief update from actions and observations
//! - [`grid`] - Grid-world model construction and simulation
//! - [`model`] - POMDP environment model and builder
//! - [`pruning`] - Alpha vectors, plan sets, dominated-plan removal
//! - [`search`] - Finite-horizon decision search
//! - [`solver`] - Offline value-iteration solver

pub mod belief;
pub mod error;
pub mod filter;
pub mod grid;
pub mod model;
pub mod pruning;
pub mod search;
pub mod solver;
