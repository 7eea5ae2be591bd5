//! # Grid World
//!
//! The classic navigation environment: an agent moves on a rectangular grid with
//! blocked cells and terminal cells, its moves slip sideways with
//! probability 0.2, and its only sense is a noisy count of adjacent walls.
//!
//! [`GridWorld::new`] is an explicit factory producing an immutable
//! [`Pomdp`] over `(x, y)` coordinates (row 0 at the bottom), four movement
//! [`Orientation`]s and the wall-count evidence alphabet `0..=3`. The struct
//! also carries the hidden true state so it can act as a simulator:
//! [`GridWorld::step`] samples a transition and a noisy observation from a
//! caller-supplied RNG.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{MetisError, Result};
use crate::model::Pomdp;

/// A grid coordinate, `(x, y)` with `y` growing upward.
pub type GridState = (i32, i32);

/// The four movement directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    East,
    North,
    West,
    South,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [
        Orientation::East,
        Orientation::North,
        Orientation::West,
        Orientation::South,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Orientation::East => (1, 0),
            Orientation::North => (0, 1),
            Orientation::West => (-1, 0),
            Orientation::South => (0, -1),
        }
    }

    pub fn turn_right(self) -> Orientation {
        match self {
            Orientation::East => Orientation::South,
            Orientation::South => Orientation::West,
            Orientation::West => Orientation::North,
            Orientation::North => Orientation::East,
        }
    }

    pub fn turn_left(self) -> Orientation {
        match self {
            Orientation::East => Orientation::North,
            Orientation::North => Orientation::West,
            Orientation::West => Orientation::South,
            Orientation::South => Orientation::East,
        }
    }

    /// Arrow character for policy rendering.
    pub fn arrow(self) -> char {
        match self {
            Orientation::East => '>',
            Orientation::North => '^',
            Orientation::West => '<',
            Orientation::South => 'v',
        }
    }
}

/// Probability that the intended move succeeds; the remainder slips to the
/// two perpendicular directions in equal parts.
const MOVE_SUCCESS: f64 = 0.8;
const MOVE_SLIP: f64 = 0.1;

/// A grid POMDP plus the hidden true state for simulation.
pub struct GridWorld {
    model: Pomdp<GridState, Orientation, usize>,
    rows: usize,
    cols: usize,
    current: GridState,
}

impl GridWorld {
    /// Build a grid world from a reward layout.
    ///
    /// `grid` is given top row first, as it reads on paper; rows are flipped
    /// internally so `(0, 0)` is the bottom-left cell. `None` marks a
    /// blocked cell. `init` fixes the hidden start state (must be an open
    /// non-terminal cell); when absent the first non-terminal cell in index
    /// order is used, and [`GridWorld::reset`] can re-randomize it.
    pub fn new(
        grid: Vec<Vec<Option<f64>>>,
        terminals: &[GridState],
        init: Option<GridState>,
        perception_failure: f64,
        gamma: f64,
    ) -> Result<GridWorld> {
        if grid.is_empty() || grid[0].is_empty() {
            return Err(MetisError::invalid_parameter("grid", "must not be empty"));
        }
        if !(0.0..1.0).contains(&perception_failure) {
            return Err(MetisError::invalid_parameter(
                "perception_failure".to_string(),
                format!("must be in [0, 1), got {}", perception_failure),
            ));
        }
        let rows = grid.len();
        let cols = grid[0].len();
        if grid.iter().any(|row| row.len() != cols) {
            return Err(MetisError::invalid_parameter("grid", "rows must have equal length"));
        }

        // Row 0 on the bottom, not on top.
        let grid: Vec<Vec<Option<f64>>> = grid.into_iter().rev().collect();

        let mut states: Vec<GridState> = Vec::new();
        let mut rewards: HashMap<GridState, f64> = HashMap::new();
        for x in 0..cols as i32 {
            for y in 0..rows as i32 {
                if let Some(r) = grid[y as usize][x as usize] {
                    states.push((x, y));
                    rewards.insert((x, y), r);
                }
            }
        }

        let open = |s: GridState| states.contains(&s);
        let go = |s: GridState, d: Orientation| -> GridState {
            let (dx, dy) = d.delta();
            let s1 = (s.0 + dx, s.1 + dy);
            if open(s1) {
                s1
            } else {
                s
            }
        };

        let mut builder = Pomdp::builder()
            .states(states.iter().copied())
            .actions(Orientation::ALL)
            .evidence(0..=3usize)
            .gamma(gamma);

        for &s in &states {
            for a in Orientation::ALL {
                builder = builder.transition(
                    s,
                    a,
                    [
                        (MOVE_SUCCESS, go(s, a)),
                        (MOVE_SLIP, go(s, a.turn_right())),
                        (MOVE_SLIP, go(s, a.turn_left())),
                    ],
                );
            }
            builder = builder.sensor(s, wall_count_row(walls_at(s, &go), perception_failure));
            builder = builder.reward(s, rewards[&s]);
        }
        for &t in terminals {
            if !open(t) {
                return Err(MetisError::invalid_parameter(
                    "terminals".to_string(),
                    format!("{:?} is not an open cell", t),
                ));
            }
            builder = builder.terminal(t);
        }
        let model = builder.build()?;

        let current = match init {
            Some(s) => {
                let idx = model.state_index(&s)?;
                if model.is_terminal(idx) {
                    return Err(MetisError::invalid_parameter(
                        "init".to_string(),
                        format!("{:?} is terminal", s),
                    ));
                }
                s
            }
            None => {
                let idx = (0..model.num_states())
                    .find(|&i| !model.is_terminal(i))
                    .ok_or_else(|| {
                        MetisError::invalid_parameter("grid", "every open cell is terminal")
                    })?;
                model.states()[idx]
            }
        };

        Ok(GridWorld {
            model,
            rows,
            cols,
            current,
        })
    }

    /// The classic 4x3 navigation problem: step reward −0.04, a +1 terminal
    /// at the top-right corner, a −1 terminal below it, one blocked cell.
    pub fn four_by_three() -> Result<GridWorld> {
        let r = -0.04;
        GridWorld::new(
            vec![
                vec![Some(r), Some(r), Some(r), Some(1.0)],
                vec![Some(r), None, Some(r), Some(-1.0)],
                vec![Some(r), Some(r), Some(r), Some(r)],
            ],
            &[(3, 2), (3, 1)],
            Some((0, 0)),
            0.1,
            0.9,
        )
    }

    pub fn model(&self) -> &Pomdp<GridState, Orientation, usize> {
        &self.model
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The hidden true state. A planning agent would not read this.
    pub fn current_state(&self) -> GridState {
        self.current
    }

    pub fn is_terminal(&self) -> Result<bool> {
        let idx = self.model.state_index(&self.current)?;
        Ok(self.model.is_terminal(idx))
    }

    /// Re-randomize the hidden state uniformly over non-terminal cells.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<GridState> {
        let open: Vec<usize> = (0..self.model.num_states())
            .filter(|&i| !self.model.is_terminal(i))
            .collect();
        if open.is_empty() {
            return Err(MetisError::invalid_parameter(
                "grid",
                "every open cell is terminal",
            ));
        }
        let idx = open[rng.gen_range(0..open.len())];
        self.current = self.model.states()[idx];
        Ok(self.current)
    }

    /// Execute one real step: sample the slip outcome of `action`, move the
    /// hidden state, and sample a wall-count reading from the new cell.
    /// Returns `(reached_terminal, reward, evidence)`.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        action: Orientation,
        rng: &mut R,
    ) -> Result<(bool, f64, usize)> {
        let s = self.model.state_index(&self.current)?;
        let a = self.model.action_index(&action)?;
        let next = sample_row(self.model.transition_row(s, a), rng);
        self.current = self.model.states()[next];
        let evidence = self.observe(rng)?;
        let idx = self.model.state_index(&self.current)?;
        Ok((self.model.is_terminal(idx), self.model.reward(idx), evidence))
    }

    /// Sample a wall-count reading from the hidden state's sensor row.
    pub fn observe<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<usize> {
        let s = self.model.state_index(&self.current)?;
        let row = self.model.sensor_row(s);
        Ok(sample_row(row, rng))
    }

    /// Render a per-state mapping as a text grid, top row first. Cells
    /// without an entry (blocked or unmapped) show as `.`.
    pub fn to_grid(&self, mapping: &HashMap<GridState, char>) -> Vec<String> {
        (0..self.rows as i32)
            .rev()
            .map(|y| {
                (0..self.cols as i32)
                    .map(|x| *mapping.get(&(x, y)).unwrap_or(&'.'))
                    .collect()
            })
            .collect()
    }

    /// Render a policy as arrows.
    pub fn to_arrows(&self, policy: &HashMap<GridState, Option<Orientation>>) -> Vec<String> {
        let chars = policy
            .iter()
            .map(|(&s, &a)| (s, a.map_or('.', Orientation::arrow)))
            .collect();
        self.to_grid(&chars)
    }
}

/// Sample from a categorical (probability, value) row by cumulative scan.
fn sample_row<R: Rng + ?Sized>(row: &[(f64, usize)], rng: &mut R) -> usize {
    let mut remaining = rng.gen::<f64>();
    for &(p, value) in row {
        if remaining <= p {
            return value;
        }
        remaining -= p;
    }
    // rounding left a sliver of mass unaccounted for; take the last entry
    row.last().map(|&(_, v)| v).unwrap_or(0)
}

/// Number of adjacent walls: moves that leave the agent where it stands.
fn walls_at(s: GridState, go: &impl Fn(GridState, Orientation) -> GridState) -> usize {
    Orientation::ALL.iter().filter(|&&a| go(s, a) == s).count()
}

/// Sensor row over the wall-count alphabet `0..=3`: the true count reads
/// correctly with probability `1 - perception_failure`, and one too few or
/// too many with `perception_failure / 2` each. Mass that would fall outside
/// the alphabet (at counts 0 and 3) folds back onto the true count so the
/// row still sums to one; a fully enclosed cell counts as 3 walls.
fn wall_count_row(walls: usize, perception_failure: f64) -> Vec<(f64, usize)> {
    let walls = walls.min(3);
    let mut row = vec![
        (0.0, 0usize),
        (0.0, 1usize),
        (0.0, 2usize),
        (0.0, 3usize),
    ];
    row[walls].0 = 1.0 - perception_failure;
    let mut folded = 0.0;
    for neighbor in [walls.wrapping_sub(1), walls + 1] {
        if neighbor <= 3 {
            row[neighbor].0 = perception_failure / 2.0;
        } else {
            folded += perception_failure / 2.0;
        }
    }
    row[walls].0 += folded;
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::{Belief, BELIEF_TOLERANCE};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_four_by_three_layout() {
        let world = GridWorld::four_by_three().unwrap();
        let model = world.model();
        // one cell of twelve is blocked
        assert_eq!(model.num_states(), 11);
        assert_eq!(model.num_actions(), 4);
        assert_eq!(model.num_evidence(), 4);
        assert!(model.is_terminal(model.state_index(&(3, 2)).unwrap()));
        assert!(model.is_terminal(model.state_index(&(3, 1)).unwrap()));
        assert!(model.state_index(&(1, 1)).is_err()); // blocked
        let goal = model.state_index(&(3, 2)).unwrap();
        assert_eq!(model.reward(goal), 1.0);
    }

    #[test]
    fn test_transition_rows_sum_to_one() {
        // the builder validates this; spot-check a corner where slip
        // outcomes collapse onto the same cell
        let world = GridWorld::four_by_three().unwrap();
        let model = world.model();
        let corner = model.state_index(&(0, 0)).unwrap();
        let west = model
            .actions()
            .iter()
            .position(|&a| a == Orientation::West)
            .unwrap();
        // moving west from the corner: 0.8 bump + 0.1 north + 0.1 south-bump
        assert!((model.transition_probability(corner, west, corner) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_wall_counts() {
        let world = GridWorld::four_by_three().unwrap();
        let model = world.model();
        // corner (0,0): walls west and south
        let corner = model.state_index(&(0, 0)).unwrap();
        assert!((model.evidence_probability(corner, 2) - 0.9).abs() < 1e-12);
        assert!((model.evidence_probability(corner, 1) - 0.05).abs() < 1e-12);
        assert!((model.evidence_probability(corner, 3) - 0.05).abs() < 1e-12);
        // (2,2): only the top edge is a wall
        let top = model.state_index(&(2, 2)).unwrap();
        assert!((model.evidence_probability(top, 1) - 0.9).abs() < 1e-12);
        assert!((model.evidence_probability(top, 3) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_sensor_row_folding() {
        // 0 walls: the "-1 walls" tail folds back onto the true count
        let row = wall_count_row(0, 0.1);
        assert!((row[0].0 - 0.95).abs() < 1e-12);
        assert!((row[1].0 - 0.05).abs() < 1e-12);
        let total: f64 = row.iter().map(|&(p, _)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);

        // 3 walls: the "+1" tail folds back
        let row = wall_count_row(3, 0.1);
        assert!((row[3].0 - 0.95).abs() < 1e-12);
        assert!((row[2].0 - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_belief_over_nine_cells() {
        let world = GridWorld::four_by_three().unwrap();
        let belief = Belief::uniform(world.model()).unwrap();
        assert!(belief.is_normalized(BELIEF_TOLERANCE));
        let goal = world.model().state_index(&(3, 2)).unwrap();
        assert_eq!(belief.get(goal), 0.0);
        let start = world.model().state_index(&(0, 0)).unwrap();
        assert!((belief.get(start) - 1.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_step_is_seeded_and_stays_on_grid() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut world = GridWorld::four_by_three().unwrap();
        for _ in 0..50 {
            let (done, reward, evidence) = world.step(Orientation::East, &mut rng).unwrap();
            assert!(evidence <= 3);
            assert!(world.model().state_index(&world.current_state()).is_ok());
            assert!(reward.is_finite());
            if done {
                break;
            }
        }
    }

    #[test]
    fn test_init_must_not_be_terminal() {
        let r = -0.04;
        let result = GridWorld::new(
            vec![vec![Some(r), Some(1.0)]],
            &[(1, 0)],
            Some((1, 0)),
            0.1,
            0.9,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_to_arrows() {
        let world = GridWorld::four_by_three().unwrap();
        let mut policy: HashMap<GridState, Option<Orientation>> = HashMap::new();
        for &s in world.model().states() {
            policy.insert(s, Some(Orientation::East));
        }
        policy.insert((3, 2), None);
        let lines = world.to_arrows(&policy);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], ">>>.");
        // blocked cell shows as '.'
        assert_eq!(lines[1], ">.>>");
    }
}
