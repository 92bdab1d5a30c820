//! Built-in opponent policies
//!
//! Both policies act only on their own fogged view.

use generals_core::{Action, Cell, Direction, GridState};
use generals_server::Opponent;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

/// Chance that the random policy idles even when it could move
pub const IDLE_PROBABILITY: f64 = 0.05;

/// Chance that the random policy moves half its army
pub const SPLIT_PROBABILITY: f64 = 0.25;

/// A move the view allows: source cell, direction and target cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub source: Cell,
    pub direction: Direction,
    pub target: Cell,
}

impl Candidate {
    pub fn action(&self, split: bool) -> Action {
        Action::move_from(self.source.0, self.source.1, self.direction, split)
    }
}

/// Moves from owned cells holding more than one army into an in-bounds
/// cell not known to be a mountain.
///
/// Fogged structures may be mountains, so they are avoided as well.
pub fn legal_moves(view: &GridState) -> Vec<Candidate> {
    let mut moves = Vec::new();
    for (source, owned) in view.owned_cells.iter() {
        if !*owned || view.armies[source] <= 1 {
            continue;
        }
        for direction in Direction::ALL {
            let Some(target) = Action::move_from(source.0, source.1, direction, false).target()
            else {
                continue;
            };
            if !view.owned_cells.contains(target.0, target.1)
                || view.mountains[target]
                || view.structures_in_fog[target]
            {
                continue;
            }
            moves.push(Candidate {
                source,
                direction,
                target,
            });
        }
    }
    moves
}

/// Uniformly random legal moves
pub struct RandomOpponent {
    rng: StdRng,
}

impl RandomOpponent {
    pub const ID: &'static str = "Random";

    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl Opponent for RandomOpponent {
    fn id(&self) -> &str {
        Self::ID
    }

    fn act(&mut self, view: &GridState) -> Action {
        let moves = legal_moves(view);
        if self.rng.random_bool(IDLE_PROBABILITY) {
            return Action::pass_turn();
        }
        match moves.choose(&mut self.rng) {
            Some(candidate) => {
                let split = self.rng.random_bool(SPLIT_PROBABILITY);
                candidate.action(split)
            }
            None => Action::pass_turn(),
        }
    }
}

/// Greedy expansion: attack where the margin is largest, prefer enemy
/// cells over neutral ones, otherwise wander
pub struct ExpanderOpponent {
    rng: StdRng,
}

impl ExpanderOpponent {
    pub const ID: &'static str = "Expander";

    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl Opponent for ExpanderOpponent {
    fn id(&self) -> &str {
        Self::ID
    }

    fn act(&mut self, view: &GridState) -> Action {
        let moves = legal_moves(view);
        let mut best_enemy: Option<(u32, Candidate)> = None;
        let mut best_neutral: Option<(u32, Candidate)> = None;

        for candidate in &moves {
            let target = candidate.target;
            if view.fog_cells[target] || view.owned_cells[target] {
                continue;
            }
            let moving = view.armies[candidate.source] - 1;
            let defending = view.armies[target];
            if moving <= defending {
                continue;
            }
            let margin = moving - defending;
            let slot = if view.opponent_cells[target] {
                &mut best_enemy
            } else {
                &mut best_neutral
            };
            if slot.is_none_or(|(best, _)| margin > best) {
                *slot = Some((margin, *candidate));
            }
        }

        if let Some((_, candidate)) = best_enemy.or(best_neutral) {
            return candidate.action(false);
        }
        match moves.choose(&mut self.rng) {
            Some(candidate) => candidate.action(false),
            None => Action::pass_turn(),
        }
    }
}
