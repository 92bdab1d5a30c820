//! Board state and turn rules

use crate::config::{ArenaConfig, CITY_GARRISON, LAND_GROWTH_PERIOD};
use generals_core::{Action, Cell, Grid, GridState};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::VecDeque;
use std::fmt;

/// Player slot on the board (0 or 1)
pub type Seat = usize;

/// Effect of a single move order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResult {
    /// Pass, or an order the rules reject
    Ignored,
    Moved,
    /// The mover took the other general; the game is decided
    CapturedGeneral,
}

#[derive(Debug, Clone)]
pub struct Board {
    armies: Grid<u32>,
    owners: Grid<Option<Seat>>,
    mountains: Grid<bool>,
    cities: Grid<bool>,
    generals: [Cell; 2],
    alive: [bool; 2],
}

impl Board {
    /// Generate a map: two distant generals, scattered mountains and
    /// neutral cities, always with a mountain-free path between generals.
    pub fn generate(config: &ArenaConfig, rng: &mut impl Rng) -> Self {
        let (height, width) = (config.height, config.width);
        let spacing = config.general_spacing();
        let cells: Vec<Cell> = (0..height)
            .flat_map(|r| (0..width).map(move |c| (r, c)))
            .collect();

        let anchors: Vec<Cell> = cells
            .iter()
            .copied()
            .filter(|&a| cells.iter().any(|&b| manhattan(a, b) >= spacing))
            .collect();
        let first = anchors.choose(rng).copied().unwrap_or((0, 0));
        let partners: Vec<Cell> = cells
            .iter()
            .copied()
            .filter(|&b| manhattan(first, b) >= spacing)
            .collect();
        let second = partners
            .choose(rng)
            .copied()
            .unwrap_or((height - 1, width - 1));

        let mut board = Self {
            armies: Grid::new(height, width),
            owners: Grid::new(height, width),
            mountains: Grid::new(height, width),
            cities: Grid::new(height, width),
            generals: [first, second],
            alive: [true, true],
        };

        for &cell in &cells {
            if cell == first || cell == second {
                continue;
            }
            let roll: f64 = rng.random();
            if roll < config.mountain_density {
                board.mountains[cell] = true;
            } else if roll < config.mountain_density + config.city_density {
                board.cities[cell] = true;
                board.armies[cell] = CITY_GARRISON;
            }
        }

        if !board.connected(first, second) {
            board.mountains = Grid::new(height, width);
        }

        for (seat, general) in board.generals.into_iter().enumerate() {
            board.owners[general] = Some(seat);
            board.armies[general] = 1;
        }
        board
    }

    pub fn height(&self) -> usize {
        self.armies.height()
    }

    pub fn width(&self) -> usize {
        self.armies.width()
    }

    pub fn general(&self, seat: Seat) -> Cell {
        self.generals[seat]
    }

    pub fn army(&self, cell: Cell) -> u32 {
        self.armies[cell]
    }

    pub fn owner(&self, cell: Cell) -> Option<Seat> {
        self.owners[cell]
    }

    /// Apply one player's order.
    ///
    /// The source must be owned by `seat` and hold more than one army; the
    /// target must be on the board and not a mountain.
    pub fn apply_move(&mut self, seat: Seat, action: &Action) -> MoveResult {
        if action.pass {
            return MoveResult::Ignored;
        }
        let source = action.source();
        let Some(target) = action.target() else {
            return MoveResult::Ignored;
        };
        if !self.armies.contains(source.0, source.1)
            || !self.armies.contains(target.0, target.1)
            || self.mountains[target]
            || self.owners[source] != Some(seat)
            || self.armies[source] <= 1
        {
            return MoveResult::Ignored;
        }

        let moving = if action.split {
            self.armies[source] / 2
        } else {
            self.armies[source] - 1
        };
        if moving == 0 {
            return MoveResult::Ignored;
        }
        self.armies[source] -= moving;

        if self.owners[target] == Some(seat) {
            self.armies[target] += moving;
            return MoveResult::Moved;
        }
        if moving <= self.armies[target] {
            self.armies[target] -= moving;
            return MoveResult::Moved;
        }

        let previous = self.owners[target];
        self.armies[target] = moving - self.armies[target];
        self.owners[target] = Some(seat);

        match previous {
            Some(loser) if self.alive[loser] && self.generals[loser] == target => {
                self.capture_general(seat, loser);
                MoveResult::CapturedGeneral
            }
            _ => MoveResult::Moved,
        }
    }

    /// Hand all of the loser's land to the winner; the fallen general's
    /// cell becomes a city
    fn capture_general(&mut self, winner: Seat, loser: Seat) {
        self.alive[loser] = false;
        self.cities[self.generals[loser]] = true;
        for r in 0..self.height() {
            for c in 0..self.width() {
                if self.owners[(r, c)] == Some(loser) {
                    self.owners[(r, c)] = Some(winner);
                }
            }
        }
    }

    /// Army growth at the end of `turn`
    pub fn grow(&mut self, turn: u32) {
        let land_bonus = turn % LAND_GROWTH_PERIOD == 0;
        for r in 0..self.height() {
            for c in 0..self.width() {
                let cell = (r, c);
                let Some(seat) = self.owners[cell] else {
                    continue;
                };
                let structure =
                    self.cities[cell] || (self.alive[seat] && self.generals[seat] == cell);
                if structure {
                    self.armies[cell] += 1;
                }
                if land_bonus {
                    self.armies[cell] += 1;
                }
            }
        }
    }

    /// (land, army) totals for a seat
    pub fn totals(&self, seat: Seat) -> (u32, u32) {
        self.owners
            .iter()
            .filter(|(_, owner)| **owner == Some(seat))
            .fold((0, 0), |(land, army), (cell, _)| {
                (land + 1, army + self.armies[cell])
            })
    }

    /// A cell is visible to a seat when it or one of its eight neighbours
    /// is owned by that seat
    pub fn is_visible(&self, seat: Seat, (r, c): Cell) -> bool {
        let rows = r.saturating_sub(1)..=(r + 1).min(self.height() - 1);
        rows.into_iter().any(|nr| {
            let cols = c.saturating_sub(1)..=(c + 1).min(self.width() - 1);
            cols.into_iter().any(|nc| self.owners[(nr, nc)] == Some(seat))
        })
    }

    /// The board as seen by one seat at `timestep`
    pub fn view(&self, seat: Seat, timestep: u32) -> GridState {
        let other = 1 - seat;
        let mut view = GridState::empty(self.height(), self.width());

        for (cell, owner) in self.owners.iter() {
            if !self.is_visible(seat, cell) {
                view.fog_cells[cell] = true;
                view.neutral_cells[cell] = false;
                view.structures_in_fog[cell] = self.mountains[cell] || self.cities[cell];
                continue;
            }
            view.armies[cell] = self.armies[cell];
            view.mountains[cell] = self.mountains[cell];
            view.cities[cell] = self.cities[cell];
            view.generals[cell] = (0..2).any(|s| self.alive[s] && self.generals[s] == cell);
            view.neutral_cells[cell] = owner.is_none();
            view.owned_cells[cell] = *owner == Some(seat);
            view.opponent_cells[cell] = *owner == Some(other);
        }

        let (owned_land, owned_army) = self.totals(seat);
        let (opponent_land, opponent_army) = self.totals(other);
        view.owned_land_count = owned_land;
        view.owned_army_count = owned_army;
        view.opponent_land_count = opponent_land;
        view.opponent_army_count = opponent_army;
        view.timestep = timestep;
        view
    }

    /// Whether two cells are joined by a path avoiding mountains
    fn connected(&self, from: Cell, to: Cell) -> bool {
        let mut seen = Grid::<bool>::new(self.height(), self.width());
        let mut queue = VecDeque::from([from]);
        seen[from] = true;

        while let Some(cell) = queue.pop_front() {
            if cell == to {
                return true;
            }
            for next in self.armies.neighbors(cell.0, cell.1) {
                if !seen[next] && !self.mountains[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }
        false
    }
}

impl fmt::Display for Board {
    /// `0`/`1` generals, `A`/`B` owned cities, `a`/`b` owned land,
    /// `$` neutral city, `#` mountain
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.height() {
            let row: String = (0..self.width())
                .map(|c| {
                    let cell = (r, c);
                    match self.owners[cell] {
                        Some(seat) if self.alive[seat] && self.generals[seat] == cell => {
                            if seat == 0 { '0' } else { '1' }
                        }
                        Some(0) if self.cities[cell] => 'A',
                        Some(_) if self.cities[cell] => 'B',
                        Some(0) => 'a',
                        Some(_) => 'b',
                        None if self.mountains[cell] => '#',
                        None if self.cities[cell] => '$',
                        None => '.',
                    }
                })
                .collect();
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}

pub fn manhattan(a: Cell, b: Cell) -> usize {
    a.0.abs_diff(b.0) + a.1.abs_diff(b.1)
}
