//! Raw per-player game state and the derived observation record

use serde::{Deserialize, Serialize};

use crate::grid::Grid;

/// Free-form engine info passed through to clients
pub type Info = serde_json::Map<String, serde_json::Value>;

/// One player's view of the board as reported by the engine.
///
/// Ownership masks are relative to the viewing player. Fogged cells carry
/// no army, ownership or general information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    pub armies: Grid<u32>,
    pub generals: Grid<bool>,
    pub cities: Grid<bool>,
    pub mountains: Grid<bool>,
    pub neutral_cells: Grid<bool>,
    pub owned_cells: Grid<bool>,
    pub opponent_cells: Grid<bool>,
    pub fog_cells: Grid<bool>,
    pub structures_in_fog: Grid<bool>,
    pub owned_land_count: u32,
    pub owned_army_count: u32,
    pub opponent_land_count: u32,
    pub opponent_army_count: u32,
    pub timestep: u32,
}

impl GridState {
    /// Fully visible empty board
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            armies: Grid::new(height, width),
            generals: Grid::new(height, width),
            cities: Grid::new(height, width),
            mountains: Grid::new(height, width),
            neutral_cells: Grid::filled(height, width, true),
            owned_cells: Grid::new(height, width),
            opponent_cells: Grid::new(height, width),
            fog_cells: Grid::new(height, width),
            structures_in_fog: Grid::new(height, width),
            owned_land_count: 0,
            owned_army_count: 0,
            opponent_land_count: 0,
            opponent_army_count: 0,
            timestep: 0,
        }
    }

    pub fn height(&self) -> usize {
        self.armies.height()
    }

    pub fn width(&self) -> usize {
        self.armies.width()
    }
}

/// Flat numeric features sent to the client each turn.
///
/// Field names are the wire keys. Coordinates are (x = row, y = column).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub army_diff: i64,
    pub land_diff: i64,
    pub fog_count: u32,
    pub visible_cities_count: u32,
    pub visible_mountains_count: u32,
    pub army_ratio: f64,
    pub land_ratio: f64,
    pub border_pressure: u32,
    pub timestep: u32,
    pub distance_to_enemy_general: u32,
    pub min_city_x: i64,
    pub min_city_y: i64,
    pub enemy_general_x: i64,
    pub enemy_general_y: i64,
    pub max_owned_army_x: i64,
    pub max_owned_army_y: i64,
}

/// Result of one session step, from the client's perspective
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: ObservationRecord,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info,
}

impl StepOutcome {
    pub fn is_terminal(&self) -> bool {
        self.terminated || self.truncated
    }
}
