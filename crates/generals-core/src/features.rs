//! Feature extraction: raw grid state to a flat observation record
//!
//! Runs once per turn per session, so it makes two linear passes over the
//! grid and allocates only the list of owned cells.

use crate::grid::Cell;
use crate::observation::{GridState, ObservationRecord};

/// Coordinate reported when the enemy general or the strongest owned cell
/// cannot be located
pub const MISSING_CELL: (i64, i64) = (-1, -1);

/// Coordinate reported when no enemy or neutral city is visible
pub const MISSING_CITY: (i64, i64) = (0, 0);

/// Landmarks gathered by the first pass
#[derive(Debug, Default)]
struct Scan {
    visible_cities: u32,
    visible_mountains: u32,
    own_general: Option<Cell>,
    enemy_general: Option<Cell>,
    owned: Vec<Cell>,
    strongest: Option<(Cell, u32)>,
    city_candidates: Vec<Cell>,
}

/// Derive the observation record from one player's view of the grid.
///
/// The view is already relative to the player, so "own" means
/// `owned_cells` and "enemy" means `opponent_cells`.
pub fn extract(state: &GridState) -> ObservationRecord {
    let scan = scan_visible(state);
    let border_pressure = border_pressure(state, &scan.owned);

    // Manhattan distance cannot exceed this on the board.
    let unreachable = (state.height() + state.width()) as u32;

    let (distance_to_enemy_general, enemy_general) = match (scan.own_general, scan.enemy_general)
    {
        (Some(own), Some(enemy)) => (manhattan(own, enemy), signed(enemy)),
        (None, Some(enemy)) => (unreachable, signed(enemy)),
        _ => (unreachable, MISSING_CELL),
    };

    let min_city = scan
        .own_general
        .and_then(|origin| nearest(origin, &scan.city_candidates))
        .map_or(MISSING_CITY, |(_, cell)| signed(cell));

    let max_owned_army = scan
        .strongest
        .map_or(MISSING_CELL, |(cell, _)| signed(cell));

    ObservationRecord {
        army_diff: i64::from(state.owned_army_count) - i64::from(state.opponent_army_count),
        land_diff: i64::from(state.owned_land_count) - i64::from(state.opponent_land_count),
        fog_count: state.fog_cells.count() as u32,
        visible_cities_count: scan.visible_cities,
        visible_mountains_count: scan.visible_mountains,
        army_ratio: ratio(state.owned_army_count, state.opponent_army_count),
        land_ratio: ratio(state.owned_land_count, state.opponent_land_count),
        border_pressure,
        timestep: state.timestep,
        distance_to_enemy_general,
        min_city_x: min_city.0,
        min_city_y: min_city.1,
        enemy_general_x: enemy_general.0,
        enemy_general_y: enemy_general.1,
        max_owned_army_x: max_owned_army.0,
        max_owned_army_y: max_owned_army.1,
    }
}

fn scan_visible(state: &GridState) -> Scan {
    let mut scan = Scan::default();

    for (cell, fogged) in state.fog_cells.iter() {
        if *fogged {
            continue;
        }
        let (r, c) = cell;
        let owned = state.owned_cells.is_set(r, c);

        if state.cities.is_set(r, c) {
            scan.visible_cities += 1;
            if !owned {
                scan.city_candidates.push(cell);
            }
        }
        if state.mountains.is_set(r, c) {
            scan.visible_mountains += 1;
        }
        if state.generals.is_set(r, c) {
            if owned {
                scan.own_general = Some(cell);
            } else if state.opponent_cells.is_set(r, c) {
                scan.enemy_general = Some(cell);
            }
        }
        if owned {
            scan.owned.push(cell);
            let army = state.armies.get(r, c).copied().unwrap_or(0);
            // Strictly greater keeps the first maximum in row-major order.
            if scan.strongest.is_none_or(|(_, best)| army > best) {
                scan.strongest = Some((cell, army));
            }
        }
    }

    scan
}

/// Owned cells with at least one enemy cell among their four neighbours
fn border_pressure(state: &GridState, owned: &[Cell]) -> u32 {
    owned
        .iter()
        .filter(|&&(r, c)| {
            state
                .opponent_cells
                .neighbors(r, c)
                .any(|(nr, nc)| state.opponent_cells.is_set(nr, nc))
        })
        .count() as u32
}

fn nearest(origin: Cell, candidates: &[Cell]) -> Option<(u32, Cell)> {
    let mut best: Option<(u32, Cell)> = None;
    for &cell in candidates {
        let distance = manhattan(origin, cell);
        if best.is_none_or(|(d, _)| distance < d) {
            best = Some((distance, cell));
        }
    }
    best
}

fn manhattan(a: Cell, b: Cell) -> u32 {
    (a.0.abs_diff(b.0) + a.1.abs_diff(b.1)) as u32
}

fn ratio(own: u32, other: u32) -> f64 {
    f64::from(own) / (f64::from(other) + 1.0)
}

fn signed((r, c): Cell) -> (i64, i64) {
    (r as i64, c as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x5 board, fully visible:
    ///
    /// ```text
    ///   . . M . C
    ///   G a . e .
    ///   a a e E .
    ///   C . . . .
    /// ```
    /// G/a owned (G = own general), E/e enemy (E = enemy general),
    /// M mountain, C neutral city.
    fn sample_state() -> GridState {
        let mut state = GridState::empty(4, 5);
        let own = [((1, 0), 5), ((1, 1), 3), ((2, 0), 9), ((2, 1), 9)];
        let enemy = [((1, 3), 2), ((2, 2), 4), ((2, 3), 7)];

        for ((r, c), army) in own {
            state.owned_cells[(r, c)] = true;
            state.neutral_cells[(r, c)] = false;
            state.armies[(r, c)] = army;
        }
        for ((r, c), army) in enemy {
            state.opponent_cells[(r, c)] = true;
            state.neutral_cells[(r, c)] = false;
            state.armies[(r, c)] = army;
        }
        state.generals[(1, 0)] = true;
        state.generals[(2, 3)] = true;
        state.mountains[(0, 2)] = true;
        state.cities[(0, 4)] = true;
        state.cities[(3, 0)] = true;
        state.armies[(0, 4)] = 40;
        state.armies[(3, 0)] = 40;

        state.owned_land_count = 4;
        state.owned_army_count = 26;
        state.opponent_land_count = 3;
        state.opponent_army_count = 13;
        state.timestep = 12;
        state
    }

    #[test]
    fn test_full_visibility_features() {
        let record = extract(&sample_state());

        assert_eq!(record.army_diff, 13);
        assert_eq!(record.land_diff, 1);
        assert_eq!(record.fog_count, 0);
        assert_eq!(record.visible_cities_count, 2);
        assert_eq!(record.visible_mountains_count, 1);
        assert!((record.army_ratio - 26.0 / 14.0).abs() < 1e-12);
        assert!((record.land_ratio - 1.0).abs() < 1e-12);
        assert_eq!(record.timestep, 12);

        assert_eq!((record.enemy_general_x, record.enemy_general_y), (2, 3));
        assert_eq!(record.distance_to_enemy_general, 4);

        // (3,0) is 2 away from the general at (1,0); (0,4) is 5 away.
        assert_eq!((record.min_city_x, record.min_city_y), (3, 0));

        // (2,0) and (2,1) tie on 9; the first in row-major order wins.
        assert_eq!((record.max_owned_army_x, record.max_owned_army_y), (2, 0));
    }

    #[test]
    fn test_border_pressure_counts_each_cell_once() {
        let record = extract(&sample_state());
        // Only (2,1) touches an enemy cell.
        assert_eq!(record.border_pressure, 1);

        let mut surrounded = GridState::empty(3, 3);
        surrounded.owned_cells[(1, 1)] = true;
        for cell in [(0, 1), (2, 1), (1, 0), (1, 2)] {
            surrounded.opponent_cells[cell] = true;
        }
        let record = extract(&surrounded);
        assert_eq!(record.border_pressure, 1);
    }

    #[test]
    fn test_fogged_enemy_general_uses_sentinels() {
        let mut state = sample_state();
        for r in 0..4 {
            for c in 2..5 {
                state.fog_cells[(r, c)] = true;
                state.opponent_cells[(r, c)] = false;
                state.generals[(r, c)] = false;
                state.cities[(r, c)] = false;
                state.mountains[(r, c)] = false;
                state.armies[(r, c)] = 0;
            }
        }

        let record = extract(&state);
        assert_eq!(record.fog_count, 12);
        assert_eq!(record.distance_to_enemy_general, 4 + 5);
        assert_eq!((record.enemy_general_x, record.enemy_general_y), MISSING_CELL);
        assert_eq!(record.visible_cities_count, 1);
        assert_eq!(record.visible_mountains_count, 0);
        assert_eq!(record.border_pressure, 0);
    }

    #[test]
    fn test_no_visible_city_sentinel() {
        let mut state = sample_state();
        state.cities[(0, 4)] = false;
        state.cities[(3, 0)] = false;

        let record = extract(&state);
        assert_eq!((record.min_city_x, record.min_city_y), MISSING_CITY);
    }

    #[test]
    fn test_owned_city_is_not_a_target() {
        let mut state = sample_state();
        state.owned_cells[(3, 0)] = true;

        let record = extract(&state);
        assert_eq!((record.min_city_x, record.min_city_y), (0, 4));
    }

    #[test]
    fn test_empty_board_is_finite() {
        let record = extract(&GridState::empty(3, 4));

        assert_eq!(record.army_ratio, 0.0);
        assert_eq!(record.land_ratio, 0.0);
        assert!(record.army_ratio.is_finite() && record.land_ratio.is_finite());
        assert_eq!(record.border_pressure, 0);
        assert_eq!(record.distance_to_enemy_general, 7);
        assert_eq!(
            (record.max_owned_army_x, record.max_owned_army_y),
            MISSING_CELL
        );
    }

    #[test]
    fn test_ratios_never_divide_by_zero() {
        for (own, other) in [(0, 0), (10, 0), (0, 10), (u32::MAX, 0), (7, u32::MAX)] {
            let value = ratio(own, other);
            assert!(value.is_finite() && value >= 0.0, "{own}/{other} -> {value}");
        }
    }

    #[test]
    fn test_border_pressure_bounded_by_owned_cells() {
        let mut state = GridState::empty(4, 4);
        for (cell, _) in state.armies.clone().iter() {
            if (cell.0 + cell.1) % 2 == 0 {
                state.owned_cells[cell] = true;
            } else {
                state.opponent_cells[cell] = true;
            }
        }
        let record = extract(&state);
        assert_eq!(record.border_pressure, 8);
        assert!(record.border_pressure as usize <= state.owned_cells.count());
    }
}
