//! Dense row-major grid
//!
//! Serializes as nested JSON arrays (`[[row0...], [row1...]]`), which is the
//! only form grids ever take on the wire.

use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::{Index, IndexMut};

/// Grid coordinate as (row, column)
pub type Cell = (usize, usize);

const NEIGHBOR_OFFSETS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Fixed-size two-dimensional grid stored row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    height: usize,
    width: usize,
    cells: Vec<T>,
}

impl<T: Clone> Grid<T> {
    /// Create a grid filled with `value`
    pub fn filled(height: usize, width: usize, value: T) -> Self {
        Self {
            height,
            width,
            cells: vec![value; height * width],
        }
    }
}

impl<T: Clone + Default> Grid<T> {
    /// Create a grid filled with `T::default()`
    pub fn new(height: usize, width: usize) -> Self {
        Self::filled(height, width, T::default())
    }
}

impl<T> Grid<T> {
    /// Build a grid from rows; every row must have the same length
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self, String> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        let mut cells = Vec::with_capacity(height * width);
        for (r, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(format!(
                    "row {} has {} cells, expected {}",
                    r,
                    row.len(),
                    width
                ));
            }
            cells.extend(row);
        }
        Ok(Self {
            height,
            width,
            cells,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether (row, col) lies inside the grid
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.height && col < self.width
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if self.contains(row, col) {
            self.cells.get(row * self.width + col)
        } else {
            None
        }
    }

    /// Iterate cells in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (Cell, &T)> + '_ {
        let width = self.width.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, value)| ((i / width, i % width), value))
    }

    /// Row slices in order
    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.cells.chunks(self.width.max(1)).take(self.height)
    }

    /// In-bounds up/down/left/right neighbours of a cell
    pub fn neighbors(&self, row: usize, col: usize) -> impl Iterator<Item = Cell> + '_ {
        NEIGHBOR_OFFSETS.iter().filter_map(move |&(dr, dc)| {
            let r = row.checked_add_signed(dr)?;
            let c = col.checked_add_signed(dc)?;
            self.contains(r, c).then_some((r, c))
        })
    }

    /// Apply `f` to every cell, keeping the shape
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Grid<U> {
        Grid {
            height: self.height,
            width: self.width,
            cells: self.cells.iter().map(f).collect(),
        }
    }
}

impl Grid<bool> {
    /// Number of set cells
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|set| **set).count()
    }

    /// Whether the cell is inside the grid and set
    pub fn is_set(&self, row: usize, col: usize) -> bool {
        self.get(row, col).copied().unwrap_or(false)
    }
}

impl<T> Index<Cell> for Grid<T> {
    type Output = T;

    fn index(&self, (row, col): Cell) -> &T {
        assert!(self.contains(row, col), "cell ({row}, {col}) out of bounds");
        &self.cells[row * self.width + col]
    }
}

impl<T> IndexMut<Cell> for Grid<T> {
    fn index_mut(&mut self, (row, col): Cell) -> &mut T {
        assert!(self.contains(row, col), "cell ({row}, {col}) out of bounds");
        &mut self.cells[row * self.width + col]
    }
}

impl<T: Serialize> Serialize for Grid<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.height))?;
        for row in self.rows() {
            seq.serialize_element(row)?;
        }
        seq.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Grid<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = Vec::<Vec<T>>::deserialize(deserializer)?;
        Grid::from_rows(rows).map_err(D::Error::custom)
    }
}
