//! Player actions
//!
//! On the wire an action is the positional array
//! `[pass, row, col, direction, split]`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BridgeError, Result};
use crate::grid::Cell;

/// Movement direction from the source cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Wire index (0 up, 1 down, 2 left, 3 right)
    pub fn index(self) -> u8 {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    pub fn from_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(Direction::Up),
            1 => Some(Direction::Down),
            2 => Some(Direction::Left),
            3 => Some(Direction::Right),
            _ => None,
        }
    }

    /// (row, col) offset
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }
}

/// A single move order, or a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    /// Skip this turn; the remaining fields are ignored
    pub pass: bool,
    pub row: usize,
    pub col: usize,
    pub direction: Direction,
    /// Move half the army instead of all but one
    pub split: bool,
}

impl Action {
    /// Pass the turn
    pub fn pass_turn() -> Self {
        Self {
            pass: true,
            row: 0,
            col: 0,
            direction: Direction::Up,
            split: false,
        }
    }

    /// Move from `(row, col)` one cell in `direction`
    pub fn move_from(row: usize, col: usize, direction: Direction, split: bool) -> Self {
        Self {
            pass: false,
            row,
            col,
            direction,
            split,
        }
    }

    pub fn source(&self) -> Cell {
        (self.row, self.col)
    }

    /// Destination cell, or `None` if it would leave the grid at the top/left edge
    pub fn target(&self) -> Option<Cell> {
        let (dr, dc) = self.direction.offset();
        Some((
            self.row.checked_add_signed(dr)?,
            self.col.checked_add_signed(dc)?,
        ))
    }

    /// Positional wire form
    pub fn to_payload(&self) -> [u64; 5] {
        [
            u64::from(self.pass),
            self.row as u64,
            self.col as u64,
            u64::from(self.direction.index()),
            u64::from(self.split),
        ]
    }

    /// Decode the positional payload sent by clients.
    ///
    /// Accepts integers, integral floats and booleans in every slot.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self> {
        let fields = payload.as_array().ok_or_else(|| {
            BridgeError::InvalidAction(format!("expected an array, got {}", payload))
        })?;
        if fields.len() != 5 {
            return Err(BridgeError::InvalidAction(format!(
                "expected 5 fields [pass, row, col, direction, split], got {}",
                fields.len()
            )));
        }

        let mut values = [0u64; 5];
        for (slot, field) in values.iter_mut().zip(fields) {
            *slot = payload_number(field)?;
        }

        let direction = Direction::from_index(values[3])
            .ok_or_else(|| BridgeError::InvalidAction(format!("unknown direction {}", values[3])))?;

        Ok(Self {
            pass: values[0] != 0,
            row: usize::try_from(values[1])
                .map_err(|_| BridgeError::InvalidAction("row out of range".into()))?,
            col: usize::try_from(values[2])
                .map_err(|_| BridgeError::InvalidAction("col out of range".into()))?,
            direction,
            split: values[4] != 0,
        })
    }
}

fn payload_number(value: &serde_json::Value) -> Result<u64> {
    match value {
        serde_json::Value::Bool(flag) => Ok(u64::from(*flag)),
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return Ok(v);
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(f as u64),
                _ => Err(BridgeError::InvalidAction(format!(
                    "expected a non-negative integer, got {}",
                    n
                ))),
            }
        }
        other => Err(BridgeError::InvalidAction(format!(
            "expected a number, got {}",
            other
        ))),
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_payload().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Action::from_payload(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_positional_payload() {
        let action = Action::from_payload(&json!([0, 2, 3, 1, 1])).unwrap();
        assert!(!action.pass);
        assert_eq!(action.source(), (2, 3));
        assert_eq!(action.direction, Direction::Down);
        assert_eq!(action.target(), Some((3, 3)));
        assert!(action.split);
    }

    #[test]
    fn test_float_and_bool_fields() {
        let action = Action::from_payload(&json!([true, 1.0, 4.0, 2.0, false])).unwrap();
        assert!(action.pass);
        assert_eq!(action.source(), (1, 4));
        assert_eq!(action.target(), Some((1, 3)));
    }

    #[test]
    fn test_target_off_top_edge() {
        let action = Action::move_from(0, 3, Direction::Up, false);
        assert_eq!(action.target(), None);
    }

    #[test]
    fn test_rejects_bad_payloads() {
        for payload in [
            json!({"pass": 0}),
            json!([0, 1, 2, 3]),
            json!([0, -1, 2, 3, 0]),
            json!([0, 1.5, 2, 3, 0]),
            json!([0, 1, 2, 7, 0]),
            json!([0, "1", 2, 3, 0]),
        ] {
            let err = Action::from_payload(&payload).unwrap_err();
            assert!(
                matches!(err, BridgeError::InvalidAction(_)),
                "payload {} gave {:?}",
                payload,
                err
            );
        }
    }

    #[test]
    fn test_serializes_positionally() {
        let action = Action::move_from(5, 6, Direction::Right, true);
        assert_eq!(serde_json::to_value(action).unwrap(), json!([0, 5, 6, 3, 1]));

        let decoded: Action = serde_json::from_value(json!([0, 5, 6, 3, 1])).unwrap();
        assert_eq!(decoded, action);
    }
}
