//! Player identities and session status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a player inside the engine
pub type PlayerId = String;

/// Identifier of an accepted connection (`client_<n>`); doubles as the
/// client's player id
pub type ClientId = String;

/// Format the client id assigned to the `n`-th accepted connection
pub fn client_id(n: u64) -> ClientId {
    format!("client_{}", n)
}

/// Built-in opponent policies
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OpponentKind {
    #[default]
    Random,
    Expander,
}

impl OpponentKind {
    /// Parse a wire name; `None` for anything unrecognized
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "random" => Some(OpponentKind::Random),
            "expander" => Some(OpponentKind::Expander),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpponentKind::Random => "random",
            OpponentKind::Expander => "expander",
        }
    }
}

impl fmt::Display for OpponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal flag of a session
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Running,
    Terminated,
    Truncated,
}

impl SessionStatus {
    /// Status after an engine step; termination wins over truncation
    pub fn from_flags(terminated: bool, truncated: bool) -> Self {
        if terminated {
            SessionStatus::Terminated
        } else if truncated {
            SessionStatus::Truncated
        } else {
            SessionStatus::Running
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }

    pub fn terminated(&self) -> bool {
        matches!(self, SessionStatus::Terminated)
    }

    pub fn truncated(&self) -> bool {
        matches!(self, SessionStatus::Truncated)
    }
}
