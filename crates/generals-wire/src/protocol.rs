//! Wire protocol between clients and the bridge
//!
//! One JSON object per line, internally tagged by a snake_case `type` field:
//! `{"type": "connect", "opponent_type": "random"}`.
//!
//! Optional fields are omitted rather than sent as `null`, except for the
//! game-over `winner`, which is explicitly nullable.

use generals_core::{BridgeError, Info, ObservationRecord, Result, StepOutcome};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Client -> bridge messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a game against a built-in opponent
    Connect {
        #[serde(
            default,
            deserialize_with = "lenient_name",
            skip_serializing_if = "Option::is_none"
        )]
        opponent_type: Option<String>,
        /// Accepted for compatibility, not used
        #[serde(
            default,
            deserialize_with = "lenient_name",
            skip_serializing_if = "Option::is_none"
        )]
        agent_type: Option<String>,
    },

    /// Play one turn; the payload is decoded by the session
    Action {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<serde_json::Value>,
    },

    /// Restart the current game in place
    Reset {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },

    /// Hand the current replay to the engine's replay sink
    SaveReplay {},
}

impl ClientMessage {
    pub const TYPES: [&'static str; 4] = ["connect", "action", "reset", "save_replay"];

    pub fn connect(opponent_type: impl Into<String>) -> Self {
        ClientMessage::Connect {
            opponent_type: Some(opponent_type.into()),
            agent_type: None,
        }
    }

    pub fn action(action: impl Serialize) -> Result<Self> {
        Ok(ClientMessage::Action {
            action: Some(serde_json::to_value(action)?),
        })
    }

    /// Wire tag of this message
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Connect { .. } => "connect",
            ClientMessage::Action { .. } => "action",
            ClientMessage::Reset { .. } => "reset",
            ClientMessage::SaveReplay {} => "save_replay",
        }
    }
}

/// Bridge -> client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Game created
    Connected {
        agent_id: String,
        opponent_id: String,
        message: String,
    },

    /// Observation after connect, reset or action
    Observation {
        observation: ObservationRecord,
        reward: f64,
        terminated: bool,
        truncated: bool,
        #[serde(default)]
        info: Info,
    },

    /// Recoverable failure; the connection stays open
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },

    /// Sent after the observation that ended the game
    GameOver {
        winner: Option<String>,
        final_rewards: HashMap<String, f64>,
        reason: String,
    },
}

impl ServerMessage {
    pub fn connected(agent_id: &str, opponent_id: &str) -> Self {
        ServerMessage::Connected {
            agent_id: agent_id.to_string(),
            opponent_id: opponent_id.to_string(),
            message: format!("Connected! Playing as {} vs {}", agent_id, opponent_id),
        }
    }

    /// Observation frame for a freshly reset game
    pub fn initial_observation(observation: ObservationRecord, info: Info) -> Self {
        ServerMessage::Observation {
            observation,
            reward: 0.0,
            terminated: false,
            truncated: false,
            info,
        }
    }

    pub fn observation(outcome: &StepOutcome) -> Self {
        ServerMessage::Observation {
            observation: outcome.observation,
            reward: outcome.reward,
            terminated: outcome.terminated,
            truncated: outcome.truncated,
            info: outcome.info.clone(),
        }
    }

    pub fn error(message: impl Into<String>, details: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn game_over(winner: Option<String>, client_id: &str, reward: f64) -> Self {
        ServerMessage::GameOver {
            winner,
            final_rewards: HashMap::from([(client_id.to_string(), reward)]),
            reason: "Game completed".to_string(),
        }
    }

    /// Error frame describing a recoverable failure
    pub fn from_error(err: &BridgeError) -> Self {
        match err {
            BridgeError::MalformedPayload(details) => {
                ServerMessage::error("Invalid JSON format", details.clone())
            }
            BridgeError::UnknownMessageType(tag) => {
                ServerMessage::error("Unknown message type", format!("Type: {}", tag))
            }
            BridgeError::NoActiveGame => {
                ServerMessage::error("No active game", "Send CONNECT first")
            }
            BridgeError::MissingAction => {
                ServerMessage::error("Missing action", "Action field is required")
            }
            other => ServerMessage::error("Processing error", other.to_string()),
        }
    }

    /// Wire tag of this message
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Observation { .. } => "observation",
            ServerMessage::Error { .. } => "error",
            ServerMessage::GameOver { .. } => "game_over",
        }
    }
}

/// Accept any JSON value for a name field; non-strings keep their JSON text
/// so they fall through to the "unrecognized" path instead of failing decode.
fn lenient_name<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Serialize a message as one newline-terminated frame
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let mut frame = serde_json::to_vec(msg)?;
    frame.push(b'\n');
    Ok(frame)
}

/// Decode one client frame (without its newline).
///
/// Invalid JSON is `MalformedPayload`; a missing or unknown `type` is
/// `UnknownMessageType`. Both are recoverable.
pub fn decode(line: &[u8]) -> Result<ClientMessage> {
    let value: serde_json::Value = serde_json::from_slice(line)
        .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;

    match value.get("type") {
        Some(serde_json::Value::String(tag)) if ClientMessage::TYPES.contains(&tag.as_str()) => {
            serde_json::from_value(value).map_err(|e| BridgeError::MalformedPayload(e.to_string()))
        }
        Some(serde_json::Value::String(tag)) => Err(BridgeError::UnknownMessageType(tag.clone())),
        Some(other) => Err(BridgeError::UnknownMessageType(other.to_string())),
        None => Err(BridgeError::UnknownMessageType("None".into())),
    }
}

/// Decode one bridge frame (client side)
pub fn decode_server(line: &[u8]) -> Result<ServerMessage> {
    decode_json(line)
}

fn decode_json<T: DeserializeOwned>(line: &[u8]) -> Result<T> {
    serde_json::from_slice(line).map_err(|e| BridgeError::MalformedPayload(e.to_string()))
}
