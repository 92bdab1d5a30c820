//! Client for the generals session bridge
//!
//! Speaks the line protocol over TCP and turns reply frames into typed
//! results. Error frames from the bridge surface as
//! [`BridgeError::Server`].

use generals_core::{Action, BridgeError, Result, StepOutcome};
use generals_wire::tcp::{self, TcpReadWrapper, TcpWriteWrapper};
use generals_wire::{
    AsyncReader, AsyncWriter, ClientMessage, DEFAULT_MAX_FRAME, ServerMessage, decode_server,
    encode,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Reply to a successful connect
#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub agent_id: String,
    pub opponent_id: String,
    pub message: String,
}

/// Final result sent after the last observation of a game
#[derive(Debug, Clone, PartialEq)]
pub struct GameOver {
    pub winner: Option<String>,
    pub final_rewards: HashMap<String, f64>,
    pub reason: String,
}

/// Reply to an action
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub outcome: StepOutcome,
    /// Present exactly when the outcome is terminal
    pub game_over: Option<GameOver>,
}

/// Connection to a running bridge
pub struct BridgeClient {
    reader: TcpReadWrapper,
    writer: TcpWriteWrapper,
    agent_id: Option<String>,
}

impl BridgeClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| BridgeError::IoError(format!("Failed to connect to bridge: {}", e)))?;
        let (reader, writer) = tcp::split(stream, DEFAULT_MAX_FRAME)?;
        Ok(Self {
            reader,
            writer,
            agent_id: None,
        })
    }

    /// Client id assigned by the bridge, once joined
    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    /// Start a game against the named opponent
    pub async fn join(&mut self, opponent: &str) -> Result<(Joined, StepOutcome)> {
        self.send(&ClientMessage::connect(opponent)).await?;

        let joined = match self.recv().await? {
            ServerMessage::Connected {
                agent_id,
                opponent_id,
                message,
            } => Joined {
                agent_id,
                opponent_id,
                message,
            },
            other => return Err(unexpected("connected", other)),
        };
        let outcome = expect_observation(self.recv().await?)?;

        debug!("Joined as {} vs {}", joined.agent_id, joined.opponent_id);
        self.agent_id = Some(joined.agent_id.clone());
        Ok((joined, outcome))
    }

    /// Play one turn
    pub async fn act(&mut self, action: Action) -> Result<Turn> {
        self.send(&ClientMessage::action(action.to_payload())?).await?;
        let outcome = expect_observation(self.recv().await?)?;

        let game_over = if outcome.is_terminal() {
            match self.recv().await? {
                ServerMessage::GameOver {
                    winner,
                    final_rewards,
                    reason,
                } => Some(GameOver {
                    winner,
                    final_rewards,
                    reason,
                }),
                other => return Err(unexpected("game_over", other)),
            }
        } else {
            None
        };
        Ok(Turn { outcome, game_over })
    }

    /// Restart the current game
    pub async fn reset(&mut self, seed: Option<u64>) -> Result<StepOutcome> {
        self.send(&ClientMessage::Reset { seed }).await?;
        expect_observation(self.recv().await?)
    }

    /// Ask the bridge to save a replay.
    ///
    /// Success produces no reply; a failure arrives as an error frame
    /// before the reply to the next request.
    pub async fn save_replay(&mut self) -> Result<()> {
        self.send(&ClientMessage::SaveReplay {}).await
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let frame = encode(msg)?;
        self.writer.write_frame(&frame).await
    }

    /// Write bytes as-is, without framing
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_frame(bytes).await
    }

    /// Next frame from the bridge
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        match self.reader.read_frame().await? {
            Some(line) => decode_server(&line),
            None => Err(BridgeError::IoError("connection closed by bridge".into())),
        }
    }

    /// Next frame, or `None` if nothing arrives within `wait`
    pub async fn recv_within(&mut self, wait: Duration) -> Result<Option<ServerMessage>> {
        match tokio::time::timeout(wait, self.recv()).await {
            Ok(frame) => frame.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await
    }
}

fn expect_observation(msg: ServerMessage) -> Result<StepOutcome> {
    match msg {
        ServerMessage::Observation {
            observation,
            reward,
            terminated,
            truncated,
            info,
        } => Ok(StepOutcome {
            observation,
            reward,
            terminated,
            truncated,
            info,
        }),
        other => Err(unexpected("observation", other)),
    }
}

fn unexpected(wanted: &str, msg: ServerMessage) -> BridgeError {
    match msg {
        ServerMessage::Error { message, details } => BridgeError::Server {
            message,
            details: details.unwrap_or_default(),
        },
        other => BridgeError::ProtocolError(format!(
            "expected {} frame, got {}",
            wanted,
            other.kind()
        )),
    }
}
