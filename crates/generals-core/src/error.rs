//! Error types for the session bridge

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Frame is not valid JSON
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Frame carries a missing or unrecognized `type` tag
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Action/Reset/SaveReplay received before Connect
    #[error("No active game")]
    NoActiveGame,

    /// Action message without an `action` field
    #[error("Action field is required")]
    MissingAction,

    /// Action payload could not be decoded
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// The simulation engine reported a failure
    #[error("Engine error: {0}")]
    EngineError(String),

    /// The engine was closed or never reset
    #[error("Engine not ready: {0}")]
    EngineNotReady(String),

    /// Replay could not be handed to the external sink
    #[error("Replay unavailable: {0}")]
    ReplayUnavailable(String),

    /// Socket or stream failure
    #[error("IO error: {0}")]
    IoError(String),

    /// Frame exceeded the configured limit
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Unexpected frame sequence
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Error frame received from the bridge
    #[error("Server error: {message} ({details})")]
    Server { message: String, details: String },

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether the error ends the connection that produced it.
    ///
    /// Everything raised while decoding or dispatching a single frame is
    /// recoverable; only transport failures are fatal to the worker.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::IoError(_) | BridgeError::FrameTooLarge(_))
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BridgeError::IoError("reset".into()).is_fatal());
        assert!(BridgeError::FrameTooLarge(10).is_fatal());
        assert!(!BridgeError::MalformedPayload("eof".into()).is_fatal());
        assert!(!BridgeError::NoActiveGame.is_fatal());
        assert!(!BridgeError::EngineError("boom".into()).is_fatal());
    }

    #[test]
    fn test_io_conversion() {
        let err: BridgeError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset").into();
        assert!(matches!(err, BridgeError::IoError(ref msg) if msg.contains("peer reset")));
    }
}
