//! # generals-server
//!
//! Multi-client session bridge for the generals game.
//!
//! This crate provides:
//! - `GameEngine`, `Opponent` and `EngineFactory` traits for plugging in a
//!   simulation
//! - `GameSession`, one client's game against a built-in opponent
//! - The per-connection worker and its protocol state machine
//! - `Bridge`, the TCP listener with worker supervision and shutdown

pub mod bridge;
pub mod config;
pub mod environment;
pub mod registry;
pub mod session;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use environment::{
    EngineFactory, EngineStep, GameEngine, JointAction, Opponent, PlayerViews, ResetOptions,
};
pub use registry::{BridgeStats, WorkerRegistry};
pub use session::GameSession;
pub use worker::{Dispatcher, Worker, WorkerState};
