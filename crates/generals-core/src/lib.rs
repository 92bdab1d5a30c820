//! # generals-core
//!
//! Core types for the generals session bridge.
//!
//! This crate provides the foundational types shared by the wire codec and
//! the server:
//! - Grid storage with nested-array serialization
//! - Per-player raw game state and the flat observation record
//! - The feature extractor turning one into the other
//! - Player actions and their positional wire form
//! - The bridge error taxonomy

pub mod action;
pub mod agent;
pub mod error;
pub mod features;
pub mod grid;
pub mod observation;

pub use action::{Action, Direction};
pub use agent::{ClientId, OpponentKind, PlayerId, SessionStatus, client_id};
pub use error::{BridgeError, Result};
pub use features::extract;
pub use grid::{Cell, Grid};
pub use observation::{GridState, Info, ObservationRecord, StepOutcome};
