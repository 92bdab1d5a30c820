//! Seams to the simulation engine and the built-in opponents
//!
//! The bridge never implements game rules itself. It drives an engine
//! through [`GameEngine`] and asks an [`Opponent`] for the second player's
//! moves; an [`EngineFactory`] produces fresh instances for every session.

use generals_core::{Action, GridState, Info, OpponentKind, PlayerId, Result};
use std::collections::HashMap;

/// Per-player views keyed by player id
pub type PlayerViews = HashMap<PlayerId, GridState>;

/// Joint action for one turn, keyed by player id
pub type JointAction = HashMap<PlayerId, Action>;

/// Options forwarded to [`GameEngine::reset`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetOptions {
    /// Map seed; the engine picks one when absent
    pub seed: Option<u64>,
}

impl ResetOptions {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

/// Result of advancing the engine by one turn
#[derive(Debug, Clone)]
pub struct EngineStep {
    pub views: PlayerViews,
    pub rewards: HashMap<PlayerId, f64>,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info,
}

/// Trait for the two-player simulation engine
///
/// Implementations own all game state. Every method is synchronous and is
/// called from the worker that owns the session.
pub trait GameEngine: Send {
    /// Start a new game and return every player's initial view
    fn reset(&mut self, options: &ResetOptions) -> Result<(PlayerViews, Info)>;

    /// Apply one action per player and advance a turn
    fn step(&mut self, actions: &JointAction) -> Result<EngineStep>;

    /// Render the current board when a render mode is configured
    fn render(&mut self) -> Result<()> {
        Ok(())
    }

    /// Hand the game's replay to the engine's replay sink.
    ///
    /// Returns a description of where it went.
    fn save_replay(&mut self, name: &str) -> Result<String> {
        let _ = name;
        Err(generals_core::BridgeError::ReplayUnavailable(
            "engine does not record replays".into(),
        ))
    }

    /// Release engine resources
    fn close(&mut self) -> Result<()>;
}

/// Trait for the built-in opponent's decision policy
pub trait Opponent: Send {
    /// Player id used inside the engine
    fn id(&self) -> &str;

    /// Choose a move from the opponent's own view
    fn act(&mut self, view: &GridState) -> Action;

    /// Forget any per-game memory
    fn reset(&mut self) {}
}

/// Creates engines and opponents for new sessions
pub trait EngineFactory: Send + Sync + 'static {
    /// Build an engine for the given players.
    ///
    /// `render_mode` is passed through from configuration untouched.
    fn create_engine(
        &self,
        players: [PlayerId; 2],
        render_mode: Option<&str>,
    ) -> Result<Box<dyn GameEngine>>;

    /// Build an opponent policy
    fn create_opponent(&self, kind: OpponentKind) -> Box<dyn Opponent>;
}
