//! Reference simulation for the generals session bridge
//!
//! This crate provides:
//! - `ArenaEngine`, a seeded two-player territory game behind the
//!   bridge's `GameEngine` seam
//! - The `Random` and `Expander` opponent policies
//! - `SimFactory`, handing both to the bridge for every new session

pub mod board;
pub mod config;
pub mod engine;
pub mod opponents;

pub use config::ArenaConfig;
pub use engine::ArenaEngine;
pub use opponents::{ExpanderOpponent, RandomOpponent};

use generals_core::{OpponentKind, PlayerId, Result};
use generals_server::{EngineFactory, GameEngine, Opponent};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Creates arenas and opponents for the bridge
pub struct SimFactory {
    config: ArenaConfig,
    opponent_seed: Option<u64>,
    created: AtomicU64,
}

impl SimFactory {
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            config,
            opponent_seed: None,
            created: AtomicU64::new(0),
        }
    }

    /// Seed opponent policies deterministically; the n-th opponent uses
    /// `seed + n`
    pub fn with_opponent_seed(config: ArenaConfig, seed: u64) -> Self {
        Self {
            opponent_seed: Some(seed),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    fn opponent_rng(&self) -> StdRng {
        let n = self.created.fetch_add(1, Ordering::Relaxed);
        match self.opponent_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(n)),
            None => StdRng::from_os_rng(),
        }
    }
}

impl EngineFactory for SimFactory {
    fn create_engine(
        &self,
        players: [PlayerId; 2],
        render_mode: Option<&str>,
    ) -> Result<Box<dyn GameEngine>> {
        Ok(Box::new(ArenaEngine::new(
            self.config.clone(),
            players,
            render_mode,
        )))
    }

    fn create_opponent(&self, kind: OpponentKind) -> Box<dyn Opponent> {
        let rng = self.opponent_rng();
        match kind {
            OpponentKind::Random => Box::new(RandomOpponent::new(rng)),
            OpponentKind::Expander => Box::new(ExpanderOpponent::new(rng)),
        }
    }
}
