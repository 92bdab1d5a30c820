//! Scripted engine used by the unit tests

use crate::environment::{
    EngineFactory, EngineStep, GameEngine, JointAction, Opponent, PlayerViews, ResetOptions,
};
use generals_core::{
    Action, BridgeError, GridState, Info, OpponentKind, PlayerId, Result,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Counters shared between a factory and every engine it creates
#[derive(Debug, Default)]
pub struct Probe {
    pub engines: AtomicUsize,
    pub resets: AtomicUsize,
    pub steps: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_next_step: AtomicBool,
    pub fail_next_reset: AtomicBool,
}

impl Probe {
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Engine that ends the game after a fixed number of turns, with the
/// client winning
pub struct ScriptedEngine {
    players: [PlayerId; 2],
    timestep: u32,
    game_length: u32,
    probe: Arc<Probe>,
}

impl ScriptedEngine {
    fn views(&self) -> PlayerViews {
        self.players
            .iter()
            .enumerate()
            .map(|(i, player)| {
                let mut view = GridState::empty(3, 3);
                let home = if i == 0 { (0, 0) } else { (2, 2) };
                view.owned_cells[home] = true;
                view.generals[home] = true;
                view.armies[home] = self.timestep + 1;
                view.owned_land_count = 1;
                view.owned_army_count = self.timestep + 1;
                view.timestep = self.timestep;
                (player.clone(), view)
            })
            .collect()
    }
}

impl GameEngine for ScriptedEngine {
    fn reset(&mut self, options: &ResetOptions) -> Result<(PlayerViews, Info)> {
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_next_reset.swap(false, Ordering::SeqCst) {
            return Err(BridgeError::EngineError("scripted reset failure".into()));
        }
        self.timestep = 0;
        let mut info = Info::new();
        info.insert("seed".into(), json!(options.seed.unwrap_or(0)));
        Ok((self.views(), info))
    }

    fn step(&mut self, actions: &JointAction) -> Result<EngineStep> {
        self.probe.steps.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_next_step.swap(false, Ordering::SeqCst) {
            return Err(BridgeError::EngineError("scripted step failure".into()));
        }
        assert_eq!(actions.len(), 2, "one action per player");

        self.timestep += 1;
        let over = self.timestep >= self.game_length;
        let [client, opponent] = &self.players;

        let mut rewards = HashMap::new();
        let mut info = Info::new();
        info.insert("timestep".into(), json!(self.timestep));
        if over {
            rewards.insert(client.clone(), 1.0);
            rewards.insert(opponent.clone(), -1.0);
            info.insert("winner".into(), json!(client));
        }

        Ok(EngineStep {
            views: self.views(),
            rewards,
            terminated: over,
            truncated: false,
            info,
        })
    }

    fn save_replay(&mut self, name: &str) -> Result<String> {
        Ok(format!("memory://{}", name))
    }

    fn close(&mut self) -> Result<()> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Opponent that always passes
pub struct PassingOpponent;

impl Opponent for PassingOpponent {
    fn id(&self) -> &str {
        "Scripted"
    }

    fn act(&mut self, _view: &GridState) -> Action {
        Action::pass_turn()
    }
}

pub struct ScriptedFactory {
    pub probe: Arc<Probe>,
    pub game_length: u32,
}

impl ScriptedFactory {
    pub fn new(game_length: u32) -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            game_length,
        }
    }
}

impl EngineFactory for ScriptedFactory {
    fn create_engine(
        &self,
        players: [PlayerId; 2],
        _render_mode: Option<&str>,
    ) -> Result<Box<dyn GameEngine>> {
        self.probe.engines.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEngine {
            players,
            timestep: 0,
            game_length: self.game_length,
            probe: Arc::clone(&self.probe),
        }))
    }

    fn create_opponent(&self, _kind: OpponentKind) -> Box<dyn Opponent> {
        Box::new(PassingOpponent)
    }
}
