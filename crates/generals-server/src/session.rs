//! One client's game against a built-in opponent

use crate::environment::{EngineFactory, GameEngine, Opponent, PlayerViews, ResetOptions};
use generals_core::{
    Action, BridgeError, ClientId, Info, ObservationRecord, OpponentKind, Result, SessionStatus,
    StepOutcome, extract,
};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Resolve a requested opponent name, falling back to the default policy
pub fn resolve_opponent(requested: Option<&str>) -> OpponentKind {
    match requested {
        None => OpponentKind::default(),
        Some(name) => OpponentKind::parse(name).unwrap_or_else(|| {
            warn!(
                "Unknown opponent type '{}', using {}",
                name,
                OpponentKind::default()
            );
            OpponentKind::default()
        }),
    }
}

/// A game session owned by exactly one worker
pub struct GameSession {
    client_id: ClientId,
    opponent_kind: OpponentKind,
    opponent: Box<dyn Opponent>,
    engine: Option<Box<dyn GameEngine>>,
    views: Option<PlayerViews>,
    info: Info,
    status: SessionStatus,
    last_observation: Option<ObservationRecord>,
    render: bool,
}

impl GameSession {
    /// Create the engine and opponent for a client. The game is not
    /// started until [`GameSession::reset`] is called.
    pub fn new(
        client_id: ClientId,
        requested_opponent: Option<&str>,
        factory: &dyn EngineFactory,
        render_mode: Option<&str>,
    ) -> Result<Self> {
        let opponent_kind = resolve_opponent(requested_opponent);
        let opponent = factory.create_opponent(opponent_kind);
        let players = [client_id.clone(), opponent.id().to_string()];
        let engine = factory.create_engine(players, render_mode)?;

        debug!(
            "Created session for {} against {} ({})",
            client_id,
            opponent.id(),
            opponent_kind
        );

        Ok(Self {
            client_id,
            opponent_kind,
            opponent,
            engine: Some(engine),
            views: None,
            info: Info::new(),
            status: SessionStatus::Running,
            last_observation: None,
            render: render_mode.is_some(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn opponent_id(&self) -> &str {
        self.opponent.id()
    }

    pub fn opponent_kind(&self) -> OpponentKind {
        self.opponent_kind
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Start a new game and return the client's first observation
    pub fn reset(&mut self, options: &ResetOptions) -> Result<(ObservationRecord, Info)> {
        let engine = self.engine_mut()?;
        let (views, info) = engine.reset(options)?;
        let record = observe(&views, &self.client_id)?;

        self.opponent.reset();
        self.views = Some(views);
        self.info = info.clone();
        self.status = SessionStatus::Running;
        self.last_observation = Some(record);

        info!(
            "Game reset for {} (seed: {:?})",
            self.client_id, options.seed
        );
        Ok((record, info))
    }

    /// Advance the game by one turn.
    ///
    /// Once the game is over the engine is left alone and the last
    /// observation is returned again with zero reward.
    pub fn step(&mut self, action: Action) -> Result<StepOutcome> {
        if self.status.is_terminal() {
            debug!("Step on finished game for {}", self.client_id);
            return Ok(self.terminal_snapshot());
        }

        let views = self.views.as_ref().ok_or_else(|| {
            BridgeError::EngineNotReady("game has not been reset".into())
        })?;
        let opponent_id = self.opponent.id().to_string();
        let opponent_action = match views.get(&opponent_id) {
            Some(view) => self.opponent.act(view),
            None => Action::pass_turn(),
        };

        let actions = HashMap::from([
            (self.client_id.clone(), action),
            (opponent_id, opponent_action),
        ]);

        let render = self.render;
        let engine = self.engine_mut()?;
        let step = engine.step(&actions)?;
        if render {
            if let Err(e) = engine.render() {
                warn!("Render failed: {}", e);
            }
        }

        let record = observe(&step.views, &self.client_id)?;
        let reward = step.rewards.get(&self.client_id).copied().unwrap_or(0.0);

        self.status = SessionStatus::from_flags(step.terminated, step.truncated);
        self.views = Some(step.views);
        self.info = step.info;
        self.last_observation = Some(record);

        if self.status.is_terminal() {
            info!(
                "Game over for {}: {:?}, winner {:?}",
                self.client_id,
                self.status,
                self.winner()
            );
        }

        Ok(StepOutcome {
            observation: record,
            reward,
            terminated: self.status.terminated(),
            truncated: self.status.truncated(),
            info: self.info.clone(),
        })
    }

    /// Winner reported by the engine, once the game is over
    pub fn winner(&self) -> Option<String> {
        if !self.status.is_terminal() {
            return None;
        }
        self.info
            .get("winner")
            .and_then(|w| w.as_str())
            .map(str::to_string)
    }

    /// Hand the game's replay to the engine's replay sink
    pub fn save_replay(&mut self) -> Result<String> {
        let name = self.client_id.clone();
        self.engine_mut()?.save_replay(&name)
    }

    /// Release the engine. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            match engine.close() {
                Ok(()) => debug!("Closed game for {}", self.client_id),
                Err(e) => error!("Error closing game for {}: {}", self.client_id, e),
            }
        }
        self.views = None;
    }

    fn terminal_snapshot(&self) -> StepOutcome {
        StepOutcome {
            observation: self.last_observation.unwrap_or_default(),
            reward: 0.0,
            terminated: self.status.terminated(),
            truncated: self.status.truncated(),
            info: self.info.clone(),
        }
    }

    fn engine_mut(&mut self) -> Result<&mut Box<dyn GameEngine>> {
        self.engine
            .as_mut()
            .ok_or_else(|| BridgeError::EngineNotReady("session is closed".into()))
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn observe(views: &PlayerViews, client_id: &str) -> Result<ObservationRecord> {
    views
        .get(client_id)
        .map(extract)
        .ok_or_else(|| BridgeError::EngineError(format!("no view for player {}", client_id)))
}
