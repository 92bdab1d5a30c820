//! Reference arena implementing the bridge's engine seam

use crate::board::{Board, MoveResult, Seat};
use crate::config::ArenaConfig;
use generals_core::{Action, BridgeError, Info, PlayerId, Result};
use generals_server::{EngineStep, GameEngine, JointAction, PlayerViews, ResetOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use tracing::{debug, info, warn};

/// Render modes that print the board
pub const RENDER_MODES: [&str; 2] = ["human", "ansi"];

struct Game {
    board: Board,
    seed: u64,
    timestep: u32,
    winner: Option<Seat>,
    history: Vec<[[u64; 5]; 2]>,
}

/// Replay document written by `save_replay`
#[derive(Debug, Serialize)]
struct Replay<'a> {
    seed: u64,
    height: usize,
    width: usize,
    players: &'a [PlayerId; 2],
    winner: Option<&'a str>,
    actions: &'a [[[u64; 5]; 2]],
}

/// Two-player arena. Seat 0 is the first player id, seat 1 the second.
pub struct ArenaEngine {
    config: ArenaConfig,
    players: [PlayerId; 2],
    render: bool,
    game: Option<Game>,
}

impl ArenaEngine {
    pub fn new(config: ArenaConfig, players: [PlayerId; 2], render_mode: Option<&str>) -> Self {
        let render = match render_mode {
            Some(mode) if RENDER_MODES.contains(&mode) => true,
            Some(mode) => {
                warn!("Unsupported render mode '{}', rendering disabled", mode);
                false
            }
            None => false,
        };
        Self {
            config,
            players,
            render,
            game: None,
        }
    }

    pub fn players(&self) -> &[PlayerId; 2] {
        &self.players
    }

    pub fn seed(&self) -> Option<u64> {
        self.game.as_ref().map(|game| game.seed)
    }

    /// Current board, once reset
    pub fn board(&self) -> Option<&Board> {
        self.game.as_ref().map(|game| &game.board)
    }
}

fn player_views(players: &[PlayerId; 2], game: &Game) -> PlayerViews {
    players
        .iter()
        .enumerate()
        .map(|(seat, player)| (player.clone(), game.board.view(seat, game.timestep)))
        .collect()
}

impl GameEngine for ArenaEngine {
    fn reset(&mut self, options: &ResetOptions) -> Result<(PlayerViews, Info)> {
        let seed = options.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);
        let game = Game {
            board: Board::generate(&self.config, &mut rng),
            seed,
            timestep: 0,
            winner: None,
            history: Vec::new(),
        };
        debug!(
            "Generated {}x{} arena with seed {}",
            self.config.height, self.config.width, seed
        );

        let views = player_views(&self.players, &game);
        let mut info = Info::new();
        info.insert("seed".into(), json!(seed));
        info.insert("timestep".into(), json!(0));
        self.game = Some(game);
        Ok((views, info))
    }

    fn step(&mut self, actions: &JointAction) -> Result<EngineStep> {
        let max_turns = self.config.max_turns;
        let players = self.players.clone();
        let game = self
            .game
            .as_mut()
            .ok_or_else(|| BridgeError::EngineNotReady("arena has not been reset".into()))?;
        if game.winner.is_some() || game.timestep >= max_turns {
            return Err(BridgeError::EngineError(
                "game is over, reset to play again".into(),
            ));
        }

        let orders: [Action; 2] = [0, 1].map(|seat| {
            actions
                .get(&players[seat])
                .copied()
                .unwrap_or_else(Action::pass_turn)
        });

        // Move order alternates so neither seat always acts first
        let first = (game.timestep % 2) as Seat;
        for seat in [first, 1 - first] {
            if game.board.apply_move(seat, &orders[seat]) == MoveResult::CapturedGeneral {
                game.winner = Some(seat);
                break;
            }
        }
        game.history
            .push([orders[0].to_payload(), orders[1].to_payload()]);
        game.timestep += 1;
        if game.winner.is_none() {
            game.board.grow(game.timestep);
        }

        let terminated = game.winner.is_some();
        let truncated = !terminated && game.timestep >= max_turns;

        let mut rewards = HashMap::new();
        for (seat, player) in players.iter().enumerate() {
            let reward = match game.winner {
                Some(winner) if winner == seat => 1.0,
                Some(_) => -1.0,
                None => 0.0,
            };
            rewards.insert(player.clone(), reward);
        }

        let mut info = Info::new();
        info.insert("timestep".into(), json!(game.timestep));
        if let Some(winner) = game.winner {
            info!("{} captured the enemy general", players[winner]);
            info.insert("winner".into(), json!(players[winner]));
        } else if truncated {
            debug!("Arena reached {} turns", max_turns);
        }

        Ok(EngineStep {
            views: player_views(&players, game),
            rewards,
            terminated,
            truncated,
            info,
        })
    }

    fn render(&mut self) -> Result<()> {
        if let (true, Some(game)) = (self.render, self.game.as_ref()) {
            debug!("Turn {}\n{}", game.timestep, game.board);
        }
        Ok(())
    }

    fn save_replay(&mut self, name: &str) -> Result<String> {
        let dir = self.config.replay_dir.as_ref().ok_or_else(|| {
            BridgeError::ReplayUnavailable("no replay directory configured".into())
        })?;
        let game = self
            .game
            .as_ref()
            .ok_or_else(|| BridgeError::ReplayUnavailable("no game has been played".into()))?;

        let replay = Replay {
            seed: game.seed,
            height: game.board.height(),
            width: game.board.width(),
            players: &self.players,
            winner: game.winner.map(|seat| self.players[seat].as_str()),
            actions: &game.history,
        };
        let body = serde_json::to_vec_pretty(&replay)?;

        fs::create_dir_all(dir).map_err(|e| {
            BridgeError::ReplayUnavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;
        let path = dir.join(format!("{}_{}.json", name, game.seed));
        fs::write(&path, body).map_err(|e| {
            BridgeError::ReplayUnavailable(format!("cannot write {}: {}", path.display(), e))
        })?;

        Ok(path.display().to_string())
    }

    fn close(&mut self) -> Result<()> {
        if self.game.take().is_some() {
            debug!("Arena for {} closed", self.players[0]);
        }
        Ok(())
    }
}
