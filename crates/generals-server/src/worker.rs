//! Per-connection worker
//!
//! A [`Dispatcher`] turns decoded frames into reply frames and owns the
//! client's [`GameSession`]. A [`Worker`] drives one dispatcher from a
//! framed connection until the peer leaves or the bridge asks it to stop.

use crate::environment::{EngineFactory, ResetOptions};
use crate::session::GameSession;
use generals_core::{Action, BridgeError, ClientId, Result};
use generals_wire::{AsyncReader, AsyncWriter, ClientMessage, ServerMessage, decode, encode};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, not yet reading
    Idle,
    /// Reading frames, no game yet
    AwaitingConnect,
    /// A session exists
    InGame,
    /// Leaving the read loop, releasing the session
    Terminal,
    /// Socket closed and disconnect reported
    Closed,
}

/// Protocol state machine for one client
pub struct Dispatcher {
    client_id: ClientId,
    factory: Arc<dyn EngineFactory>,
    render_mode: Option<String>,
    session: Option<GameSession>,
    state: WorkerState,
}

impl Dispatcher {
    pub fn new(
        client_id: ClientId,
        factory: Arc<dyn EngineFactory>,
        render_mode: Option<String>,
    ) -> Self {
        Self {
            client_id,
            factory,
            render_mode,
            session: None,
            state: WorkerState::Idle,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    /// Start accepting frames
    pub fn begin(&mut self) {
        if self.state == WorkerState::Idle {
            self.state = WorkerState::AwaitingConnect;
        }
    }

    /// Handle one frame and return the replies, in order.
    ///
    /// Every failure here is recoverable and becomes an error frame.
    pub fn handle_line(&mut self, line: &[u8]) -> Vec<ServerMessage> {
        match decode(line).and_then(|msg| self.dispatch(msg)) {
            Ok(replies) => replies,
            Err(err) => {
                warn!("Error handling frame from {}: {}", self.client_id, err);
                vec![ServerMessage::from_error(&err)]
            }
        }
    }

    fn dispatch(&mut self, msg: ClientMessage) -> Result<Vec<ServerMessage>> {
        debug!("{} -> {}", self.client_id, msg.kind());
        match msg {
            ClientMessage::Connect { opponent_type, .. } => self.connect(opponent_type.as_deref()),
            ClientMessage::Action { action } => {
                let session = self.active_session()?;
                let payload = action.ok_or(BridgeError::MissingAction)?;
                let action = Action::from_payload(&payload)?;
                let outcome = session.step(action)?;

                let mut replies = vec![ServerMessage::observation(&outcome)];
                if outcome.is_terminal() {
                    replies.push(ServerMessage::game_over(
                        session.winner(),
                        session.client_id(),
                        outcome.reward,
                    ));
                }
                Ok(replies)
            }
            ClientMessage::Reset { seed } => {
                let session = self.active_session()?;
                let (record, info) = session.reset(&ResetOptions { seed })?;
                Ok(vec![ServerMessage::initial_observation(record, info)])
            }
            ClientMessage::SaveReplay {} => {
                let session = self.active_session()?;
                let location = session.save_replay()?;
                info!("Saved replay for {} to {}", self.client_id, location);
                Ok(Vec::new())
            }
        }
    }

    /// Create a session, replacing any existing one
    fn connect(&mut self, requested: Option<&str>) -> Result<Vec<ServerMessage>> {
        if let Some(mut previous) = self.session.take() {
            info!("Replacing game for {}", self.client_id);
            previous.close();
        }
        self.state = WorkerState::AwaitingConnect;

        let mut session = GameSession::new(
            self.client_id.clone(),
            requested,
            self.factory.as_ref(),
            self.render_mode.as_deref(),
        )?;
        let (record, info) = session.reset(&ResetOptions::default())?;

        info!(
            "Game started for {} against {}",
            self.client_id,
            session.opponent_id()
        );
        let replies = vec![
            ServerMessage::connected(&self.client_id, session.opponent_id()),
            ServerMessage::initial_observation(record, info),
        ];
        self.session = Some(session);
        self.state = WorkerState::InGame;
        Ok(replies)
    }

    fn active_session(&mut self) -> Result<&mut GameSession> {
        match self.state {
            WorkerState::InGame => self.session.as_mut().ok_or(BridgeError::NoActiveGame),
            _ => Err(BridgeError::NoActiveGame),
        }
    }

    /// Release the session; further frames are not expected
    pub fn finish(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.state = WorkerState::Terminal;
    }

    fn mark_closed(&mut self) {
        self.state = WorkerState::Closed;
    }
}

/// Drives a dispatcher over one framed connection
pub struct Worker<R, W> {
    dispatcher: Dispatcher,
    reader: R,
    writer: W,
}

impl<R: AsyncReader, W: AsyncWriter> Worker<R, W> {
    pub fn new(dispatcher: Dispatcher, reader: R, writer: W) -> Self {
        Self {
            dispatcher,
            reader,
            writer,
        }
    }

    /// Serve the connection until EOF, a fatal transport error or a
    /// shutdown request. The session is always released and the client id
    /// is always reported on `disconnects` before returning.
    pub async fn run(
        mut self,
        mut shutdown: oneshot::Receiver<()>,
        disconnects: mpsc::UnboundedSender<ClientId>,
    ) -> WorkerState {
        let client_id = self.dispatcher.client_id().to_string();
        self.dispatcher.begin();

        loop {
            let frame = tokio::select! {
                _ = &mut shutdown => {
                    debug!("Worker {} asked to stop", client_id);
                    break;
                }
                frame = self.reader.read_frame() => frame,
            };

            match frame {
                Ok(Some(line)) => {
                    let replies = self.dispatcher.handle_line(&line);
                    if let Err(e) = self.send_all(&replies).await {
                        warn!("Failed to reply to {}: {}", client_id, e);
                        break;
                    }
                }
                Ok(None) => {
                    info!("Client {} disconnected", client_id);
                    break;
                }
                Err(e) => {
                    error!("Connection error for {}: {}", client_id, e);
                    break;
                }
            }
        }

        self.dispatcher.finish();
        if let Err(e) = self.writer.shutdown().await {
            debug!("Error closing socket for {}: {}", client_id, e);
        }
        drop(self.reader);
        drop(self.writer);

        if disconnects.send(client_id.clone()).is_err() {
            debug!("Bridge no longer tracking {}", client_id);
        }
        self.dispatcher.mark_closed();
        self.dispatcher.state()
    }

    async fn send_all(&mut self, replies: &[ServerMessage]) -> Result<()> {
        for reply in replies {
            let frame = encode(reply)?;
            self.writer.write_frame(&frame).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFactory;
    use generals_core::SessionStatus;
    use generals_wire::{DEFAULT_MAX_FRAME, LineReader, LineWriter, decode_server};
    use tokio::io::{AsyncWriteExt, duplex};

    fn dispatcher(game_length: u32) -> (Dispatcher, Arc<ScriptedFactory>) {
        let factory = Arc::new(ScriptedFactory::new(game_length));
        let mut dispatcher = Dispatcher::new("client_1".into(), factory.clone(), None);
        dispatcher.begin();
        (dispatcher, factory)
    }

    fn error_message(reply: &ServerMessage) -> &str {
        match reply {
            ServerMessage::Error { message, .. } => message,
            other => panic!("expected error frame, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_replies_connected_then_observation() {
        let (mut dispatcher, _) = dispatcher(5);
        assert_eq!(dispatcher.state(), WorkerState::AwaitingConnect);

        let replies = dispatcher.handle_line(br#"{"type":"connect","opponent_type":"random"}"#);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], ServerMessage::connected("client_1", "Scripted"));
        match &replies[1] {
            ServerMessage::Observation {
                reward,
                terminated,
                truncated,
                observation,
                ..
            } => {
                assert_eq!(*reward, 0.0);
                assert!(!terminated && !truncated);
                assert_eq!(observation.timestep, 0);
            }
            other => panic!("expected observation, got {:?}", other),
        }
        assert_eq!(dispatcher.state(), WorkerState::InGame);
    }

    #[test]
    fn test_requests_before_connect_are_rejected() {
        let (mut dispatcher, factory) = dispatcher(5);

        for line in [
            &br#"{"type":"action","action":[0,0,0,3,0]}"#[..],
            br#"{"type":"reset"}"#,
            br#"{"type":"save_replay"}"#,
        ] {
            let replies = dispatcher.handle_line(line);
            assert_eq!(replies.len(), 1);
            assert_eq!(
                replies[0],
                ServerMessage::error("No active game", "Send CONNECT first")
            );
        }
        assert_eq!(dispatcher.state(), WorkerState::AwaitingConnect);
        assert_eq!(factory.probe.steps(), 0);
    }

    #[test]
    fn test_bad_frames_are_recoverable() {
        let (mut dispatcher, _) = dispatcher(5);
        dispatcher.handle_line(br#"{"type":"connect"}"#);

        let replies = dispatcher.handle_line(b"{{{ nope");
        assert_eq!(error_message(&replies[0]), "Invalid JSON format");

        let replies = dispatcher.handle_line(br#"{"type":"teleport"}"#);
        assert_eq!(
            replies[0],
            ServerMessage::error("Unknown message type", "Type: teleport")
        );

        let replies = dispatcher.handle_line(br#"{"type":"action"}"#);
        assert_eq!(
            replies[0],
            ServerMessage::error("Missing action", "Action field is required")
        );

        let replies = dispatcher.handle_line(br#"{"type":"action","action":"north"}"#);
        assert_eq!(error_message(&replies[0]), "Processing error");

        // Still in game after all of the above
        assert_eq!(dispatcher.state(), WorkerState::InGame);
        let replies = dispatcher.handle_line(br#"{"type":"action","action":[1,0,0,0,0]}"#);
        assert_eq!(replies[0].kind(), "observation");
    }

    #[test]
    fn test_terminal_action_appends_game_over() {
        let (mut dispatcher, factory) = dispatcher(2);
        dispatcher.handle_line(br#"{"type":"connect"}"#);

        let replies = dispatcher.handle_line(br#"{"type":"action","action":[0,0,0,3,0]}"#);
        assert_eq!(replies.len(), 1);

        let replies = dispatcher.handle_line(br#"{"type":"action","action":[0,0,0,3,0]}"#);
        assert_eq!(replies.len(), 2);
        assert_eq!(
            replies[1],
            ServerMessage::game_over(Some("client_1".into()), "client_1", 1.0)
        );

        // Further actions repeat the final snapshot without stepping
        let replies = dispatcher.handle_line(br#"{"type":"action","action":[0,0,0,3,0]}"#);
        assert_eq!(replies.len(), 2);
        assert_eq!(
            replies[1],
            ServerMessage::game_over(Some("client_1".into()), "client_1", 0.0)
        );
        assert_eq!(factory.probe.steps(), 2);
    }

    #[test]
    fn test_reset_restarts_game() {
        let (mut dispatcher, _) = dispatcher(5);
        dispatcher.handle_line(br#"{"type":"connect"}"#);
        dispatcher.handle_line(br#"{"type":"action","action":[1,0,0,0,0]}"#);

        let replies = dispatcher.handle_line(br#"{"type":"reset","seed":11}"#);
        assert_eq!(replies.len(), 1);
        match &replies[0] {
            ServerMessage::Observation {
                observation, info, ..
            } => {
                assert_eq!(observation.timestep, 0);
                assert_eq!(info["seed"], 11);
            }
            other => panic!("expected observation, got {:?}", other),
        }
        assert_eq!(
            dispatcher.session().map(|s| s.status()),
            Some(SessionStatus::Running)
        );
    }

    #[test]
    fn test_save_replay_sends_nothing() {
        let (mut dispatcher, _) = dispatcher(5);
        dispatcher.handle_line(br#"{"type":"connect"}"#);
        assert!(dispatcher.handle_line(br#"{"type":"save_replay"}"#).is_empty());
    }

    #[test]
    fn test_reconnect_replaces_session() {
        let (mut dispatcher, factory) = dispatcher(5);
        dispatcher.handle_line(br#"{"type":"connect"}"#);
        dispatcher.handle_line(br#"{"type":"action","action":[1,0,0,0,0]}"#);

        let replies = dispatcher.handle_line(br#"{"type":"connect","opponent_type":"expander"}"#);
        assert_eq!(replies.len(), 2);
        assert_eq!(factory.probe.closes(), 1);
        assert_eq!(factory.probe.engines.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(dispatcher.state(), WorkerState::InGame);
    }

    #[test]
    fn test_failed_connect_leaves_no_game() {
        let (mut dispatcher, factory) = dispatcher(5);
        factory
            .probe
            .fail_next_reset
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let replies = dispatcher.handle_line(br#"{"type":"connect"}"#);
        assert_eq!(error_message(&replies[0]), "Processing error");
        assert_eq!(dispatcher.state(), WorkerState::AwaitingConnect);
        assert_eq!(factory.probe.closes(), 1);

        let replies = dispatcher.handle_line(br#"{"type":"reset"}"#);
        assert_eq!(error_message(&replies[0]), "No active game");
    }

    #[tokio::test]
    async fn test_worker_serves_until_eof() {
        let factory = Arc::new(ScriptedFactory::new(50));
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, mut client_write) = tokio::io::split(client);

        let worker = Worker::new(
            Dispatcher::new("client_1".into(), factory.clone(), None),
            LineReader::new(server_read, DEFAULT_MAX_FRAME),
            LineWriter(server_write),
        );
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(worker.run(shutdown_rx, disconnect_tx));

        client_write
            .write_all(b"{\"type\":\"connect\"}\n{\"type\":\"action\",\"action\":[1,0,0,0,0]}\n")
            .await
            .unwrap();
        client_write.shutdown().await.unwrap();

        let mut reader = LineReader::new(client_read, DEFAULT_MAX_FRAME);
        let mut kinds = Vec::new();
        while let Some(line) = reader.read_frame().await.unwrap() {
            kinds.push(decode_server(&line).unwrap().kind());
        }
        assert_eq!(kinds, vec!["connected", "observation", "observation"]);

        assert_eq!(task.await.unwrap(), WorkerState::Closed);
        assert_eq!(disconnect_rx.recv().await.as_deref(), Some("client_1"));
        assert_eq!(factory.probe.closes(), 1);
    }

    #[tokio::test]
    async fn test_worker_stops_on_request() {
        let factory = Arc::new(ScriptedFactory::new(50));
        let (_client, server) = duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);

        let worker = Worker::new(
            Dispatcher::new("client_7".into(), factory.clone(), None),
            LineReader::new(server_read, DEFAULT_MAX_FRAME),
            LineWriter(server_write),
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(worker.run(shutdown_rx, disconnect_tx));

        shutdown_tx.send(()).unwrap();
        assert_eq!(task.await.unwrap(), WorkerState::Closed);
        assert_eq!(disconnect_rx.recv().await.as_deref(), Some("client_7"));
    }

    #[tokio::test]
    async fn test_oversized_frame_ends_worker() {
        let factory = Arc::new(ScriptedFactory::new(50));
        let (client, server) = duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (_client_read, mut client_write) = tokio::io::split(client);

        let worker = Worker::new(
            Dispatcher::new("client_2".into(), factory, None),
            LineReader::new(server_read, 16),
            LineWriter(server_write),
        );
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(worker.run(shutdown_rx, disconnect_tx));

        client_write.write_all(&[b'x'; 64]).await.unwrap();
        assert_eq!(task.await.unwrap(), WorkerState::Closed);
        assert_eq!(disconnect_rx.recv().await.as_deref(), Some("client_2"));
    }
}
