//! TCP listener, worker supervision and shutdown

use crate::config::BridgeConfig;
use crate::environment::EngineFactory;
use crate::registry::{BridgeStats, ClientEntry, WorkerHandle, WorkerRegistry};
use crate::worker::{Dispatcher, Worker};
use generals_core::{BridgeError, ClientId, Result};
use generals_wire::tcp;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::{TcpListener, TcpSocket, TcpStream, lookup_host};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// State shared between the bridge handle and its background tasks
struct Shared {
    config: BridgeConfig,
    factory: Arc<dyn EngineFactory>,
    registry: Mutex<WorkerRegistry>,
    running: AtomicBool,
}

#[derive(Default)]
struct Background {
    accept: Option<JoinHandle<()>>,
    reconcile: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

/// Multi-client session bridge
pub struct Bridge {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    background: Mutex<Background>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, factory: Arc<dyn EngineFactory>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                factory,
                registry: Mutex::new(WorkerRegistry::new()),
                running: AtomicBool::new(false),
            }),
            shutdown,
            background: Mutex::new(Background::default()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, once started
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.background.lock().await.local_addr
    }

    /// Bind the listener and start accepting clients.
    ///
    /// Returns the bound address. A bridge can be started once.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut background = self.background.lock().await;
        if background.accept.is_some() || *self.shutdown.borrow() {
            return Err(BridgeError::ProtocolError(
                "bridge was already started".into(),
            ));
        }

        let listener = bind(&self.shared.config).await?;
        let addr = listener.local_addr()?;
        self.shared.running.store(true, Ordering::SeqCst);

        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        background.accept = Some(tokio::spawn(accept_loop(
            Arc::clone(&self.shared),
            listener,
            self.shutdown.subscribe(),
            disconnect_tx,
        )));
        background.reconcile = Some(tokio::spawn(reconcile_loop(
            Arc::clone(&self.shared),
            self.shutdown.subscribe(),
            disconnect_rx,
        )));
        background.local_addr = Some(addr);

        info!("Bridge listening on {}", addr);
        Ok(addr)
    }

    /// Stop accepting, shut every worker down and release the listener.
    ///
    /// Idempotent. Workers get `shutdown_grace` to exit on their own and
    /// are aborted after that.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            debug!("Bridge already stopped");
            return;
        }
        info!("Stopping bridge...");
        self.shutdown.send_replace(true);

        let mut workers = self.shared.registry.lock().await.drain();
        for (client_id, handle) in workers.iter_mut() {
            if !handle.request_shutdown() {
                debug!("Worker {} already gone", client_id);
            }
        }

        let deadline = Instant::now() + self.shared.config.shutdown_grace;
        for (client_id, handle) in workers {
            let mut task = handle.into_task();
            match timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Worker {} ended abnormally: {}", client_id, e),
                Err(_) => {
                    warn!(
                        "Worker {} did not stop within grace period, aborting",
                        client_id
                    );
                    task.abort();
                }
            }
        }

        let (accept, reconcile) = {
            let mut background = self.background.lock().await;
            (background.accept.take(), background.reconcile.take())
        };
        for mut task in [accept, reconcile].into_iter().flatten() {
            if timeout(self.shared.config.shutdown_grace, &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }

        info!("Bridge stopped");
    }

    /// Current number of clients and workers.
    ///
    /// Finished workers are pruned first, so a crashed worker is never
    /// counted.
    pub async fn stats(&self) -> BridgeStats {
        let mut registry = self.shared.registry.lock().await;
        for client_id in registry.reap() {
            debug!("Pruned finished worker {}", client_id);
        }
        registry.stats()
    }
}

async fn bind(config: &BridgeConfig) -> Result<TcpListener> {
    let target = config.socket_addr_string();
    let addr = lookup_host(&target)
        .await
        .map_err(|e| BridgeError::Config(format!("cannot resolve {}: {}", target, e)))?
        .next()
        .ok_or_else(|| BridgeError::Config(format!("{} did not resolve", target)))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket
        .bind(addr)
        .map_err(|e| BridgeError::IoError(format!("failed to bind {}: {}", addr, e)))?;
    Ok(socket.listen(config.backlog)?)
}

async fn accept_loop(
    shared: Arc<Shared>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    disconnects: mpsc::UnboundedSender<ClientId>,
) {
    while shared.running.load(Ordering::SeqCst) {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = timeout(shared.config.accept_timeout, listener.accept()) => accepted,
        };
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }

        match accepted {
            Err(_) => continue,
            Ok(Ok((stream, peer))) => spawn_worker(&shared, stream, peer, &disconnects).await,
            Ok(Err(e)) => {
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                error!("Error accepting connection: {}", e);
            }
        }
    }
    debug!("Accept loop exited");
}

async fn spawn_worker(
    shared: &Arc<Shared>,
    stream: TcpStream,
    peer: SocketAddr,
    disconnects: &mpsc::UnboundedSender<ClientId>,
) {
    let (reader, writer) = match tcp::split(stream, shared.config.max_frame_bytes) {
        Ok(halves) => halves,
        Err(e) => {
            warn!("Dropping connection from {}: {}", peer, e);
            return;
        }
    };

    // stop() clears `running` before draining, so checking under the lock
    // never registers a worker after the drain
    let mut registry = shared.registry.lock().await;
    if !shared.running.load(Ordering::SeqCst) {
        debug!("Bridge stopping, dropping connection from {}", peer);
        return;
    }
    let client_id = registry.next_client_id();
    info!("New client {} from {}", client_id, peer);

    let dispatcher = Dispatcher::new(
        client_id.clone(),
        Arc::clone(&shared.factory),
        shared.config.render_mode.clone(),
    );
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let worker = Worker::new(dispatcher, reader, writer);
    let span = info_span!("worker", client = %client_id);
    let task = tokio::spawn(
        {
            let disconnects = disconnects.clone();
            async move {
                worker.run(shutdown_rx, disconnects).await;
            }
        }
        .instrument(span),
    );

    if let Err(e) = registry.register(
        client_id,
        ClientEntry::new(peer),
        WorkerHandle::new(task, shutdown_tx),
    ) {
        error!("Failed to register worker: {}", e);
    }
}

/// Apply disconnect notices and reap workers that exited without one
async fn reconcile_loop(
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
    mut disconnects: mpsc::UnboundedReceiver<ClientId>,
) {
    loop {
        let notice = tokio::select! {
            _ = shutdown.changed() => break,
            notice = timeout(shared.config.reap_interval, disconnects.recv()) => notice,
        };

        let mut registry = shared.registry.lock().await;
        match notice {
            Ok(Some(client_id)) => {
                if let Some(entry) = registry.client(&client_id).cloned() {
                    registry.remove(&client_id);
                    info!(
                        "Cleaned up client {} ({}, connected {:.1}s)",
                        client_id,
                        entry.peer,
                        entry.connected_at.elapsed().as_secs_f64()
                    );
                } else {
                    debug!("Client {} was already removed", client_id);
                }
            }
            Ok(None) => {
                debug!("Disconnect channel closed");
                break;
            }
            Err(_) => {}
        }
        for client_id in registry.reap() {
            warn!("Reaped worker {} that exited without notice", client_id);
        }
    }
    debug!("Reconcile loop exited");
}
