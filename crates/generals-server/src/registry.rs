//! Client and worker registry
//!
//! Both maps live in one struct behind one lock, so a client entry and its
//! worker handle are always added and removed together.

use generals_core::{ClientId, client_id};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Snapshot of the registry sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub active_clients: usize,
    pub active_workers: usize,
}

/// Connection details for an accepted client
#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub peer: SocketAddr,
    pub connected_at: Instant,
}

impl ClientEntry {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            connected_at: Instant::now(),
        }
    }
}

/// Handle on a running worker task
#[derive(Debug)]
pub struct WorkerHandle {
    task: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl WorkerHandle {
    pub fn new(task: JoinHandle<()>, shutdown: oneshot::Sender<()>) -> Self {
        Self {
            task,
            shutdown: Some(shutdown),
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the worker to stop; returns false if it was already asked or gone
    pub fn request_shutdown(&mut self) -> bool {
        self.shutdown
            .take()
            .is_some_and(|tx| tx.send(()).is_ok())
    }

    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

/// Registry of connected clients and their workers
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    clients: HashMap<ClientId, ClientEntry>,
    workers: HashMap<ClientId, WorkerHandle>,
    accepted: u64,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id for the next accepted connection
    pub fn next_client_id(&mut self) -> ClientId {
        self.accepted += 1;
        client_id(self.accepted)
    }

    /// Register a client together with its worker
    pub fn register(
        &mut self,
        client_id: ClientId,
        entry: ClientEntry,
        worker: WorkerHandle,
    ) -> Result<(), RegistryError> {
        if self.clients.contains_key(&client_id) || self.workers.contains_key(&client_id) {
            return Err(RegistryError::AlreadyRegistered(client_id));
        }
        self.clients.insert(client_id.clone(), entry);
        self.workers.insert(client_id, worker);
        Ok(())
    }

    /// Remove a client and its worker.
    ///
    /// Idempotent: removing an unknown id is a no-op returning `None`.
    pub fn remove(&mut self, client_id: &str) -> Option<WorkerHandle> {
        self.clients.remove(client_id);
        self.workers.remove(client_id)
    }

    /// Remove every worker whose task has finished, with its client entry
    pub fn reap(&mut self) -> Vec<ClientId> {
        let finished: Vec<ClientId> = self
            .workers
            .iter()
            .filter(|(_, handle)| !handle.is_alive())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &finished {
            self.remove(id);
        }
        finished
    }

    /// Take every worker out of the registry, clearing both maps
    pub fn drain(&mut self) -> Vec<(ClientId, WorkerHandle)> {
        self.clients.clear();
        self.workers.drain().collect()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn client(&self, client_id: &str) -> Option<&ClientEntry> {
        self.clients.get(client_id)
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            active_clients: self.clients.len(),
            active_workers: self.workers.len(),
        }
    }
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Client already registered: {0}")]
    AlreadyRegistered(ClientId),
}
