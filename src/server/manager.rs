//! Ownership of live connections.
//!
//! The manager spawns one task per accepted socket onto the server's worker
//! runtime and keeps an id → peer map so connections can be observed and
//! are dropped from the bookkeeping as soon as their handler finishes.

use crate::{
    errors::ServerError,
    options::ServerOptions,
    server::{
        handler::{ConnectionHandler, Stream},
        server::ServerDelegate,
    },
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::watch;

pub(crate) struct ConnectionManager {
    connections: Arc<Mutex<HashMap<u64, SocketAddr>>>,
    next_id: AtomicU64,
    options: ServerOptions,
    stopping: watch::Receiver<bool>,
}

impl ConnectionManager {
    pub(crate) fn new(options: ServerOptions, stopping: watch::Receiver<bool>) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            options,
            stopping,
        }
    }

    /// Registers `stream` and dispatches its handler. Must be called from
    /// within the server runtime.
    pub(crate) fn handle<D: ServerDelegate>(
        &self,
        stream: Stream,
        remote: SocketAddr,
        delegate: Arc<D>,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.lock().insert(id, remote);

        let handler = ConnectionHandler::new(
            id,
            stream,
            remote,
            delegate,
            &self.options,
            self.stopping.clone(),
        );

        let connections = self.connections.clone();
        tokio::spawn(async move {
            match handler.run().await {
                Ok(()) => tracing::debug!(connection = id, %remote, "connection closed"),
                Err(ServerError::IdleTimeout) => {
                    tracing::debug!(connection = id, %remote, "idle timeout, evicting")
                }
                Err(ServerError::ClientDisconnected) => {
                    tracing::debug!(connection = id, %remote, "client disconnected")
                }
                Err(err) => {
                    tracing::warn!(connection = id, %remote, error = %err, "connection error")
                }
            }
            connections.lock().remove(&id);
        });
    }

    /// Number of connections currently owned by a live handler.
    pub(crate) fn active_connections(&self) -> usize {
        self.connections.lock().len()
    }
}
