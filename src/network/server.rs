//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.
//!
//! ## Lifecycle
//! 1. `Server::bind` opens the listening socket
//! 2. `Server::run` blocks in the accept loop
//! 3. `Server::shutdown` (from any thread) closes every registered
//!    connection, then waits until the accept loop has closed the listener

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use super::Connection;
use crate::config::Config;
use crate::error::{KvError, Result};
use crate::store::KeyValueStore;

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Reply sent to a connection refused for capacity
const MAX_CLIENTS_REPLY: &[u8] = b"-ERR max number of clients reached\r\n";

/// TCP server for RespKV
pub struct Server {
    config: Config,

    /// The store, shared with every connection thread
    store: Arc<KeyValueStore>,

    /// Live connections keyed by remote address
    connections: Arc<ConnectionRegistry>,

    /// Taken by `run`; `None` once the accept loop owns or has closed it
    listener: Mutex<Option<TcpListener>>,

    local_addr: SocketAddr,

    shutdown: AtomicBool,

    /// Dropped once the listener is closed, which disconnects
    /// `stopped_rx` for every waiter at once
    stopped_tx: Mutex<Option<Sender<()>>>,
    stopped_rx: Receiver<()>,
}

impl Server {
    /// Bind the listening socket described by `config.addr`
    pub fn bind(config: Config) -> Result<Self> {
        let listener = TcpListener::bind(&config.addr).map_err(|e| {
            KvError::Network(format!("failed to bind {}: {}", config.addr, e))
        })?;
        let local_addr = listener.local_addr()?;
        let (stopped_tx, stopped_rx) = bounded(1);

        Ok(Self {
            config,
            store: Arc::new(KeyValueStore::new()),
            connections: Arc::new(ConnectionRegistry::default()),
            listener: Mutex::new(Some(listener)),
            local_addr,
            shutdown: AtomicBool::new(false),
            stopped_tx: Mutex::new(Some(stopped_tx)),
            stopped_rx,
        })
    }

    /// Start the server (blocking until `shutdown` is called)
    pub fn run(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| KvError::Network("server is already running or stopped".to_string()))?;
        let stopped = self.stopped_tx.lock().take();

        tracing::info!("Listening on {}", self.local_addr);
        let result = self.accept_loop(&listener);

        drop(listener);
        tracing::info!("Listener on {} closed", self.local_addr);
        drop(stopped);

        result
    }

    fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        // Non-blocking so the loop can observe the shutdown flag
        listener.set_nonblocking(true)?;

        while !self.shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, addr)) => self.accept(stream, addr),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        Ok(())
    }

    /// Register a new connection and start its handler thread
    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Dropping {}: {}", addr, e);
            return;
        }

        if self.connections.len() >= self.config.max_connections {
            tracing::warn!(
                "Rejecting {}: max connections ({}) reached",
                addr,
                self.config.max_connections
            );
            let _ = (&stream).write_all(MAX_CLIENTS_REPLY);
            return;
        }

        let handle = match stream.try_clone() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Dropping {}: {}", addr, e);
                return;
            }
        };
        self.connections.insert(addr, handle);
        tracing::debug!("Accepted {} ({} open)", addr, self.connections.len());

        let store = Arc::clone(&self.store);
        let connections = Arc::clone(&self.connections);
        let config = self.config.clone();

        let spawned = thread::Builder::new()
            .name(format!("conn-{}", addr))
            .spawn(move || {
                match Connection::new(stream, store, &config) {
                    Ok(mut connection) => {
                        if let Err(e) = connection.handle() {
                            tracing::warn!("Connection {} closed with error: {}", addr, e);
                        }
                    }
                    Err(e) => tracing::warn!("Failed to set up connection {}: {}", addr, e),
                }
                connections.remove(&addr);
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn handler for {}: {}", addr, e);
            self.connections.close(&addr);
        }
    }

    /// Stop the server gracefully
    ///
    /// Closes every registered connection, then the listening socket.
    /// Every caller, including concurrent ones, returns only once the
    /// listener is closed.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            let closed = self.connections.close_all();
            tracing::info!("Shutting down: closed {} connections", closed);
        }

        // `run` was never called: closing is just dropping the socket
        if self.listener.lock().take().is_some() {
            drop(self.stopped_tx.lock().take());
            tracing::info!("Listener on {} closed", self.local_addr);
            return;
        }

        // Never receives a message; returns once the sender is dropped
        let _ = self.stopped_rx.recv();

        // Anything accepted between the two steps
        self.connections.close_all();
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently open connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Read access to the store
    pub fn store(&self) -> &KeyValueStore {
        &self.store
    }
}

/// Open connections, keyed by remote address
///
/// Holds a clone of each socket so shutdown can close it from outside
/// the handler thread.
#[derive(Default)]
struct ConnectionRegistry {
    streams: Mutex<HashMap<SocketAddr, TcpStream>>,
}

impl ConnectionRegistry {
    fn insert(&self, addr: SocketAddr, stream: TcpStream) {
        self.streams.lock().insert(addr, stream);
    }

    fn remove(&self, addr: &SocketAddr) {
        if self.streams.lock().remove(addr).is_some() {
            tracing::debug!("Connection {} removed from registry", addr);
        }
    }

    /// Remove and shut down one connection
    fn close(&self, addr: &SocketAddr) {
        if let Some(stream) = self.streams.lock().remove(addr) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Shut down every connection, returning how many there were
    fn close_all(&self) -> usize {
        let streams: Vec<(SocketAddr, TcpStream)> = self.streams.lock().drain().collect();
        for (addr, stream) in &streams {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                tracing::debug!("Shutdown of {} failed: {}", addr, e);
            }
        }
        streams.len()
    }

    fn len(&self) -> usize {
        self.streams.lock().len()
    }
}
