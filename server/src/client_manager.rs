//! Connection registry for the relay server
//!
//! This module tracks every live socket the relay is serving:
//! - Connection lifecycle (connect, disconnect)
//! - The outbound queue each connection's writer task drains
//! - The latest presence record reported by each connection
//!
//! The registry is owned by the single relay loop, so it is never shared
//! across tasks and needs no lock.

use log::info;
use shared::{ConnectionId, PlayerState, PresenceRecord};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Why a frame could not be queued for a connection
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("client {0} is not connected")]
    UnknownClient(ConnectionId),
    #[error("outbound queue for client {0} is full")]
    QueueFull(ConnectionId),
    #[error("client {0} closed its outbound queue")]
    Closed(ConnectionId),
}

/// Represents a connected client and the last state it reported
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ConnectionId,
    /// Peer address, kept for logging
    pub addr: SocketAddr,
    /// When the socket was accepted
    pub connected_at: Instant,
    /// Last `move` payload received from this client
    pub presence: Option<PresenceRecord>,
    sender: mpsc::Sender<String>,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::Sender<String>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            presence: None,
            sender,
        }
    }

    /// Replaces the stored presence wholesale
    pub fn update_presence(&mut self, state: PlayerState) {
        self.presence = Some(PresenceRecord::new(self.id, state));
    }

    pub fn display_name(&self) -> Option<&str> {
        self.presence
            .as_ref()
            .map(|record| record.state.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Queues a frame without waiting.
    ///
    /// A full queue means the peer is not keeping up; the frame is dropped
    /// for this peer only and the next heartbeat supersedes it.
    pub fn send(&self, frame: String) -> Result<(), DeliveryError> {
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull(self.id),
            TrySendError::Closed(_) => DeliveryError::Closed(self.id),
        })
    }
}

/// Manages all connected clients
///
/// Assigns identifiers, enforces the optional capacity limit and routes
/// frames to each connection's outbound queue.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<ConnectionId, Client>,
    /// Next available client ID for new connections
    next_client_id: ConnectionId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and are never reused within a process.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a freshly accepted connection
    ///
    /// Returns None if the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::Sender<String>,
    ) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns true only the first time for a given ID, so callers can
    /// announce the departure exactly once. Dropping the client drops its
    /// outbound sender, which ends the connection's writer task.
    pub fn remove_client(&mut self, client_id: &ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Client {} disconnected after {:.1}s",
                client.id,
                client.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn get(&self, client_id: &ConnectionId) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Stores the latest presence for a client. Returns false if unknown.
    pub fn update_presence(&mut self, client_id: ConnectionId, state: PlayerState) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.update_presence(state);
            true
        } else {
            false
        }
    }

    pub fn display_name(&self, client_id: &ConnectionId) -> Option<&str> {
        self.clients.get(client_id).and_then(Client::display_name)
    }

    /// All live connection IDs in ascending order
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn send(&self, client_id: ConnectionId, frame: String) -> Result<(), DeliveryError> {
        match self.clients.get(&client_id) {
            Some(client) => client.send(frame),
            None => Err(DeliveryError::UnknownClient(client_id)),
        }
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
