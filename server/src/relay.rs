//! Broadcast relay: decode, tag, partition and fan out.
//!
//! One inbound frame is handled to completion before the next one. Payloads
//! are re-emitted unchanged apart from the sender identity stamped onto
//! `move` events; the relay keeps no world state of its own.

use crate::client_manager::ClientManager;
use log::{debug, info, warn};
use shared::partition::{delivery_scope, recipients, DeliveryScope};
use shared::{ClientEvent, ConnectionId, ServerEvent, ANNOUNCEMENT_DURATION_MS};
use std::collections::HashSet;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Who may use the admin event types (`adminUpdate`, `adminAnnouncement`,
/// `shutdown`).
#[derive(Debug, Clone, Default)]
pub enum AdminPolicy {
    /// Any open connection may send admin events.
    #[default]
    Open,
    /// Only connections whose last reported display name is listed.
    AllowList(HashSet<String>),
}

impl AdminPolicy {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: HashSet<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            AdminPolicy::Open
        } else {
            AdminPolicy::AllowList(names)
        }
    }

    pub fn permits(&self, display_name: Option<&str>) -> bool {
        match self {
            AdminPolicy::Open => true,
            AdminPolicy::AllowList(names) => display_name.is_some_and(|name| names.contains(name)),
        }
    }
}

pub struct Relay {
    clients: ClientManager,
    admin_policy: AdminPolicy,
}

impl Relay {
    pub fn new(max_clients: usize, admin_policy: AdminPolicy) -> Self {
        Self {
            clients: ClientManager::new(max_clients),
            admin_policy,
        }
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    /// Registers a connection and tells it which ID it was given.
    pub fn connect(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::Sender<String>,
    ) -> Option<ConnectionId> {
        let client_id = self.clients.add_client(addr, sender)?;
        self.fan_out(
            &ServerEvent::Welcome {
                connection_id: client_id,
            },
            &[client_id],
        );
        Some(client_id)
    }

    /// Forgets a connection and announces the departure to everyone left.
    ///
    /// Returns false if the connection was already gone, in which case
    /// nothing is announced.
    pub fn disconnect(&mut self, client_id: ConnectionId) -> bool {
        if !self.clients.remove_client(&client_id) {
            return false;
        }
        let remaining = self.clients.connection_ids();
        self.fan_out(&ServerEvent::PlayerDisconnected(client_id), &remaining);
        true
    }

    /// Handles one raw text frame. Returns how many recipients it was queued for.
    pub fn handle_frame(&mut self, sender: ConnectionId, text: &str) -> usize {
        match ClientEvent::decode(text) {
            Ok(Some(event)) => self.relay(sender, event),
            Ok(None) => {
                debug!("Ignoring unknown event type from client {}", sender);
                0
            }
            Err(e) => {
                warn!("Dropping malformed frame from client {}: {}", sender, e);
                0
            }
        }
    }

    /// Routes a decoded event from `sender` to its recipients.
    pub fn relay(&mut self, sender: ConnectionId, event: ClientEvent) -> usize {
        if self.clients.get(&sender).is_none() {
            warn!("Dropping {} from unknown client {}", event.kind(), sender);
            return 0;
        }

        if let Some(reason) = missing_identity(&event) {
            warn!("Dropping {} from client {}: {}", event.kind(), sender, reason);
            return 0;
        }

        if event.is_admin() && !self.admin_policy.permits(self.clients.display_name(&sender)) {
            warn!(
                "Rejected {} from client {} ({:?}): not an admin",
                event.kind(),
                sender,
                self.clients.display_name(&sender)
            );
            return 0;
        }

        let scope = delivery_scope(&event);
        let outbound = self.tag(sender, event);
        let targets = recipients(scope, sender, self.clients.connection_ids());

        if scope == DeliveryScope::All {
            info!("Client {} sent {} to all clients", sender, outbound.kind());
        }

        self.fan_out(&outbound, &targets)
    }

    /// Converts an inbound event into what recipients see.
    fn tag(&mut self, sender: ConnectionId, event: ClientEvent) -> ServerEvent {
        match event {
            ClientEvent::Move(state) => {
                self.clients.update_presence(sender, state.clone());
                ServerEvent::PlayerMoved { id: sender, state }
            }
            ClientEvent::Chat(msg) => ServerEvent::Chat(msg),
            ClientEvent::GlobalNotification(notification) => {
                ServerEvent::GlobalNotification(notification)
            }
            ClientEvent::AdminAnnouncement(announcement) => ServerEvent::GlobalNotification(
                announcement.into_notification(ANNOUNCEMENT_DURATION_MS),
            ),
            ClientEvent::AdminUpdate(update) => ServerEvent::AdminUpdate(update),
            ClientEvent::Effect(effect) => ServerEvent::Effect(effect),
            ClientEvent::EventToggle(toggle) => ServerEvent::EventToggle(toggle),
            ClientEvent::DungeonState(snapshot) => ServerEvent::DungeonState(snapshot),
            ClientEvent::DungeonEffect(effect) => ServerEvent::DungeonEffect(effect),
            ClientEvent::Shutdown => ServerEvent::Shutdown,
        }
    }

    /// Encodes once and queues the frame for every target.
    ///
    /// A failed delivery to one target never stops delivery to the rest.
    fn fan_out(&self, event: &ServerEvent, targets: &[ConnectionId]) -> usize {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode {}: {}", event.kind(), e);
                return 0;
            }
        };

        let mut delivered = 0;
        for &target in targets {
            match self.clients.send(target, frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Dropped {} for client {}: {}", event.kind(), target, e),
            }
        }
        delivered
    }
}

/// Identity fields the receivers key on must be present and non-empty.
fn missing_identity(event: &ClientEvent) -> Option<&'static str> {
    match event {
        ClientEvent::Chat(msg) if msg.sender.name.is_empty() => Some("chat sender has no name"),
        ClientEvent::AdminUpdate(update) if update.player_name.is_empty() => {
            Some("admin update has no player name")
        }
        ClientEvent::DungeonState(snapshot) if snapshot.dungeon_name.is_empty() => {
            Some("dungeon state has no dungeon name")
        }
        ClientEvent::DungeonEffect(effect) if effect.dungeon_name.is_empty() => {
            Some("dungeon effect has no dungeon name")
        }
        _ => None,
    }
}
