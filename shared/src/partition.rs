//! Recipient selection and zone gating.
//!
//! Delivery is decided on the server and is coarse: every event
//! goes either to everyone but the sender or to everyone. Zone narrowing for
//! dungeon-scoped events and render visibility are evaluated by the receiver
//! against its own current zone.

use crate::protocol::ClientEvent;
use crate::{ConnectionId, PresenceRecord, Zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryScope {
    /// Every live connection except the originator.
    Others,
    /// Every live connection, the originator included.
    All,
}

pub fn delivery_scope(event: &ClientEvent) -> DeliveryScope {
    match event {
        ClientEvent::AdminAnnouncement(_) | ClientEvent::Shutdown => DeliveryScope::All,
        ClientEvent::Move(_)
        | ClientEvent::Chat(_)
        | ClientEvent::GlobalNotification(_)
        | ClientEvent::AdminUpdate(_)
        | ClientEvent::Effect(_)
        | ClientEvent::EventToggle(_)
        | ClientEvent::DungeonState(_)
        | ClientEvent::DungeonEffect(_) => DeliveryScope::Others,
    }
}

/// Computes the recipient set for one event sent by `sender`.
pub fn recipients<I>(
    scope: DeliveryScope,
    sender: ConnectionId,
    connections: I,
) -> Vec<ConnectionId>
where
    I: IntoIterator<Item = ConnectionId>,
{
    connections
        .into_iter()
        .filter(|id| scope == DeliveryScope::All || *id != sender)
        .collect()
}

/// Dungeon-scoped events are applied only inside exactly that dungeon.
pub fn accepts_dungeon_event(local: &Zone, dungeon_name: &str) -> bool {
    matches!(local, Zone::Dungeon(name) if name == dungeon_name)
}

/// Whether the renderer should draw `record` for a viewer standing in `local`.
pub fn is_visible(local: &Zone, record: &PresenceRecord) -> bool {
    !record.muted && record.zone() == *local
}

/// Remote combat effects show up in dungeons; gold effects show everywhere.
pub fn renders_effect(local: &Zone, color: &str) -> bool {
    local.is_dungeon() || color == "gold"
}
