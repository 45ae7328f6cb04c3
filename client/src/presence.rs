//! Local cache of every other connection's last known state.

use log::debug;
use shared::partition::is_visible;
use shared::protocol::AdminUpdate;
use shared::{ConnectionId, PlayerState, PresenceRecord, Zone};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PresenceDirectory {
    records: HashMap<ConnectionId, PresenceRecord>,
    local_id: Option<ConnectionId>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records which ID belongs to this session and evicts it if present.
    pub fn set_local_id(&mut self, id: ConnectionId) {
        self.local_id = Some(id);
        self.records.remove(&id);
    }

    pub fn local_id(&self) -> Option<ConnectionId> {
        self.local_id
    }

    /// Replaces the record for `id` wholesale.
    ///
    /// The mute flag is carried over: it is set by admin updates, never by
    /// the player, and the next heartbeat would otherwise clear it within
    /// one tick.
    pub fn apply_move(&mut self, id: ConnectionId, state: PlayerState) {
        if Some(id) == self.local_id {
            debug!("Ignoring move echoed back for local connection {}", id);
            return;
        }
        let muted = self.records.get(&id).is_some_and(|r| r.muted);
        self.records.insert(
            id,
            PresenceRecord {
                id,
                state,
                muted,
            },
        );
    }

    pub fn apply_disconnect(&mut self, id: ConnectionId) -> Option<PresenceRecord> {
        self.records.remove(&id)
    }

    /// Patches every record whose display name matches. Returns how many matched.
    pub fn apply_admin_update(&mut self, update: &AdminUpdate) -> usize {
        let mut matched = 0;
        for record in self.records.values_mut() {
            if record.state.name != update.player_name {
                continue;
            }
            if let Some(class) = update.new_class.as_deref().filter(|c| !c.is_empty()) {
                record.state.class = class.to_string();
            }
            if let Some(muted) = update.muted {
                record.muted = muted;
            }
            matched += 1;
        }
        matched
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&PresenceRecord> {
        self.records.get(id)
    }

    pub fn is_muted(&self, name: &str) -> bool {
        self.records
            .values()
            .any(|record| record.muted && record.state.name == name)
    }

    pub fn records(&self) -> impl Iterator<Item = &PresenceRecord> {
        self.records.values()
    }

    /// Records the renderer should draw for a viewer in `local`.
    pub fn visible<'a>(&'a self, local: &'a Zone) -> impl Iterator<Item = &'a PresenceRecord> + 'a {
        self.records
            .values()
            .filter(move |record| is_visible(local, record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
