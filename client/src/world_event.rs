//! World event state machine and the dungeon view it sits next to.

use crate::sink::PresentationSink;
use log::{debug, info};
use serde_json::Value;
use shared::partition::accepts_dungeon_event;
use shared::protocol::EventToggle;
use shared::{DungeonSnapshot, WorldEvent, Zone};

/// Holds the one world event this client currently believes is active.
///
/// Only inbound toggles move it; there is no expiry.
#[derive(Debug, Default)]
pub struct WorldEventMachine {
    current: WorldEvent,
}

impl WorldEventMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> WorldEvent {
        self.current
    }

    pub fn blossom_active(&self) -> bool {
        self.current == WorldEvent::Blossom
    }

    pub fn thunder_active(&self) -> bool {
        self.current == WorldEvent::Thunder
    }

    pub fn meteor_active(&self) -> bool {
        self.current == WorldEvent::Meteor
    }

    pub fn apply_toggle(
        &mut self,
        toggle: &EventToggle,
        sink: &mut dyn PresentationSink,
    ) -> WorldEvent {
        let next = WorldEvent::from_toggle(toggle.event.as_deref());
        if next != self.current {
            info!("World event {:?} -> {:?}", self.current, next);
        }
        self.current = next;
        if next == WorldEvent::Meteor {
            sink.start_meteor_event();
        }
        next
    }
}

/// Wave and enemies for the dungeon this client is standing in.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DungeonView {
    pub wave: u32,
    pub enemies: Vec<Value>,
}

impl DungeonView {
    /// Applies a snapshot if it belongs to `local`. Returns whether it did.
    pub fn apply(&mut self, local: &Zone, snapshot: DungeonSnapshot) -> bool {
        if !accepts_dungeon_event(local, &snapshot.dungeon_name) {
            debug!("Ignoring state for dungeon {}", snapshot.dungeon_name);
            return false;
        }
        self.wave = snapshot.wave;
        self.enemies = snapshot.enemies;
        true
    }

    pub fn clear(&mut self) {
        self.wave = 0;
        self.enemies.clear();
    }
}
