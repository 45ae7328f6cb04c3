//! Types shared between the relay server and its clients.
//!
//! The data model mirrors what a browser client emits on every heartbeat:
//! a [`PlayerState`] snapshot, chat messages keyed by sender and timestamp,
//! world-event toggles and per-dungeon snapshots. The [`protocol`] module
//! wraps these in the JSON envelopes carried over the socket and
//! [`partition`] decides who receives and who renders each event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod partition;
pub mod protocol;

pub use protocol::{ClientEvent, ProtocolError, ServerEvent};

/// Server-scoped identifier assigned when a connection is accepted.
pub type ConnectionId = u32;

/// How long an admin announcement stays on screen once re-emitted.
pub const ANNOUNCEMENT_DURATION_MS: u64 = 5000;

/// Display names that carry the staff badge.
pub const STAFF_NAMES: [&str; 3] = ["Administrator", "Administrator 2", "Administrator 3"];

/// The partition a player is currently observing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Zone {
    Lobby,
    Dungeon(String),
}

impl Zone {
    pub fn dungeon(name: impl Into<String>) -> Self {
        Zone::Dungeon(name.into())
    }

    pub fn is_dungeon(&self) -> bool {
        matches!(self, Zone::Dungeon(_))
    }

    pub fn dungeon_name(&self) -> Option<&str> {
        match self {
            Zone::Lobby => None,
            Zone::Dungeon(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Left,
    #[default]
    Right,
}

/// A follower drawn around its owner while in a dungeon wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Soldier {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
}

fn default_level() -> u32 {
    1
}

/// Everything a client reports about itself in a `move` event.
///
/// Only the coordinates are required; everything else defaults the way the
/// browser client fills missing properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub angel: bool,
    #[serde(default)]
    pub in_dungeon: bool,
    #[serde(default)]
    pub current_dungeon_name: Option<String>,
    #[serde(default)]
    pub transformed: bool,
    #[serde(default)]
    pub soldiers: Vec<Soldier>,
    #[serde(default)]
    pub weapon: Option<Weapon>,
    #[serde(default)]
    pub facing: Facing,
}

impl PlayerState {
    pub fn new(name: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            name: name.into(),
            color: String::new(),
            level: 1,
            class: String::new(),
            angel: false,
            in_dungeon: false,
            current_dungeon_name: None,
            transformed: false,
            soldiers: Vec::new(),
            weapon: None,
            facing: Facing::Right,
        }
    }

    /// Derives the zone from the `inDungeon` flag and dungeon name.
    pub fn zone(&self) -> Zone {
        if self.in_dungeon {
            Zone::Dungeon(self.current_dungeon_name.clone().unwrap_or_default())
        } else {
            Zone::Lobby
        }
    }

    pub fn set_zone(&mut self, zone: &Zone) {
        match zone {
            Zone::Lobby => {
                self.in_dungeon = false;
                self.current_dungeon_name = None;
            }
            Zone::Dungeon(name) => {
                self.in_dungeon = true;
                self.current_dungeon_name = Some(name.clone());
            }
        }
    }

    pub fn is_angel_form(&self) -> bool {
        self.angel || self.class == "Angel"
    }

    pub fn is_staff(&self) -> bool {
        STAFF_NAMES.contains(&self.name.as_str())
    }
}

/// Last known state of one remote connection.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    pub id: ConnectionId,
    pub state: PlayerState,
    /// Set by admin updates on the receiving side, never by the owner.
    pub muted: bool,
}

impl PresenceRecord {
    pub fn new(id: ConnectionId, state: PlayerState) -> Self {
        Self {
            id,
            state,
            muted: false,
        }
    }

    pub fn zone(&self) -> Zone {
        self.state.zone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSender {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub muted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: ChatSender,
    pub message: String,
    /// Sender clock, epoch milliseconds.
    pub timestamp: u64,
}

/// Composite identity used to collapse duplicate chat deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatKey {
    pub sender_name: String,
    pub timestamp: u64,
}

impl ChatMessage {
    pub fn key(&self) -> ChatKey {
        ChatKey {
            sender_name: self.sender.name.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Title shown in brackets next to the sender, if any.
    pub fn sender_title(&self) -> Option<&str> {
        self.sender.title.as_deref().filter(|t| !t.is_empty())
    }
}

/// The single globally active world event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorldEvent {
    #[default]
    None,
    Blossom,
    Thunder,
    Meteor,
}

impl WorldEvent {
    /// Parses a toggle field; anything unrecognized means no event.
    pub fn from_toggle(event: Option<&str>) -> Self {
        match event {
            Some("blossom") => WorldEvent::Blossom,
            Some("thunder") => WorldEvent::Thunder,
            Some("meteor") => WorldEvent::Meteor,
            _ => WorldEvent::None,
        }
    }

    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            WorldEvent::None => None,
            WorldEvent::Blossom => Some("blossom"),
            WorldEvent::Thunder => Some("thunder"),
            WorldEvent::Meteor => Some("meteor"),
        }
    }
}

/// Wave and enemy snapshot broadcast by whichever dungeon member last
/// advanced the wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonSnapshot {
    pub dungeon_name: String,
    #[serde(default)]
    pub wave: u32,
    #[serde(default)]
    pub enemies: Vec<Value>,
}

pub fn current_timestamp_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(std::time::Duration::from_secs(0))
        .as_millis() as u64
}
