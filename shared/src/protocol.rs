//! JSON envelopes exchanged over the relay socket.
//!
//! Every frame is a text message of the form `{"type": <name>, "data": <payload>}`.
//! Decoding is two-staged: the envelope is parsed first so an unknown `type`
//! can be ignored without inspecting its payload, then the payload is parsed
//! into the typed variant.

use crate::{ChatMessage, ConnectionId, DungeonSnapshot, PlayerState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame has no event type")]
    MissingType,
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        source: serde_json::Error,
    },
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
}

impl Notification {
    /// Styled announcements carry both a color and a font.
    pub fn styled(&self) -> Option<(&str, &str)> {
        match (self.color.as_deref(), self.font.as_deref()) {
            (Some(color), Some(font)) => Some((color, font)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
}

impl Announcement {
    pub fn into_notification(self, duration_ms: u64) -> Notification {
        Notification {
            msg: self.text,
            duration: Some(duration_ms),
            color: self.color,
            font: self.font,
        }
    }
}

/// Class and mute patch addressed by display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdate {
    pub player_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventToggle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonEffect {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    pub dungeon_name: String,
}

impl DungeonEffect {
    pub fn heal(sender_name: &str, dungeon_name: &str) -> Self {
        Self {
            kind: "heal".to_string(),
            payload: serde_json::json!({ "senderName": sender_name }),
            dungeon_name: dungeon_name.to_string(),
        }
    }

    pub fn sender_name(&self) -> Option<&str> {
        self.payload.get("senderName").and_then(Value::as_str)
    }
}

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Move(PlayerState),
    Chat(ChatMessage),
    GlobalNotification(Notification),
    AdminAnnouncement(Announcement),
    AdminUpdate(AdminUpdate),
    Effect(Effect),
    EventToggle(EventToggle),
    DungeonState(DungeonSnapshot),
    DungeonEffect(DungeonEffect),
    Shutdown,
}

/// Events the relay delivers to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Welcome { connection_id: ConnectionId },
    PlayerMoved { id: ConnectionId, state: PlayerState },
    Chat(ChatMessage),
    GlobalNotification(Notification),
    AdminUpdate(AdminUpdate),
    Effect(Effect),
    EventToggle(EventToggle),
    DungeonState(DungeonSnapshot),
    DungeonEffect(DungeonEffect),
    PlayerDisconnected(ConnectionId),
    Shutdown,
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: Value,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WelcomePayload {
    connection_id: ConnectionId,
}

#[derive(Serialize, Deserialize)]
struct MovedPayload {
    id: ConnectionId,
    #[serde(flatten)]
    state: PlayerState,
}

fn payload<T: DeserializeOwned>(kind: &'static str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(ProtocolError::Encode)
}

fn seal(kind: &str, data: Value) -> Result<String, ProtocolError> {
    serde_json::to_string(&Envelope { kind, data }).map_err(ProtocolError::Encode)
}

fn open(text: &str) -> Result<(String, Value), ProtocolError> {
    let raw: RawEnvelope = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
    let kind = raw.kind.ok_or(ProtocolError::MissingType)?;
    Ok((kind, raw.data))
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Move(_) => "move",
            ClientEvent::Chat(_) => "chat",
            ClientEvent::GlobalNotification(_) => "globalNotification",
            ClientEvent::AdminAnnouncement(_) => "adminAnnouncement",
            ClientEvent::AdminUpdate(_) => "adminUpdate",
            ClientEvent::Effect(_) => "effect",
            ClientEvent::EventToggle(_) => "eventToggle",
            ClientEvent::DungeonState(_) => "dungeonState",
            ClientEvent::DungeonEffect(_) => "dungeonEffect",
            ClientEvent::Shutdown => "shutdown",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            ClientEvent::AdminAnnouncement(_) | ClientEvent::AdminUpdate(_) | ClientEvent::Shutdown
        )
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let data = match self {
            ClientEvent::Move(state) => to_data(state)?,
            ClientEvent::Chat(msg) => to_data(msg)?,
            ClientEvent::GlobalNotification(n) => to_data(n)?,
            ClientEvent::AdminAnnouncement(a) => to_data(a)?,
            ClientEvent::AdminUpdate(u) => to_data(u)?,
            ClientEvent::Effect(e) => to_data(e)?,
            ClientEvent::EventToggle(t) => to_data(t)?,
            ClientEvent::DungeonState(s) => to_data(s)?,
            ClientEvent::DungeonEffect(e) => to_data(e)?,
            ClientEvent::Shutdown => Value::Null,
        };
        seal(self.kind(), data)
    }

    /// Returns `Ok(None)` for event types this build does not know.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let (kind, data) = open(text)?;
        let event = match kind.as_str() {
            "move" => ClientEvent::Move(payload("move", data)?),
            "chat" => ClientEvent::Chat(payload("chat", data)?),
            "globalNotification" => {
                ClientEvent::GlobalNotification(payload("globalNotification", data)?)
            }
            "adminAnnouncement" => {
                ClientEvent::AdminAnnouncement(payload("adminAnnouncement", data)?)
            }
            "adminUpdate" => ClientEvent::AdminUpdate(payload("adminUpdate", data)?),
            "effect" => ClientEvent::Effect(payload("effect", data)?),
            "eventToggle" => {
                // Browsers emit `eventToggle` with no argument to clear the event.
                let data = if data.is_null() { Value::Object(Default::default()) } else { data };
                ClientEvent::EventToggle(payload("eventToggle", data)?)
            }
            "dungeonState" => ClientEvent::DungeonState(payload("dungeonState", data)?),
            "dungeonEffect" => ClientEvent::DungeonEffect(payload("dungeonEffect", data)?),
            "shutdown" => ClientEvent::Shutdown,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => "welcome",
            ServerEvent::PlayerMoved { .. } => "playerMoved",
            ServerEvent::Chat(_) => "chat",
            ServerEvent::GlobalNotification(_) => "globalNotification",
            ServerEvent::AdminUpdate(_) => "adminUpdate",
            ServerEvent::Effect(_) => "effect",
            ServerEvent::EventToggle(_) => "eventToggle",
            ServerEvent::DungeonState(_) => "dungeonState",
            ServerEvent::DungeonEffect(_) => "dungeonEffect",
            ServerEvent::PlayerDisconnected(_) => "playerDisconnected",
            ServerEvent::Shutdown => "shutdown",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let data = match self {
            ServerEvent::Welcome { connection_id } => to_data(&WelcomePayload {
                connection_id: *connection_id,
            })?,
            ServerEvent::PlayerMoved { id, state } => to_data(&MovedPayload {
                id: *id,
                state: state.clone(),
            })?,
            ServerEvent::Chat(msg) => to_data(msg)?,
            ServerEvent::GlobalNotification(n) => to_data(n)?,
            ServerEvent::AdminUpdate(u) => to_data(u)?,
            ServerEvent::Effect(e) => to_data(e)?,
            ServerEvent::EventToggle(t) => to_data(t)?,
            ServerEvent::DungeonState(s) => to_data(s)?,
            ServerEvent::DungeonEffect(e) => to_data(e)?,
            ServerEvent::PlayerDisconnected(id) => Value::from(*id),
            ServerEvent::Shutdown => Value::Null,
        };
        seal(self.kind(), data)
    }

    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let (kind, data) = open(text)?;
        let event = match kind.as_str() {
            "welcome" => {
                let welcome: WelcomePayload = payload("welcome", data)?;
                ServerEvent::Welcome {
                    connection_id: welcome.connection_id,
                }
            }
            "playerMoved" => {
                let moved: MovedPayload = payload("playerMoved", data)?;
                ServerEvent::PlayerMoved {
                    id: moved.id,
                    state: moved.state,
                }
            }
            "chat" => ServerEvent::Chat(payload("chat", data)?),
            "globalNotification" => {
                ServerEvent::GlobalNotification(payload("globalNotification", data)?)
            }
            "adminUpdate" => ServerEvent::AdminUpdate(payload("adminUpdate", data)?),
            "effect" => ServerEvent::Effect(payload("effect", data)?),
            "eventToggle" => {
                let data = if data.is_null() { Value::Object(Default::default()) } else { data };
                ServerEvent::EventToggle(payload("eventToggle", data)?)
            }
            "dungeonState" => ServerEvent::DungeonState(payload("dungeonState", data)?),
            "dungeonEffect" => ServerEvent::DungeonEffect(payload("dungeonEffect", data)?),
            "playerDisconnected" => {
                ServerEvent::PlayerDisconnected(payload("playerDisconnected", data)?)
            }
            "shutdown" => ServerEvent::Shutdown,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatSender, Zone};

    #[test]
    fn test_decode_move_from_browser_payload() {
        let text = r#"{"type":"move","data":{"x":5,"y":5,"name":"Ann","color":"blue","level":3,
            "class":"Healer","angel":false,"inDungeon":true,"currentDungeonName":"Crypt1",
            "transformed":false,"soldiers":[{"x":1,"y":2,"color":"red"}],"weapon":null,"facing":"left"}}"#;

        match ClientEvent::decode(text).unwrap() {
            Some(ClientEvent::Move(state)) => {
                assert_eq!(state.name, "Ann");
                assert_eq!(state.level, 3);
                assert_eq!(state.zone(), Zone::dungeon("Crypt1"));
                assert_eq!(state.soldiers.len(), 1);
            }
            other => panic!("Unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let decoded = ClientEvent::decode(r#"{"type":"angelRupture","data":{"power":9}}"#).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_missing_type_is_error() {
        let err = ClientEvent::decode(r#"{"data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingType));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let err = ServerEvent::decode("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn test_chat_without_sender_name_is_rejected() {
        let err = ClientEvent::decode(
            r#"{"type":"chat","data":{"sender":{"color":"red"},"message":"hi","timestamp":1}}"#,
        )
        .unwrap_err();
        match err {
            ProtocolError::InvalidPayload { kind, .. } => assert_eq!(kind, "chat"),
            other => panic!("Unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_dungeon_state_requires_name() {
        let err = ClientEvent::decode(r#"{"type":"dungeonState","data":{"wave":2,"enemies":[]}}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { kind: "dungeonState", .. }));
    }

    #[test]
    fn test_event_toggle_without_payload() {
        let decoded = ClientEvent::decode(r#"{"type":"eventToggle"}"#).unwrap();
        assert_eq!(decoded, Some(ClientEvent::EventToggle(EventToggle::default())));
    }

    #[test]
    fn test_player_moved_carries_id_alongside_state() {
        let mut state = PlayerState::new("Ann", 5.0, 5.0);
        state.color = "blue".into();
        let text = ServerEvent::PlayerMoved { id: 7, state }.encode().unwrap();

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "playerMoved");
        assert_eq!(value["data"]["id"], 7);
        assert_eq!(value["data"]["name"], "Ann");
        assert_eq!(value["data"]["inDungeon"], false);
    }

    #[test]
    fn test_player_disconnected_payload_is_bare_id() {
        let text = ServerEvent::PlayerDisconnected(3).encode().unwrap();
        assert_eq!(text, r#"{"type":"playerDisconnected","data":3}"#);
        assert_eq!(
            ServerEvent::decode(&text).unwrap(),
            Some(ServerEvent::PlayerDisconnected(3))
        );
    }

    #[test]
    fn test_chat_omits_empty_optional_sender_fields() {
        let msg = ChatMessage {
            sender: ChatSender {
                name: "Bob".into(),
                color: "red".into(),
                title: None,
                muted: false,
            },
            message: "hi".into(),
            timestamp: 1000,
        };
        let text = ServerEvent::Chat(msg).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert!(value["data"]["sender"].get("title").is_none());
        assert!(value["data"]["sender"].get("muted").is_none());
    }

    #[test]
    fn test_announcement_becomes_timed_notification() {
        let announcement = Announcement {
            text: "Server restart soon".into(),
            color: Some("gold".into()),
            font: Some("24px serif".into()),
        };
        let notification = announcement.into_notification(5000);
        assert_eq!(notification.msg, "Server restart soon");
        assert_eq!(notification.duration, Some(5000));
        assert_eq!(notification.styled(), Some(("gold", "24px serif")));
    }

    #[test]
    fn test_heal_effect_sender() {
        let effect = DungeonEffect::heal("Hana", "Crypt1");
        let text = ClientEvent::DungeonEffect(effect).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["data"]["type"], "heal");
        assert_eq!(value["data"]["dungeonName"], "Crypt1");

        match ClientEvent::decode(&text).unwrap() {
            Some(ClientEvent::DungeonEffect(effect)) => {
                assert_eq!(effect.sender_name(), Some("Hana"))
            }
            other => panic!("Unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_admin_events() {
        assert!(ClientEvent::Shutdown.is_admin());
        assert!(!ClientEvent::EventToggle(EventToggle::default()).is_admin());
    }
}
