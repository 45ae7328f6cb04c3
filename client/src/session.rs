//! Per-connection client state and the rules for applying inbound events.

use crate::dedup::MessageFilter;
use crate::presence::PresenceDirectory;
use crate::sink::PresentationSink;
use crate::world_event::{DungeonView, WorldEventMachine};
use log::{debug, info, warn};
use serde_json::Value;
use shared::partition::{accepts_dungeon_event, renders_effect};
use shared::protocol::{AdminUpdate, Announcement, DungeonEffect, Effect, EventToggle, Notification};
use shared::{
    ChatMessage, ChatSender, ClientEvent, ConnectionId, DungeonSnapshot, PlayerState, ServerEvent,
    WorldEvent, Zone,
};
use std::time::Instant;

#[derive(Debug)]
pub struct ClientSession {
    /// What this client reports about itself on every heartbeat
    pub player: PlayerState,
    pub title: Option<String>,
    directory: PresenceDirectory,
    chat_filter: MessageFilter,
    world: WorldEventMachine,
    dungeon: DungeonView,
    shut_down: bool,
}

impl ClientSession {
    pub fn new(player: PlayerState) -> Self {
        Self::with_filter(player, MessageFilter::default())
    }

    pub fn with_filter(player: PlayerState, chat_filter: MessageFilter) -> Self {
        Self {
            player,
            title: None,
            directory: PresenceDirectory::new(),
            chat_filter,
            world: WorldEventMachine::new(),
            dungeon: DungeonView::default(),
            shut_down: false,
        }
    }

    pub fn local_id(&self) -> Option<ConnectionId> {
        self.directory.local_id()
    }

    pub fn zone(&self) -> Zone {
        self.player.zone()
    }

    pub fn directory(&self) -> &PresenceDirectory {
        &self.directory
    }

    pub fn world(&self) -> &WorldEventMachine {
        &self.world
    }

    pub fn dungeon(&self) -> &DungeonView {
        &self.dungeon
    }

    /// Set once a shutdown notice arrives; nothing further is expected.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn enter_zone(&mut self, zone: Zone) {
        if zone != self.zone() {
            self.dungeon.clear();
        }
        self.player.set_zone(&zone);
    }

    /// Decodes and applies one frame. Bad frames are logged and dropped.
    pub fn handle_frame(&mut self, text: &str, now: Instant, sink: &mut dyn PresentationSink) {
        match ServerEvent::decode(text) {
            Ok(Some(event)) => self.handle_event(event, now, sink),
            Ok(None) => debug!("Ignoring unknown event type"),
            Err(e) => warn!("Dropping malformed frame: {}", e),
        }
    }

    pub fn handle_event(
        &mut self,
        event: ServerEvent,
        now: Instant,
        sink: &mut dyn PresentationSink,
    ) {
        match event {
            ServerEvent::Welcome { connection_id } => {
                info!("Connected as {}", connection_id);
                self.directory.set_local_id(connection_id);
            }
            ServerEvent::PlayerMoved { id, state } => {
                self.directory.apply_move(id, state);
            }
            ServerEvent::PlayerDisconnected(id) => {
                if let Some(record) = self.directory.apply_disconnect(id) {
                    debug!("{} ({}) left", record.state.name, id);
                }
            }
            ServerEvent::Chat(msg) => self.receive_chat(msg, now, sink),
            ServerEvent::AdminUpdate(update) => {
                let matched = self.directory.apply_admin_update(&update);
                debug!("Admin update for {} matched {} record(s)", update.player_name, matched);
            }
            ServerEvent::Effect(effect) => {
                if renders_effect(&self.zone(), &effect.color) {
                    sink.create_effect(effect.x, effect.y, &effect.color);
                }
            }
            ServerEvent::GlobalNotification(notification) => match notification.styled() {
                Some((color, font)) => sink.display_announcement(&notification.msg, color, font),
                None => sink.show_notification(&notification.msg, notification.duration),
            },
            ServerEvent::EventToggle(toggle) => {
                self.world.apply_toggle(&toggle, sink);
            }
            ServerEvent::DungeonState(snapshot) => {
                let zone = self.zone();
                self.dungeon.apply(&zone, snapshot);
            }
            ServerEvent::DungeonEffect(effect) => self.receive_dungeon_effect(effect, sink),
            ServerEvent::Shutdown => {
                self.shut_down = true;
                sink.show_shutdown_overlay();
            }
        }
    }

    fn receive_chat(&mut self, msg: ChatMessage, now: Instant, sink: &mut dyn PresentationSink) {
        if !self.chat_filter.should_deliver(&msg, now) {
            return;
        }
        // Delivered but not shown.
        if msg.sender.muted || self.directory.is_muted(&msg.sender.name) {
            return;
        }
        sink.render_chat(&msg);
    }

    fn receive_dungeon_effect(&mut self, effect: DungeonEffect, sink: &mut dyn PresentationSink) {
        if !accepts_dungeon_event(&self.zone(), &effect.dungeon_name) {
            return;
        }
        match effect.kind.as_str() {
            "heal" => {
                if effect.sender_name() != Some(self.player.name.as_str()) {
                    sink.self_heal();
                }
            }
            other => sink.dungeon_effect(other, &effect.payload),
        }
    }

    /// Heartbeat payload. Followers are only reported inside a dungeon.
    pub fn move_event(&self) -> ClientEvent {
        let mut state = self.player.clone();
        if !state.in_dungeon {
            state.soldiers.clear();
        }
        ClientEvent::Move(state)
    }

    /// Builds an outbound chat and remembers it so an echo is not shown twice.
    pub fn chat_event(&mut self, text: &str, timestamp: u64, now: Instant) -> ClientEvent {
        let msg = ChatMessage {
            sender: ChatSender {
                name: self.player.name.clone(),
                color: self.player.color.clone(),
                title: self.title.clone(),
                muted: false,
            },
            message: text.to_string(),
            timestamp,
        };
        self.chat_filter.should_deliver(&msg, now);
        ClientEvent::Chat(msg)
    }

    pub fn effect_event(&self, x: f32, y: f32, color: &str) -> ClientEvent {
        ClientEvent::Effect(Effect {
            x,
            y,
            color: color.to_string(),
        })
    }

    pub fn notification_event(&self, msg: &str, duration_ms: u64) -> ClientEvent {
        ClientEvent::GlobalNotification(Notification {
            msg: msg.to_string(),
            duration: Some(duration_ms),
            color: None,
            font: None,
        })
    }

    fn current_dungeon(&self) -> Option<&str> {
        let dungeon_name = self.player.current_dungeon_name.as_deref()?;
        if !self.player.in_dungeon || dungeon_name.is_empty() {
            return None;
        }
        Some(dungeon_name)
    }

    /// Only possible while standing in a named dungeon.
    pub fn dungeon_effect_event(&self, kind: &str, payload: Value) -> Option<ClientEvent> {
        let dungeon_name = self.current_dungeon()?;
        Some(ClientEvent::DungeonEffect(DungeonEffect {
            kind: kind.to_string(),
            payload,
            dungeon_name: dungeon_name.to_string(),
        }))
    }

    /// Publishes this client's view of the wave for its dungeon.
    ///
    /// The relay does not echo it back, so the local view is updated here.
    pub fn dungeon_state_event(&mut self, wave: u32, enemies: Vec<Value>) -> Option<ClientEvent> {
        let snapshot = DungeonSnapshot {
            dungeon_name: self.current_dungeon()?.to_string(),
            wave,
            enemies,
        };
        let zone = self.zone();
        self.dungeon.apply(&zone, snapshot.clone());
        Some(ClientEvent::DungeonState(snapshot))
    }

    /// Switches the world event locally and builds the toggle for everyone else.
    pub fn event_toggle_event(
        &mut self,
        event: WorldEvent,
        sink: &mut dyn PresentationSink,
    ) -> ClientEvent {
        let toggle = EventToggle {
            event: event.as_str().map(str::to_string),
        };
        self.world.apply_toggle(&toggle, sink);
        ClientEvent::EventToggle(toggle)
    }

    /// Patches the named player here and on every other client.
    pub fn admin_update_event(&mut self, update: AdminUpdate) -> ClientEvent {
        self.directory.apply_admin_update(&update);
        ClientEvent::AdminUpdate(update)
    }

    /// Announcements come back to the sender, so nothing is shown locally.
    pub fn announcement_event(
        &self,
        text: &str,
        color: Option<&str>,
        font: Option<&str>,
    ) -> ClientEvent {
        ClientEvent::AdminAnnouncement(Announcement {
            text: text.to_string(),
            color: color.map(str::to_string),
            font: font.map(str::to_string),
        })
    }

    pub fn shutdown_event(&self) -> ClientEvent {
        ClientEvent::Shutdown
    }

    /// Healers share their heal with everyone else in the dungeon.
    pub fn heal_event(&self) -> Option<ClientEvent> {
        if self.player.class != "Healer" {
            return None;
        }
        self.dungeon_effect_event("heal", serde_json::json!({ "senderName": self.player.name }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Soldier;

    #[derive(Default)]
    struct RecordingSink {
        chats: Vec<String>,
        effects: usize,
        notifications: Vec<String>,
        announcements: Vec<String>,
        heals: usize,
        meteors: usize,
        shutdowns: usize,
    }

    impl PresentationSink for RecordingSink {
        fn create_effect(&mut self, _x: f32, _y: f32, _color: &str) {
            self.effects += 1;
        }
        fn show_notification(&mut self, msg: &str, _duration_ms: Option<u64>) {
            self.notifications.push(msg.to_string());
        }
        fn display_announcement(&mut self, msg: &str, _color: &str, _font: &str) {
            self.announcements.push(msg.to_string());
        }
        fn render_chat(&mut self, msg: &ChatMessage) {
            self.chats.push(msg.message.clone());
        }
        fn self_heal(&mut self) {
            self.heals += 1;
        }
        fn start_meteor_event(&mut self) {
            self.meteors += 1;
        }
        fn show_shutdown_overlay(&mut self) {
            self.shutdowns += 1;
        }
    }

    fn chat(name: &str, text: &str, timestamp: u64) -> ServerEvent {
        ServerEvent::Chat(ChatMessage {
            sender: ChatSender {
                name: name.into(),
                color: "red".into(),
                title: None,
                muted: false,
            },
            message: text.into(),
            timestamp,
        })
    }

    fn session_in(zone: Zone) -> ClientSession {
        let mut session = ClientSession::new(PlayerState::new("Me", 0.0, 0.0));
        session.enter_zone(zone);
        session
    }

    #[test]
    fn test_welcome_sets_local_id() {
        let mut session = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();
        session.handle_event(ServerEvent::Welcome { connection_id: 9 }, Instant::now(), &mut sink);
        assert_eq!(session.local_id(), Some(9));

        session.handle_event(
            ServerEvent::PlayerMoved {
                id: 9,
                state: PlayerState::new("Me", 1.0, 1.0),
            },
            Instant::now(),
            &mut sink,
        );
        assert!(session.directory().is_empty());
    }

    #[test]
    fn test_duplicate_chat_rendered_once() {
        let mut session = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();
        let now = Instant::now();

        session.handle_event(chat("Bob", "hi", 1000), now, &mut sink);
        session.handle_event(chat("Bob", "hi", 1000), now, &mut sink);
        assert_eq!(sink.chats, vec!["hi".to_string()]);
    }

    #[test]
    fn test_own_chat_echo_suppressed() {
        let mut session = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();
        let now = Instant::now();

        let outbound = session.chat_event("hello", 2000, now);
        let echoed = match outbound {
            ClientEvent::Chat(msg) => ServerEvent::Chat(msg),
            other => panic!("Unexpected event: {:?}", other),
        };
        session.handle_event(echoed, now, &mut sink);
        assert!(sink.chats.is_empty());
    }

    #[test]
    fn test_muted_chat_not_rendered() {
        let mut session = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();
        let now = Instant::now();

        session.handle_event(
            ServerEvent::PlayerMoved {
                id: 2,
                state: PlayerState::new("Bob", 0.0, 0.0),
            },
            now,
            &mut sink,
        );
        session.handle_event(
            ServerEvent::AdminUpdate(AdminUpdate {
                player_name: "Bob".into(),
                new_class: None,
                muted: Some(true),
            }),
            now,
            &mut sink,
        );
        session.handle_event(chat("Bob", "spam", 1), now, &mut sink);

        let mut flagged = match chat("Cy", "also spam", 2) {
            ServerEvent::Chat(msg) => msg,
            _ => unreachable!(),
        };
        flagged.sender.muted = true;
        session.handle_event(ServerEvent::Chat(flagged), now, &mut sink);

        assert!(sink.chats.is_empty());
    }

    #[test]
    fn test_effect_visibility() {
        let mut lobby = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();
        let now = Instant::now();
        let effect = |color: &str| {
            ServerEvent::Effect(Effect {
                x: 1.0,
                y: 2.0,
                color: color.into(),
            })
        };

        lobby.handle_event(effect("red"), now, &mut sink);
        assert_eq!(sink.effects, 0);
        lobby.handle_event(effect("gold"), now, &mut sink);
        assert_eq!(sink.effects, 1);

        let mut dungeon = session_in(Zone::dungeon("Crypt1"));
        dungeon.handle_event(effect("red"), now, &mut sink);
        assert_eq!(sink.effects, 2);
    }

    #[test]
    fn test_notification_styles() {
        let mut session = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();
        let now = Instant::now();

        session.handle_event(
            ServerEvent::GlobalNotification(Notification {
                msg: "Boss slain".into(),
                duration: Some(3000),
                color: None,
                font: None,
            }),
            now,
            &mut sink,
        );
        session.handle_event(
            ServerEvent::GlobalNotification(Notification {
                msg: "Double XP".into(),
                duration: Some(5000),
                color: Some("gold".into()),
                font: Some("24px serif".into()),
            }),
            now,
            &mut sink,
        );

        assert_eq!(sink.notifications, vec!["Boss slain".to_string()]);
        assert_eq!(sink.announcements, vec!["Double XP".to_string()]);
    }

    #[test]
    fn test_meteor_toggle_reaches_sink() {
        let mut session = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();
        session.handle_event(
            ServerEvent::EventToggle(EventToggle {
                event: Some("meteor".into()),
            }),
            Instant::now(),
            &mut sink,
        );
        assert!(session.world().meteor_active());
        assert_eq!(sink.meteors, 1);
    }

    #[test]
    fn test_dungeon_state_only_in_matching_zone() {
        let snapshot = ServerEvent::DungeonState(DungeonSnapshot {
            dungeon_name: "Crypt1".into(),
            wave: 4,
            enemies: vec![],
        });
        let mut sink = RecordingSink::default();
        let now = Instant::now();

        let mut inside = session_in(Zone::dungeon("Crypt1"));
        let mut lobby = session_in(Zone::Lobby);
        let mut elsewhere = session_in(Zone::dungeon("Crypt2"));
        for session in [&mut inside, &mut lobby, &mut elsewhere] {
            session.handle_event(snapshot.clone(), now, &mut sink);
        }

        assert_eq!(inside.dungeon().wave, 4);
        assert_eq!(lobby.dungeon().wave, 0);
        assert_eq!(elsewhere.dungeon().wave, 0);
    }

    #[test]
    fn test_leaving_dungeon_clears_view() {
        let mut session = session_in(Zone::dungeon("Crypt1"));
        let mut sink = RecordingSink::default();
        session.handle_event(
            ServerEvent::DungeonState(DungeonSnapshot {
                dungeon_name: "Crypt1".into(),
                wave: 2,
                enemies: vec![],
            }),
            Instant::now(),
            &mut sink,
        );
        session.enter_zone(Zone::Lobby);
        assert_eq!(session.dungeon(), &DungeonView::default());
    }

    #[test]
    fn test_heal_skips_sender() {
        let mut session = session_in(Zone::dungeon("Crypt1"));
        let mut sink = RecordingSink::default();
        let now = Instant::now();

        session.handle_event(
            ServerEvent::DungeonEffect(DungeonEffect::heal("Hana", "Crypt1")),
            now,
            &mut sink,
        );
        session.handle_event(
            ServerEvent::DungeonEffect(DungeonEffect::heal("Me", "Crypt1")),
            now,
            &mut sink,
        );
        session.handle_event(
            ServerEvent::DungeonEffect(DungeonEffect::heal("Hana", "Crypt2")),
            now,
            &mut sink,
        );
        assert_eq!(sink.heals, 1);
    }

    #[test]
    fn test_shutdown_marks_session() {
        let mut session = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();
        session.handle_frame(r#"{"type":"shutdown","data":null}"#, Instant::now(), &mut sink);
        assert!(session.is_shut_down());
        assert_eq!(sink.shutdowns, 1);
    }

    #[test]
    fn test_bad_frames_are_ignored() {
        let mut session = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();
        let now = Instant::now();
        session.handle_frame("garbage", now, &mut sink);
        session.handle_frame(r#"{"type":"blossomEvent"}"#, now, &mut sink);
        session.handle_frame(r#"{"type":"playerMoved","data":{"x":1}}"#, now, &mut sink);
        assert!(session.directory().is_empty());
    }

    #[test]
    fn test_move_event_drops_soldiers_in_lobby() {
        let mut session = session_in(Zone::Lobby);
        session.player.soldiers.push(Soldier {
            x: 1.0,
            y: 1.0,
            color: None,
        });
        match session.move_event() {
            ClientEvent::Move(state) => assert!(state.soldiers.is_empty()),
            other => panic!("Unexpected event: {:?}", other),
        }

        session.enter_zone(Zone::dungeon("Crypt1"));
        match session.move_event() {
            ClientEvent::Move(state) => assert_eq!(state.soldiers.len(), 1),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_heal_event_requires_healer_in_dungeon() {
        let mut session = session_in(Zone::Lobby);
        session.player.class = "Healer".into();
        assert!(session.heal_event().is_none());

        session.enter_zone(Zone::dungeon("Crypt1"));
        match session.heal_event() {
            Some(ClientEvent::DungeonEffect(effect)) => {
                assert_eq!(effect.dungeon_name, "Crypt1");
                assert_eq!(effect.sender_name(), Some("Me"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        session.player.class = "Knight".into();
        assert!(session.heal_event().is_none());
    }

    #[test]
    fn test_dungeon_state_event_updates_own_view() {
        let mut session = session_in(Zone::Lobby);
        assert!(session.dungeon_state_event(1, vec![]).is_none());

        session.enter_zone(Zone::dungeon("Crypt1"));
        let enemies = vec![serde_json::json!({"kind": "bat"})];
        match session.dungeon_state_event(6, enemies) {
            Some(ClientEvent::DungeonState(snapshot)) => {
                assert_eq!(snapshot.dungeon_name, "Crypt1");
                assert_eq!(snapshot.wave, 6);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert_eq!(session.dungeon().wave, 6);
        assert_eq!(session.dungeon().enemies.len(), 1);
    }

    #[test]
    fn test_event_toggle_event_switches_locally() {
        let mut session = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();

        session.event_toggle_event(WorldEvent::Meteor, &mut sink);
        assert!(session.world().meteor_active());
        assert_eq!(sink.meteors, 1);

        let cleared = session.event_toggle_event(WorldEvent::None, &mut sink);
        assert_eq!(session.world().current(), WorldEvent::None);

        // No event is sent as an empty payload.
        let value: Value = serde_json::from_str(&cleared.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "eventToggle");
        assert!(value["data"].get("event").is_none());
    }

    #[test]
    fn test_admin_update_event_applies_to_own_directory() {
        let mut session = session_in(Zone::Lobby);
        let mut sink = RecordingSink::default();
        session.handle_event(
            ServerEvent::PlayerMoved {
                id: 4,
                state: PlayerState::new("Bob", 0.0, 0.0),
            },
            Instant::now(),
            &mut sink,
        );

        let update = AdminUpdate {
            player_name: "Bob".into(),
            new_class: None,
            muted: Some(true),
        };
        assert_eq!(
            session.admin_update_event(update.clone()),
            ClientEvent::AdminUpdate(update)
        );
        assert!(session.directory().is_muted("Bob"));
    }

    #[test]
    fn test_announcement_and_shutdown_events() {
        let session = session_in(Zone::Lobby);
        match session.announcement_event("Double XP", Some("gold"), Some("24px serif")) {
            ClientEvent::AdminAnnouncement(announcement) => {
                let notification = announcement.into_notification(5000);
                assert_eq!(notification.styled(), Some(("gold", "24px serif")));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(session.shutdown_event().is_admin());
    }
}
