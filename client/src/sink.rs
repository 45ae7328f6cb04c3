//! Presentation hooks the session calls when an event needs to be shown.
//!
//! The renderer, effects and chat box live outside this crate. Whatever
//! hosts the session passes an implementation in; [`NoopSink`] stands in
//! when nothing should be drawn.

use log::info;
use serde_json::Value;
use shared::ChatMessage;

pub trait PresentationSink {
    fn create_effect(&mut self, x: f32, y: f32, color: &str);
    fn show_notification(&mut self, msg: &str, duration_ms: Option<u64>);
    fn display_announcement(&mut self, msg: &str, color: &str, font: &str);
    fn render_chat(&mut self, msg: &ChatMessage);
    fn self_heal(&mut self);
    fn start_meteor_event(&mut self);
    fn show_shutdown_overlay(&mut self);

    /// Dungeon effects other than healing. Ignored unless overridden.
    fn dungeon_effect(&mut self, _kind: &str, _payload: &Value) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl PresentationSink for NoopSink {
    fn create_effect(&mut self, _x: f32, _y: f32, _color: &str) {}
    fn show_notification(&mut self, _msg: &str, _duration_ms: Option<u64>) {}
    fn display_announcement(&mut self, _msg: &str, _color: &str, _font: &str) {}
    fn render_chat(&mut self, _msg: &ChatMessage) {}
    fn self_heal(&mut self) {}
    fn start_meteor_event(&mut self) {}
    fn show_shutdown_overlay(&mut self) {}
}

/// Writes everything to the log; used by the headless client.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PresentationSink for LogSink {
    fn create_effect(&mut self, x: f32, y: f32, color: &str) {
        info!("Effect at ({:.0}, {:.0}) in {}", x, y, color);
    }

    fn show_notification(&mut self, msg: &str, duration_ms: Option<u64>) {
        match duration_ms {
            Some(ms) => info!("Notification ({}ms): {}", ms, msg),
            None => info!("Notification: {}", msg),
        }
    }

    fn display_announcement(&mut self, msg: &str, color: &str, font: &str) {
        info!("Announcement [{} / {}]: {}", color, font, msg);
    }

    fn render_chat(&mut self, msg: &ChatMessage) {
        match msg.sender_title() {
            Some(title) => info!("{} [{}]: {}", msg.sender.name, title, msg.message),
            None => info!("{}: {}", msg.sender.name, msg.message),
        }
    }

    fn self_heal(&mut self) {
        info!("Healed by a party member");
    }

    fn start_meteor_event(&mut self) {
        info!("Meteor shower started");
    }

    fn show_shutdown_overlay(&mut self) {
        info!("Server is shutting down");
    }

    fn dungeon_effect(&mut self, kind: &str, _payload: &Value) {
        info!("Dungeon effect: {}", kind);
    }
}
