use crate::session::ClientSession;
use crate::sink::PresentationSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::Value;
use shared::protocol::AdminUpdate;
use shared::{current_timestamp_millis, ClientEvent, WorldEvent, Zone};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

/// Requests from whatever drives the client (input, game logic, tests)
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Chat(String),
    Effect { x: f32, y: f32, color: String },
    Notify { msg: String, duration_ms: u64 },
    Heal,
    EnterZone(Zone),
    /// Publish the wave for the dungeon this client is in
    DungeonState { wave: u32, enemies: Vec<Value> },
    ToggleEvent(WorldEvent),
    AdminUpdate(AdminUpdate),
    Announce {
        text: String,
        color: Option<String>,
        font: Option<String>,
    },
    Shutdown,
    Disconnect,
}

pub struct Client<S> {
    session: ClientSession,
    sink: S,
    heartbeat: Duration,
}

impl<S: PresentationSink> Client<S> {
    pub fn new(session: ClientSession, sink: S, heartbeat: Duration) -> Self {
        Self {
            session,
            sink,
            heartbeat,
        }
    }

    /// Builds the outbound event for a command, if it produces one.
    fn command_event(&mut self, command: ClientCommand) -> Option<ClientEvent> {
        match command {
            ClientCommand::Chat(text) => {
                Some(self.session.chat_event(&text, current_timestamp_millis(), Instant::now()))
            }
            ClientCommand::Effect { x, y, color } => Some(self.session.effect_event(x, y, &color)),
            ClientCommand::Notify { msg, duration_ms } => {
                Some(self.session.notification_event(&msg, duration_ms))
            }
            ClientCommand::Heal => {
                let event = self.session.heal_event();
                if event.is_none() {
                    debug!("Heal ignored: not a healer inside a dungeon");
                }
                event
            }
            ClientCommand::EnterZone(zone) => {
                self.session.enter_zone(zone);
                Some(self.session.move_event())
            }
            ClientCommand::DungeonState { wave, enemies } => {
                let event = self.session.dungeon_state_event(wave, enemies);
                if event.is_none() {
                    debug!("Dungeon state ignored: not inside a dungeon");
                }
                event
            }
            ClientCommand::ToggleEvent(event) => {
                Some(self.session.event_toggle_event(event, &mut self.sink))
            }
            ClientCommand::AdminUpdate(update) => Some(self.session.admin_update_event(update)),
            ClientCommand::Announce { text, color, font } => Some(
                self.session
                    .announcement_event(&text, color.as_deref(), font.as_deref()),
            ),
            ClientCommand::Shutdown => Some(self.session.shutdown_event()),
            ClientCommand::Disconnect => None,
        }
    }

    /// Connects and runs until the server goes away, a shutdown notice
    /// arrives, or a `Disconnect` command is received. Returns the final
    /// session state.
    pub async fn run(
        mut self,
        url: &str,
        mut commands: mpsc::Receiver<ClientCommand>,
    ) -> Result<ClientSession, Box<dyn std::error::Error>> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        info!("Connected to {}", url);
        let (mut write, mut read) = ws_stream.split();

        let mut heartbeat = interval(self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                message = read.next() => {
                    match message {
                        Some(Ok(message)) if message.is_text() => {
                            let text = message.to_text()?;
                            self.session.handle_frame(text, Instant::now(), &mut self.sink);
                            if self.session.is_shut_down() {
                                break;
                            }
                        }
                        Some(Ok(message)) if message.is_close() => {
                            info!("Server closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Error receiving frame: {}", e);
                            break;
                        }
                        None => break,
                    }
                },

                _ = heartbeat.tick() => {
                    let frame = self.session.move_event().encode()?;
                    write.send(Message::text(frame)).await?;
                },

                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if matches!(command, ClientCommand::Disconnect) {
                        break;
                    }
                    if let Some(event) = self.command_event(command) {
                        match event.encode() {
                            Ok(frame) => write.send(Message::text(frame)).await?,
                            Err(e) => warn!("Failed to encode {}: {}", event.kind(), e),
                        }
                    }
                },
            }
        }

        let _ = write.send(Message::Close(None)).await;
        Ok(self.session)
    }
}
