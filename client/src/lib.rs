//! # Relay Client Library
//!
//! Everything a game client needs to keep a consistent local picture of
//! the other players from the relay's event stream.
//!
//! ## Module Organization
//!
//! ### Presence Module (`presence`)
//! Directory of every other connection's last reported state, replaced
//! wholesale on each move and pruned on disconnect. The renderer reads it
//! once per frame through `PresenceDirectory::visible`.
//!
//! ### Dedup Module (`dedup`)
//! Suppresses repeated chat deliveries keyed by sender name and timestamp
//! within a bounded time window.
//!
//! ### World Event Module (`world_event`)
//! The none/blossom/thunder/meteor state machine and the current dungeon's
//! wave snapshot.
//!
//! ### Sink Module (`sink`)
//! The presentation hooks inbound events trigger.
//!
//! ### Session Module (`session`)
//! Ties the above together and applies each `ServerEvent`.
//!
//! ### Network Module (`network`)
//! WebSocket loop: inbound frames, move heartbeat, outbound commands.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientCommand};
//! use client::session::ClientSession;
//! use client::sink::NoopSink;
//! use shared::PlayerState;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = ClientSession::new(PlayerState::new("Ann", 100.0, 100.0));
//!     let (commands, rx) = tokio::sync::mpsc::channel(8);
//!     commands.send(ClientCommand::Chat("hello".into())).await?;
//!
//!     let client = Client::new(session, NoopSink, Duration::from_millis(100));
//!     let session = client.run("ws://127.0.0.1:3000", rx).await?;
//!     println!("{} players seen", session.directory().len());
//!     Ok(())
//! }
//! ```

pub mod dedup;
pub mod network;
pub mod presence;
pub mod session;
pub mod sink;
pub mod world_event;
