//! # Relay Server Library
//!
//! The server side of the presence relay. It holds no world simulation:
//! every inbound event is tagged with its sender, routed to a recipient set
//! and forgotten.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Relay Loop
//! One task owns the [`relay::Relay`] and handles connects, frames and
//! disconnects strictly one after another. Registry state is therefore never
//! touched by two handlers at once and needs no lock.
//!
//! ### WebSocket Transport
//! Each accepted socket gets a reader task that forwards text frames to the
//! relay loop and a writer task that drains a bounded outbound queue. A full
//! queue drops frames for that peer only; the next heartbeat supersedes
//! whatever was lost.
//!
//! ## Module Organization
//!
//! - `client_manager`: connection registry, ID assignment, outbound queues
//! - `relay`: decoding, identity stamping, admin policy and fan-out
//! - `network`: socket accept loop and the relay loop itself
//! - `accounts`: account store interface and a JSON file implementation
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:3000", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod client_manager;
pub mod network;
pub mod relay;
