//! Server network layer: WebSocket accept loop and relay coordination

use crate::relay::{AdminPolicy, Relay};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::ConnectionId;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the relay loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        addr: SocketAddr,
        sender: mpsc::Sender<String>,
        reply: oneshot::Sender<Option<ConnectionId>>,
    },
    FrameReceived {
        client_id: ConnectionId,
        text: String,
    },
    Disconnected {
        client_id: ConnectionId,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_clients: usize,
    /// Frames buffered per connection before new ones are dropped
    pub queue_capacity: usize,
    pub admin_policy: AdminPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 256,
            queue_capacity: 256,
            admin_policy: AdminPolicy::Open,
        }
    }
}

/// Cloneable handle for stopping a running server
#[derive(Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server loop already stopped");
        }
    }
}

/// Relay server: one accept task, one reader and one writer task per
/// connection, and a single loop that owns all relay state
pub struct Server {
    listener: TcpListener,
    relay: Relay,
    queue_capacity: usize,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        config: ServerConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            relay: Relay::new(config.max_clients, config.admin_policy),
            queue_capacity: config.queue_capacity,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns the task that accepts sockets and hands each to its own task.
    /// The listener lives inside that task and is closed when it is aborted.
    fn spawn_acceptor(
        listener: TcpListener,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
        queue_capacity: usize,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let server_tx = server_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, addr, server_tx, queue_capacity).await
                            {
                                warn!("Connection from {} ended with error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Main relay loop. Each message is handled to completion before the next.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let Server {
            listener,
            mut relay,
            queue_capacity,
            server_tx,
            mut server_rx,
        } = self;

        let acceptor = Self::spawn_acceptor(listener, server_tx, queue_capacity);

        info!("Server started successfully");

        while let Some(message) = server_rx.recv().await {
            match message {
                ServerMessage::Connected {
                    addr,
                    sender,
                    reply,
                } => {
                    let client_id = relay.connect(addr, sender);
                    if client_id.is_none() {
                        warn!("Rejecting {}: server full", addr);
                    }
                    if reply.send(client_id).is_err() {
                        // The socket task is gone already; undo the registration.
                        if let Some(client_id) = client_id {
                            relay.disconnect(client_id);
                        }
                    }
                }
                ServerMessage::FrameReceived { client_id, text } => {
                    relay.handle_frame(client_id, &text);
                }
                ServerMessage::Disconnected { client_id } => {
                    relay.disconnect(client_id);
                }
                ServerMessage::Shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        // Stop accepting and release the port before returning.
        acceptor.abort();
        let _ = acceptor.await;

        Ok(())
    }
}

/// Drives one socket: upgrade, register, then pump frames both ways
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    queue_capacity: usize,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let (sender, mut outbound) = mpsc::channel::<String>(queue_capacity);
    let (reply, registered) = oneshot::channel();
    server_tx.send(ServerMessage::Connected {
        addr,
        sender,
        reply,
    })?;

    let client_id = match registered.await {
        Ok(Some(client_id)) => client_id,
        _ => {
            let _ = write.send(Message::Close(None)).await;
            return Ok(());
        }
    };

    // The registry owns the only sender, so this ends once the client is removed.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = write.send(Message::text(frame)).await {
                debug!("Write to client {} failed: {}", client_id, e);
                break;
            }
        }
        let _ = write.close().await;
    });

    while let Some(message) = read.next().await {
        match message {
            Ok(message) if message.is_text() => {
                let text = message.to_text()?.to_string();
                if server_tx
                    .send(ServerMessage::FrameReceived { client_id, text })
                    .is_err()
                {
                    break;
                }
            }
            Ok(message) if message.is_close() => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Read from client {} failed: {}", client_id, e);
                break;
            }
        }
    }

    let _ = server_tx.send(ServerMessage::Disconnected { client_id });
    let _ = writer.await;
    Ok(())
}
