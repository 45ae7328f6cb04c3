use clap::Parser;
use client::network::{Client, ClientCommand};
use client::session::ClientSession;
use client::sink::LogSink;
use log::info;
use shared::{PlayerState, Zone};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3000")]
    server: String,

    /// Display name reported in every heartbeat
    #[arg(short = 'n', long, default_value = "Wanderer")]
    name: String,

    /// Player color
    #[arg(short = 'c', long, default_value = "blue")]
    color: String,

    /// Interval between move heartbeats in milliseconds
    #[arg(long, default_value = "100")]
    heartbeat_ms: u64,

    /// Chat message to send once connected
    #[arg(long)]
    chat: Option<String>,

    /// Start inside this dungeon instead of the lobby
    #[arg(short = 'd', long)]
    dungeon: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut player = PlayerState::new(args.name, 400.0, 300.0);
    player.color = args.color;
    let mut session = ClientSession::new(player);
    if let Some(dungeon) = args.dungeon {
        session.enter_zone(Zone::Dungeon(dungeon));
    }

    info!("Connecting to: {}", args.server);

    let (commands, command_rx) = mpsc::channel(32);
    if let Some(text) = args.chat {
        commands.send(ClientCommand::Chat(text)).await?;
    }

    let client = Client::new(session, LogSink, Duration::from_millis(args.heartbeat_ms));

    tokio::select! {
        result = client.run(&args.server, command_rx) => {
            let session = result?;
            info!("Session ended; {} other players known", session.directory().len());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, disconnecting");
        }
    }

    Ok(())
}
