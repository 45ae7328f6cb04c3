use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use server::relay::AdminPolicy;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value = "256")]
    max_clients: usize,

    /// Frames buffered per connection before new ones are dropped
    #[arg(short, long, default_value = "256")]
    queue_capacity: usize,

    /// Display name allowed to send admin events (repeatable). Without any,
    /// every connection is trusted.
    #[arg(short, long = "admin")]
    admins: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let admin_policy = AdminPolicy::from_names(args.admins);
    match &admin_policy {
        AdminPolicy::Open => info!("Admin events accepted from any connection"),
        AdminPolicy::AllowList(names) => info!("Admin events restricted to {:?}", names),
    }

    let config = ServerConfig {
        max_clients: args.max_clients,
        queue_capacity: args.queue_capacity,
        admin_policy,
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
