use clap::Parser;
use log::info;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "5111")]
    port: u16,

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Seconds of silence before a client is dropped
    #[arg(short = 't', long, default_value = "10")]
    client_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!(
        "Starting server on {} (max {} clients, {}s timeout)",
        address, args.max_clients, args.client_timeout
    );

    let mut server = Server::new(
        &address,
        args.max_clients,
        Duration::from_secs(args.client_timeout),
    )
    .await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
