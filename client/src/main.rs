use clap::Parser;
use client::network::SyncClient;
use client::scenarios;
use log::{error, info};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:5111")]
    server: String,

    /// Player name to join with
    #[arg(short = 'n', long, default_value = "AutoTestPlayer")]
    name: String,

    /// Repetitions for the multi-step scenarios
    #[arg(short = 'i', long, default_value = "10")]
    iterations: usize,

    /// How long to wait for each server reply, in milliseconds
    #[arg(short = 't', long, default_value = "1000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut client =
        SyncClient::connect(&args.server, Duration::from_millis(args.timeout_ms)).await?;

    client.join(&args.name).await?;
    let client_id = client.client_id();
    let players = client
        .wait_for_snapshot(|players| players.contains_key(&client_id))
        .await?;
    info!(
        "Joined as \"{}\" with color {}",
        players[&client_id].name, players[&client_id].color
    );

    let results = scenarios::run_all(&mut client, args.iterations).await?;

    for result in &results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        println!("[{}] {}: {}", status, result.name, result.detail);
    }

    let (passed, total) = scenarios::summarize(&results);
    println!("{}/{} scenarios passed", passed, total);

    client.disconnect().await?;

    if passed < total {
        error!("{} scenario(s) failed", total - passed);
        return Err(format!("{} of {} scenarios failed", total - passed, total).into());
    }

    Ok(())
}
