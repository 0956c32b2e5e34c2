use clap::Parser;
use client::connection::UdpConnector;
use client::lobby::Identity;
use client::network::Client;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player id shown to others; random if omitted
    #[arg(short, long)]
    id: Option<String>,

    /// Display name; defaults to the player id
    #[arg(short, long)]
    username: Option<String>,

    /// Milliseconds between heartbeats
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat_ms: u64,

    /// Milliseconds between game timer ticks
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let id = args
        .id
        .unwrap_or_else(|| format!("player-{:04}", rand::random::<u16>() % 10_000));
    let username = args.username.unwrap_or_else(|| id.clone());

    info!("Starting client as {} ({})", username, id);
    info!("Connecting to: {}", args.server);

    let connector = UdpConnector::new(&args.server)?;
    let mut client = Client::new(connector, Identity::new(id, username));

    client
        .run(
            Duration::from_millis(args.heartbeat_ms),
            Duration::from_millis(args.tick_ms),
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_must_be_positive() {
        assert!(Args::try_parse_from(["client", "--tick-ms", "0"]).is_err());
        assert!(Args::try_parse_from(["client", "--heartbeat-ms", "0"]).is_err());

        let args = Args::try_parse_from(["client", "--tick-ms", "5"]).unwrap();
        assert_eq!(args.tick_ms, 5);
        assert_eq!(args.heartbeat_ms, 1000);
    }
}
