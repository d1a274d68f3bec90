//! Duet - anonymous 1:1 pairing chat server
//!
//! Pairs anonymous users for ephemeral one-on-one conversations over QUIC.
//!
//! Usage:
//!   cargo run -- server                    # Run the pairing server
//!   cargo run -- server --port 4433        # Run on specific port

use duet::server::pair_server::ServerConfig;
use duet::PairServer;
use std::env;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "server" => {
            let port = parse_port(&args);
            run_server(port).await?;
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage();
            return Ok(());
        }
    }

    Ok(())
}

fn print_usage() {
    println!("Duet - Anonymous 1:1 Pairing Chat Server");
    println!();
    println!("USAGE:");
    println!("    cargo run -- server [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    server              Start the pairing server");
    println!("    help                Show this help message");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>       Port to listen on (default: 4433)");
    println!("    --max-conn <NUM>    Maximum connections (default: 10000)");
    println!();
    println!("PROTOCOL:");
    println!("    Each client keeps one bidirectional QUIC control stream:");
    println!("    - Register with a nickname, bio, and gender");
    println!("    - Join a preference queue (any / male / female)");
    println!("    - Get matched into an anonymous one-on-one session");
    println!("    - Typing signals travel as unreliable datagrams");
    println!();
    println!("EXAMPLES:");
    println!("    cargo run -- server");
    println!("    cargo run -- server --port 5000");
    println!("    RUST_LOG=debug cargo run -- server");
}

fn parse_port(args: &[String]) -> u16 {
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            if let Ok(port) = args[i + 1].parse() {
                return port;
            }
        }
    }
    4433 // default port
}

fn parse_max_connections(args: &[String]) -> usize {
    for i in 0..args.len() {
        if args[i] == "--max-conn" && i + 1 < args.len() {
            if let Ok(max) = args[i + 1].parse() {
                return max;
            }
        }
    }
    10000 // default
}

async fn run_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Duet pairing server...");

    let args: Vec<String> = env::args().collect();
    let max_connections = parse_max_connections(&args);

    let config = ServerConfig {
        bind_addr: format!("0.0.0.0:{}", port).parse()?,
        max_connections,
        idle_timeout: Duration::from_secs(300),
        ..Default::default()
    };

    info!("Configuration:");
    info!("  - Bind address: {}", config.bind_addr);
    info!("  - Max connections: {}", config.max_connections);
    info!(
        "  - Max message length: {} chars",
        config.coordinator.max_message_len
    );

    let mut server = PairServer::new(config);

    // Start server (this will run indefinitely)
    if let Err(e) = server.start().await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
