//! Two clients register, queue, get matched, and exchange one message.
//!
//! Run with: cargo run --example basic_usage

use std::time::Duration;

use duet::client::{ClientEvent, DuetClient, DuetClientConfig};
use duet::protocol::messages::{Gender, Preference};
use duet::server::pair_server::ServerConfig;
use duet::PairServer;
use tokio::sync::mpsc::UnboundedReceiver;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Start a server on a local port
    let config = ServerConfig {
        bind_addr: "127.0.0.1:4455".parse()?,
        ..Default::default()
    };
    let mut server = PairServer::new(config);
    tokio::spawn(async move {
        if let Err(e) = server.start().await {
            eprintln!("server error: {}", e);
        }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client_config = DuetClientConfig {
        server_addr: "127.0.0.1:4455".parse()?,
        ..Default::default()
    };

    // Alice connects and registers
    let mut alice = DuetClient::new(client_config.clone());
    let mut alice_events = alice.connect().await?;
    alice
        .register("demo-device-a", "alice", Some("hi!".into()), Gender::Female)
        .await?;
    wait_for(&mut alice_events, |e| {
        matches!(e, ClientEvent::Registered(_))
    })
    .await;

    // Bob connects and registers
    let mut bob = DuetClient::new(client_config);
    let mut bob_events = bob.connect().await?;
    bob.register("demo-device-b", "bob", None, Gender::Male)
        .await?;
    wait_for(&mut bob_events, |e| matches!(e, ClientEvent::Registered(_))).await;

    // Both queue for anyone; the second join matches them
    alice.join_queue(Preference::Any).await?;
    bob.join_queue(Preference::Any).await?;

    let found = wait_for(&mut alice_events, |e| {
        matches!(e, ClientEvent::MatchFound(_))
    })
    .await;
    if let ClientEvent::MatchFound(m) = found {
        println!("alice matched with {}", m.partner.nickname);
    }
    wait_for(&mut bob_events, |e| matches!(e, ClientEvent::MatchFound(_))).await;

    // Alice says hello; bob receives it
    alice.send_message("hello from alice").await?;
    let msg = wait_for(&mut bob_events, |e| {
        matches!(e, ClientEvent::MessageReceived(_))
    })
    .await;
    if let ClientEvent::MessageReceived(m) = msg {
        println!("bob received: {} (from {})", m.content, m.sender);
    }

    alice.disconnect().await?;
    bob.disconnect().await?;
    Ok(())
}

/// Drain events until one matches the predicate
async fn wait_for(
    events: &mut UnboundedReceiver<ClientEvent>,
    pred: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}
