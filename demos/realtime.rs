//! Streams realtime updates for a handful of markets.
//!
//! Pass market IDs as arguments; defaults to two sample IDs. Requires the Pro plan or higher.
//!
//! ```sh
//! PROPHESEER_API_KEY=pk_live_... RUST_LOG=info,propheseer_client_sdk=debug cargo run --example realtime --features ws,tracing -- pm_123 ks_FED-25
//! ```
//!
//! Stops after 60 seconds or on Ctrl-C.

use std::time::Duration;

use futures::StreamExt as _;
use propheseer_client_sdk::ws::{Client, Config, Event, EventKind};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut markets: Vec<String> = std::env::args().skip(1).collect();
    if markets.is_empty() {
        markets = vec!["pm_123".to_owned(), "ks_FED-25".to_owned()];
    }

    let client = Client::new(Config::builder().max_reconnect_attempts(10).build())?;

    client.on(EventKind::Reconnect, |event: &Event| {
        if let Event::Reconnect { attempt } = event {
            warn!(attempt, "reconnecting");
        }
    });
    client.on(EventKind::Error, |event: &Event| {
        if let Event::Error(e) = event {
            error!(error = %e.message(), "stream error");
        }
    });

    // Subscribing before connecting is fine: the set is sent once the connection opens
    client.subscribe(markets.iter().cloned());

    let state = client.connect().await?;
    info!(?state, markets = ?client.subscriptions(), "connected");

    let mut events = std::pin::pin!(client.events());
    let deadline = tokio::time::sleep(Duration::from_secs(60));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(Ok(Event::MarketUpdate(update))) => info!(%update, "update"),
                Some(Ok(Event::MarketSnapshot(snapshot))) => info!(%snapshot, "snapshot"),
                Some(Ok(Event::Disconnect { code, reason })) => warn!(code, %reason, "disconnected"),
                Some(Ok(other)) => info!(kind = %other.kind(), "event"),
                Some(Err(e)) => warn!(error = %e, "event stream"),
                None => break,
            },
        }
    }

    client.close().await;
    info!(state = ?client.state(), "closed");

    Ok(())
}
