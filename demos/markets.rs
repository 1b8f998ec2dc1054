//! Walks the REST API: categories, a filtered market listing, a paginated stream, the public
//! ticker, unusual trades, arbitrage and key usage.
//!
//! Run with tracing enabled:
//! ```sh
//! PROPHESEER_API_KEY=pk_live_... RUST_LOG=info,hyper_util=off,hyper=off,reqwest=off,rustls=off cargo run --example markets --features tracing
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=markets.log RUST_LOG=info cargo run --example markets --features tracing
//! ```

use std::fs::File;

use futures::StreamExt as _;
use propheseer_client_sdk::error::Kind;
use propheseer_client_sdk::types::request::{
    ArbitrageRequest, MarketsRequest, TickerRequest, UnusualTradesRequest,
};
use propheseer_client_sdk::types::{MarketCategory, MarketSource, MarketStatus};
use propheseer_client_sdk::{Client, Config};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let client = Client::new(Config::default())?;

    // The ticker is public, so it is the one call that works without a key
    match client.ticker(&TickerRequest::builder().limit(5).build()).await {
        Ok(ticker) => {
            for item in &ticker.data {
                info!(endpoint = "ticker", id = %item.id, source = %item.source, probability = item.probability);
            }
        }
        Err(e) => error!(endpoint = "ticker", error = %e),
    }

    if !client.has_api_key() {
        warn!("PROPHESEER_API_KEY is not set, skipping authenticated endpoints");
        return Ok(());
    }

    match client.categories().await {
        Ok(categories) => {
            for category in &categories.data {
                info!(endpoint = "categories", name = %category.name, subcategories = category.subcategories.len());
            }
        }
        Err(e) => error!(endpoint = "categories", error = %e),
    }

    let request = MarketsRequest::builder()
        .source(MarketSource::Kalshi)
        .category(MarketCategory::Finance)
        .status(MarketStatus::Open)
        .limit(10)
        .build();

    match client.markets(&request).await {
        Ok(page) => {
            info!(
                endpoint = "markets",
                count = page.len(),
                total = page.meta.total,
                has_more = page.has_more()
            );
            for market in &page {
                info!(endpoint = "markets", id = %market.id, question = %market.question, yes = ?market.probability_of("yes"));
            }
            if let Some(rate_limit) = &page.rate_limit {
                info!(
                    plan = %rate_limit.plan,
                    billing = %rate_limit.billing_type(),
                    remaining_day = ?rate_limit.remaining_day(),
                    remaining_minute = ?rate_limit.remaining_minute()
                );
            }
        }
        Err(e) => error!(endpoint = "markets", error = %e),
    }

    // Walk a few pages of the full listing
    let stream = client.stream_markets(&MarketsRequest::builder().limit(25).build(), Some(60));
    let mut stream = std::pin::pin!(stream);
    let mut streamed = 0_usize;
    while let Some(market) = stream.next().await {
        match market {
            Ok(_) => streamed += 1,
            Err(e) => {
                error!(endpoint = "stream_markets", error = %e);
                break;
            }
        }
    }
    info!(endpoint = "stream_markets", streamed);

    let trades = UnusualTradesRequest::builder()
        .min_score(75.0)
        .limit(5)
        .build();
    match client.unusual_trades(&trades).await {
        Ok(page) => {
            for trade in &page {
                info!(
                    endpoint = "unusual_trades",
                    market = %trade.market.question,
                    reason = %trade.detection.reason,
                    score = trade.detection.anomaly_score,
                    usdc = trade.trade.usdc_value
                );
            }
        }
        Err(e) => error!(endpoint = "unusual_trades", error = %e),
    }

    match client
        .arbitrage(&ArbitrageRequest::builder().min_spread(0.05).build())
        .await
    {
        Ok(opportunities) => {
            for opportunity in &opportunities.data {
                info!(
                    endpoint = "arbitrage",
                    question = %opportunity.question,
                    spread = opportunity.spread,
                    potential_return = %opportunity.potential_return
                );
            }
        }
        Err(e) if e.kind() == Kind::PermissionDenied => {
            warn!(endpoint = "arbitrage", "arbitrage requires the Pro plan: {}", e.message());
        }
        Err(e) => error!(endpoint = "arbitrage", error = %e),
    }

    match client.key_info().await {
        Ok(key) => info!(
            endpoint = "key_info",
            plan = %key.data.plan,
            daily = key.data.usage.daily,
            per_day = key.data.limits.requests_per_day
        ),
        Err(e) => error!(endpoint = "key_info", error = %e),
    }

    Ok(())
}
