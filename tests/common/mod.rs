#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Deeply nested uses in sub-modules are falsely flagged as being unused"
)]

use httpmock::MockServer;
use propheseer_client_sdk::{Client, Config};
use serde_json::{Value, json};

pub const API_KEY: &str = "pk_test_0123456789";
pub const BEARER: &str = "Bearer pk_test_0123456789";

/// Client pointed at `server` with retries disabled.
pub fn client(server: &MockServer) -> anyhow::Result<Client> {
    client_with_retries(server, 0)
}

pub fn client_with_retries(server: &MockServer, max_retries: u32) -> anyhow::Result<Client> {
    let config = Config::builder()
        .api_key(API_KEY)
        .base_url(server.base_url())
        .max_retries(max_retries)
        .build();

    Ok(Client::new(config)?)
}

/// Whether the credential environment variable is set, which changes the outcome of tests that
/// rely on a client without a key.
#[must_use]
pub fn env_key_present() -> bool {
    std::env::var(propheseer_client_sdk::API_KEY_VAR).is_ok_and(|key| !key.trim().is_empty())
}

/// A market in the server's wire format.
#[must_use]
pub fn market(id: &str) -> Value {
    json!({
        "id": id,
        "source": "polymarket",
        "sourceId": "0x5f1b",
        "question": "Will the Fed cut rates in March?",
        "description": "Resolves YES if the FOMC lowers the target range.",
        "category": "finance",
        "status": "open",
        "outcomes": [
            {"name": "Yes", "probability": 0.34, "volume24h": 125000.5},
            {"name": "No", "probability": 0.66, "volume24h": 98000}
        ],
        "resolutionDate": "2025-03-19T18:00:00Z",
        "createdAt": "2024-12-01T00:00:00Z",
        "updatedAt": "2025-01-15T08:30:00Z",
        "url": "https://polymarket.com/event/fed-march",
        "imageUrl": null,
        "tags": ["fed", "rates"]
    })
}

#[must_use]
pub fn subscription_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("x-ratelimit-plan", "pro"),
        ("x-billing-type", "subscription"),
        ("x-ratelimit-limit-day", "10000"),
        ("x-ratelimit-remaining-day", "9876"),
        ("x-ratelimit-limit-minute", "60"),
        ("x-ratelimit-remaining-minute", "59"),
    ]
}
