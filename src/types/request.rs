#![allow(
    clippy::module_name_repetitions,
    reason = "Request suffix is intentional for clarity"
)]

use bon::Builder;
use serde::Serialize;
use serde_with::formats::CommaSeparator;
use serde_with::{StringWithSeparator, serde_as, skip_serializing_none};

use crate::types::{DetectionReason, MarketCategory, MarketSource, MarketStatus, TradeSide};

/// Query for `GET /v1/markets`.
#[skip_serializing_none]
#[derive(Debug, Clone, Builder, Default, Serialize)]
#[non_exhaustive]
pub struct MarketsRequest {
    pub source: Option<MarketSource>,
    pub category: Option<MarketCategory>,
    pub status: Option<MarketStatus>,
    /// Free-text search
    #[builder(into)]
    pub q: Option<String>,
    /// Page size, at most 200
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

/// Query for `GET /v1/arbitrage`. Requires the Pro plan or higher.
#[skip_serializing_none]
#[derive(Debug, Clone, Builder, Default, Serialize)]
#[non_exhaustive]
pub struct ArbitrageRequest {
    /// Minimum spread as a decimal; the server defaults to `0.03`
    pub min_spread: Option<f64>,
    pub category: Option<MarketCategory>,
}

/// Query for `GET /v1/unusual-trades`.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Builder, Default, Serialize)]
#[non_exhaustive]
pub struct UnusualTradesRequest {
    /// Page size, at most 100
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    #[builder(into)]
    pub market_id: Option<String>,
    pub reason: Option<DetectionReason>,
    /// Minimum anomaly score, 0-100
    pub min_score: Option<f64>,
    /// ISO 8601 date or timestamp
    #[builder(into)]
    pub since: Option<String>,
    pub side: Option<TradeSide>,
    pub source: Option<MarketSource>,
    /// Sent as one comma-separated value
    #[serde_as(as = "StringWithSeparator::<CommaSeparator, String>")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub exclude_categories: Vec<String>,
}

/// Query for `GET /v1/markets/history`.
#[skip_serializing_none]
#[derive(Debug, Clone, Builder, Default, Serialize)]
#[non_exhaustive]
pub struct HistoryRequest {
    #[builder(into)]
    pub market_id: Option<String>,
    pub source: Option<MarketSource>,
    pub category: Option<MarketCategory>,
    /// Days of history; the server defaults to 30
    pub days: Option<u32>,
    pub limit: Option<u32>,
}

/// Query for `GET /v1/public/ticker`.
#[skip_serializing_none]
#[derive(Debug, Clone, Builder, Default, Serialize)]
#[non_exhaustive]
pub struct TickerRequest {
    /// Items to return, at most 20
    pub limit: Option<u32>,
}
