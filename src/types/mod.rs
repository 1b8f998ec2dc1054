//! Typed query parameters and response records for the REST endpoints.
//!
//! - **Vocabularies**: enums for the closed sets the API uses (sources, statuses, trade
//!   sides, detection reasons). Each carries an `Unknown` variant so new server values
//!   never break decoding.
//! - **Request types**: builder-pattern structs for each endpoint
//!   (e.g. [`request::MarketsRequest`], [`request::UnusualTradesRequest`]).
//! - **Response types**: records mapped from key-normalized payloads
//!   (e.g. [`response::Market`], [`response::KeyInfo`]).
//!
//! ```
//! use propheseer_client_sdk::types::MarketSource;
//! use propheseer_client_sdk::types::request::MarketsRequest;
//!
//! let request = MarketsRequest::builder()
//!     .source(MarketSource::Kalshi)
//!     .q("fed")
//!     .limit(10)
//!     .build();
//! ```

use serde::{Deserialize, Serialize};

/// Date and time types for timestamps in API responses.
pub use chrono::{DateTime, NaiveDate, Utc};

pub mod request;
pub mod response;

/// Platform a market is listed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[non_exhaustive]
pub enum MarketSource {
    Polymarket,
    Kalshi,
    Gemini,
    /// Unknown source from the API (captures the raw value).
    #[serde(untagged)]
    Unknown(String),
}

impl Default for MarketSource {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[non_exhaustive]
pub enum MarketStatus {
    #[default]
    Open,
    Closed,
    Settled,
    /// Unknown status from the API (captures the raw value).
    #[serde(untagged)]
    Unknown(String),
}

/// Normalized market category.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[non_exhaustive]
pub enum MarketCategory {
    Politics,
    Sports,
    Finance,
    Entertainment,
    Science,
    #[default]
    Other,
    /// Category not known to this version of the SDK.
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
#[non_exhaustive]
pub enum TradeSide {
    Buy,
    Sell,
    #[serde(untagged)]
    Unknown(String),
}

impl Default for TradeSide {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

/// Why a trade was flagged as unusual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum DetectionReason {
    PotentialInsider,
    HighAmount,
    NewWallet,
    NearResolution,
    #[serde(untagged)]
    Unknown(String),
}

impl Default for DetectionReason {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}
