use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::serde_as;

use crate::serde_helpers::StringFromAny;
use crate::types::{DetectionReason, MarketCategory, MarketSource, MarketStatus, TradeSide};

/// A normalized prediction market from any supported platform.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Market {
    /// Prefixed market ID, e.g. `pm_123`, `ks_FED-25`, `gm_42`
    pub id: String,
    pub source: MarketSource,
    /// Identifier on the source platform
    #[serde_as(as = "StringFromAny")]
    pub source_id: String,
    pub question: String,
    pub description: Option<String>,
    pub category: MarketCategory,
    pub status: MarketStatus,
    pub outcomes: Vec<Outcome>,
    /// Expected resolution date, ISO 8601
    pub resolution_date: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub url: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Outcome {
    /// e.g. `Yes`, `No`, or a candidate name
    pub name: String,
    /// Between 0 and 1
    pub probability: f64,
    pub volume_24h: Option<f64>,
}

impl Market {
    /// Probability of the outcome named `name`, compared case-insensitively.
    #[must_use]
    pub fn probability_of(&self, name: &str) -> Option<f64> {
        self.outcomes
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
            .map(|o| o.probability)
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Category {
    #[serde_as(as = "StringFromAny")]
    pub id: String,
    pub name: String,
    pub subcategories: Vec<String>,
}

/// A price discrepancy for the same question across platforms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ArbitrageOpportunity {
    pub question: String,
    /// Decimal spread between the cheapest and most expensive `yes` price
    pub spread: f64,
    /// Formatted, e.g. `5.2%`
    pub potential_return: String,
    pub markets: Vec<ArbitrageMarket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ArbitrageMarket {
    pub source: MarketSource,
    pub yes_price: f64,
    pub url: String,
}

/// A trade flagged by server-side anomaly detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct UnusualTrade {
    pub id: String,
    pub market: UnusualTradeMarket,
    pub trade: TradeDetails,
    pub detection: DetectionInfo,
    pub detected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct UnusualTradeMarket {
    pub id: String,
    pub question: String,
    pub source: MarketSource,
    pub end_date: Option<String>,
    pub url: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct TradeDetails {
    pub wallet_address: String,
    pub side: TradeSide,
    /// Contracts traded
    pub size: f64,
    pub price: f64,
    pub usdc_value: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct DetectionInfo {
    pub reason: DetectionReason,
    /// 0-100
    pub anomaly_score: f64,
    pub context: DetectionContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct DetectionContext {
    pub market_avg_size: f64,
    pub market_std_dev: f64,
}

/// One daily snapshot of a market. `data` keeps the whole normalized snapshot, whose shape
/// varies with the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[non_exhaustive]
pub struct MarketHistoryEntry {
    pub market_id: String,
    pub snapshot_date: Option<NaiveDate>,
    pub data: Value,
}

impl<'de> Deserialize<'de> for MarketHistoryEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data = Value::deserialize(deserializer)?;

        let market_id = match data.get("market_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => String::new(),
        };
        let snapshot_date = data
            .get("snapshot_date")
            .and_then(Value::as_str)
            .and_then(|raw| NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d").ok());

        Ok(Self {
            market_id,
            snapshot_date,
            data,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct SnapshotDate {
    pub date: Option<NaiveDate>,
    /// Markets captured on that date
    pub count: u64,
}

/// Details about the API key making the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct KeyInfo {
    pub id: String,
    pub name: String,
    pub plan: String,
    pub limits: PlanLimits,
    pub usage: KeyUsage,
    pub history: Vec<UsageHistoryEntry>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct PlanLimits {
    pub requests_per_day: u64,
    pub requests_per_minute: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct KeyUsage {
    pub daily: u64,
    pub minute: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct UsageHistoryEntry {
    pub date: Option<NaiveDate>,
    pub count: u64,
}

/// Public ticker entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct TickerItem {
    pub id: String,
    pub question: String,
    /// Probability of the primary outcome
    pub probability: f64,
    pub source: MarketSource,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::serde_helpers::normalize_keys;

    #[test]
    fn market_maps_from_normalized_payload() {
        let raw = json!({
            "id": "pm_123",
            "source": "polymarket",
            "sourceId": 123,
            "question": "Will it rain?",
            "category": "science",
            "status": "open",
            "outcomes": [
                {"name": "Yes", "probability": 0.62, "volume24h": 1500.5},
                {"name": "No", "probability": 0.38}
            ],
            "createdAt": "2025-01-02T03:04:05Z",
            "url": "https://polymarket.com/event/rain",
            "imageUrl": null,
            "tags": ["weather"]
        });

        let market: Market = serde_json::from_value(normalize_keys(raw)).expect("market");

        assert_eq!(market.id, "pm_123");
        assert_eq!(market.source, MarketSource::Polymarket);
        assert_eq!(market.source_id, "123");
        assert_eq!(market.category, MarketCategory::Science);
        assert_eq!(market.outcomes[0].volume_24h, Some(1500.5));
        assert_eq!(market.outcomes[1].volume_24h, None);
        assert_eq!(market.probability_of("yes"), Some(0.62));
        assert!(market.created_at.is_some());
        assert!(market.updated_at.is_none());
        assert_eq!(market.tags, vec!["weather".to_owned()]);
    }

    #[test]
    fn numeric_source_ids_serialize_as_strings() {
        let raw = json!({"id": "pm_7", "sourceId": 7, "question": "q"});
        let market: Market = serde_json::from_value(normalize_keys(raw)).expect("market");

        let value = serde_json::to_value(&market).expect("serializable");

        assert_eq!(value["source_id"], json!("7"));
        assert_eq!(value["id"], json!("pm_7"));

        let category: Category =
            serde_json::from_value(json!({"id": 3, "name": "finance"})).expect("category");
        assert_eq!(serde_json::to_value(&category).expect("serializable")["id"], json!("3"));
    }

    #[test]
    fn sparse_market_uses_defaults() {
        let market: Market = serde_json::from_value(json!({"id": "ks_1"})).expect("market");

        assert_eq!(market.status, MarketStatus::Open);
        assert_eq!(market.category, MarketCategory::Other);
        assert!(market.outcomes.is_empty());
        assert_eq!(market.url, "");
    }

    #[test]
    fn unusual_trade_maps_nested_records() {
        let raw = json!({
            "id": "ut_1",
            "market": {"id": "pm_9", "question": "Q?", "source": "polymarket", "endDate": "2025-06-01"},
            "trade": {
                "walletAddress": "0xabc",
                "side": "BUY",
                "size": 1000,
                "price": 0.12,
                "usdcValue": 120.0,
                "timestamp": "2025-05-01T12:00:00Z",
                "transactionHash": "0xdef"
            },
            "detection": {
                "reason": "new_wallet",
                "anomalyScore": 91.5,
                "context": {"marketAvgSize": 50.0, "marketStdDev": 12.5}
            },
            "detectedAt": "2025-05-01T12:00:05Z"
        });

        let trade: UnusualTrade = serde_json::from_value(normalize_keys(raw)).expect("trade");

        assert_eq!(trade.market.end_date.as_deref(), Some("2025-06-01"));
        assert_eq!(trade.trade.side, TradeSide::Buy);
        assert_eq!(trade.trade.wallet_address, "0xabc");
        assert_eq!(trade.detection.reason, DetectionReason::NewWallet);
        assert_eq!(trade.detection.context.market_std_dev, 12.5);
    }

    #[test]
    fn history_entry_keeps_full_snapshot() {
        let raw = normalize_keys(json!({
            "marketId": "pm_1",
            "snapshotDate": "2025-03-04",
            "probability": 0.4,
            "volume24h": 10
        }));

        let entry: MarketHistoryEntry = serde_json::from_value(raw.clone()).expect("entry");

        assert_eq!(entry.market_id, "pm_1");
        assert_eq!(entry.snapshot_date, NaiveDate::from_ymd_opt(2025, 3, 4));
        assert_eq!(entry.data, raw);
        assert_eq!(entry.data["volume_24h"], json!(10));
    }

    #[test]
    fn key_info_maps_limits_and_history() {
        let raw = json!({
            "id": "key_1",
            "name": "default",
            "plan": "pro",
            "limits": {"requestsPerDay": 10000, "requestsPerMinute": 60},
            "usage": {"daily": 5, "minute": 1, "total": 500},
            "history": [{"date": "2025-01-01", "count": 3}],
            "createdAt": "2024-12-01T00:00:00Z",
            "lastUsedAt": null
        });

        let info: KeyInfo = serde_json::from_value(normalize_keys(raw)).expect("key info");

        assert_eq!(info.limits.requests_per_minute, 60);
        assert_eq!(info.usage.total, 500);
        assert_eq!(info.history[0].date, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert!(info.last_used_at.is_none());
    }
}
