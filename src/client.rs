//! Client for the Propheseer REST API.
//!
//! # Example
//!
//! ```no_run
//! use propheseer_client_sdk::{Client, Config};
//! use propheseer_client_sdk::types::MarketSource;
//! use propheseer_client_sdk::types::request::MarketsRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(Config::builder().api_key("pk_live_...").build())?;
//!
//! let request = MarketsRequest::builder()
//!     .source(MarketSource::Kalshi)
//!     .limit(10)
//!     .build();
//!
//! let page = client.markets(&request).await?;
//! for market in &page {
//!     println!("{}: {}", market.id, market.question);
//! }
//!
//! if let Some(rate_limit) = page.rate_limit {
//!     println!("plan {}, {:?} requests left today", rate_limit.plan, rate_limit.remaining_day());
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use futures::Stream;

use crate::error::Error;
use crate::pagination::{DEFAULT_PAGE_SIZE, Page, paginate};
use crate::transport::{ApiResponse, RawResponse, Request, Transport, encode_path_segment};
use crate::types::request::{
    ArbitrageRequest, HistoryRequest, MarketsRequest, TickerRequest, UnusualTradesRequest,
};
use crate::types::response::{
    ArbitrageOpportunity, Category, KeyInfo, Market, MarketHistoryEntry, SnapshotDate,
    TickerItem, UnusualTrade,
};
use crate::{DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, Result, ToQueryParams as _};

/// Configuration for [`Client`]
#[derive(Clone, Builder)]
pub struct Config {
    /// API key. Falls back to the `PROPHESEER_API_KEY` environment variable when unset.
    #[builder(into)]
    api_key: Option<String>,
    /// Defaults to `https://api.propheseer.com`. A trailing `/` is ignored.
    #[builder(into, default = DEFAULT_BASE_URL.to_owned())]
    base_url: String,
    /// Per-request timeout, covering connect and body transfer. Defaults to 30 seconds.
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,
    /// Retries for rate limits, server errors and network failures. Defaults to 2.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// HTTP client for the Propheseer API.
///
/// Cheap to clone; clones share the connection pool. Concurrent calls are independent,
/// each with its own retry budget.
#[derive(Clone, Debug)]
pub struct Client {
    transport: Arc<Transport>,
}

impl Client {
    /// Creates a client from `config`.
    ///
    /// A missing credential is not an error here: only authenticated endpoints fail, and they
    /// do so before any request is sent.
    pub fn new(config: Config) -> Result<Client> {
        let api_key = crate::resolve_api_key(config.api_key);
        let transport = Transport::new(
            &config.base_url,
            api_key,
            config.timeout,
            config.max_retries,
        )?;

        Ok(Self {
            transport: Arc::new(transport),
        })
    }

    /// Base URL requests are sent to, without a trailing `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.transport.has_api_key()
    }

    /// Sends an arbitrary request through the retrying pipeline.
    ///
    /// Useful for endpoints this SDK does not wrap yet; the body comes back key-normalized.
    pub async fn send(&self, request: &Request) -> Result<RawResponse> {
        self.transport.send(request).await
    }

    async fn get(&self, path: &str, query: Vec<(String, String)>) -> Result<RawResponse> {
        let request = Request::builder().path(path).query(query).build();
        self.transport.send(&request).await
    }

    /// Lists markets across every supported platform.
    pub async fn markets(&self, request: &MarketsRequest) -> Result<Page<Market>> {
        self.get("/v1/markets", request.query_pairs())
            .await?
            .into_page()
    }

    /// Fetches one market by its prefixed ID. The ID is encoded as a single path segment.
    pub async fn market(&self, id: &str) -> Result<ApiResponse<Market>> {
        if id.is_empty() {
            return Err(Error::validation("market id must not be empty"));
        }

        let path = format!("/v1/markets/{}", encode_path_segment(id));
        self.get(&path, Vec::new()).await?.into_api()
    }

    /// Streams every market matching `request`, page by page.
    ///
    /// Pages hold `request.limit` items (50 when unset); `request.offset` is ignored and the
    /// walk starts from the first page. Stops after `max_items` items when given.
    pub fn stream_markets<'client>(
        &'client self,
        request: &MarketsRequest,
        max_items: Option<usize>,
    ) -> impl Stream<Item = Result<Market>> + 'client {
        let base = request.clone();
        let page_size = base.limit.unwrap_or(DEFAULT_PAGE_SIZE);

        paginate(page_size, max_items, move |offset, limit| {
            let mut request = base.clone();
            request.offset = Some(offset);
            request.limit = Some(limit);
            async move { self.markets(&request).await }
        })
    }

    /// Lists the normalized categories and their subcategories.
    pub async fn categories(&self) -> Result<ApiResponse<Vec<Category>>> {
        self.get("/v1/categories", Vec::new()).await?.into_api()
    }

    /// Finds cross-platform arbitrage opportunities. Requires the Pro plan or higher.
    pub async fn arbitrage(
        &self,
        request: &ArbitrageRequest,
    ) -> Result<ApiResponse<Vec<ArbitrageOpportunity>>> {
        self.get("/v1/arbitrage", request.query_pairs())
            .await?
            .into_api()
    }

    /// Lists trades flagged by anomaly detection.
    pub async fn unusual_trades(&self, request: &UnusualTradesRequest) -> Result<Page<UnusualTrade>> {
        self.get("/v1/unusual-trades", request.query_pairs())
            .await?
            .into_page()
    }

    /// Streams every unusual trade matching `request`. See [`Client::stream_markets`].
    pub fn stream_unusual_trades<'client>(
        &'client self,
        request: &UnusualTradesRequest,
        max_items: Option<usize>,
    ) -> impl Stream<Item = Result<UnusualTrade>> + 'client {
        let base = request.clone();
        let page_size = base.limit.unwrap_or(DEFAULT_PAGE_SIZE);

        paginate(page_size, max_items, move |offset, limit| {
            let mut request = base.clone();
            request.offset = Some(offset);
            request.limit = Some(limit);
            async move { self.unusual_trades(&request).await }
        })
    }

    /// Daily market snapshots.
    pub async fn history(
        &self,
        request: &HistoryRequest,
    ) -> Result<ApiResponse<Vec<MarketHistoryEntry>>> {
        self.get("/v1/markets/history", request.query_pairs())
            .await?
            .into_api()
    }

    /// Dates for which snapshots exist.
    pub async fn history_dates(&self) -> Result<ApiResponse<Vec<SnapshotDate>>> {
        self.get("/v1/markets/history/dates", Vec::new())
            .await?
            .into_api()
    }

    /// Plan, limits and usage of the configured API key.
    pub async fn key_info(&self) -> Result<ApiResponse<KeyInfo>> {
        self.get("/v1/keys/me", Vec::new()).await?.into_api()
    }

    /// Public market ticker. Works without an API key.
    pub async fn ticker(&self, request: &TickerRequest) -> Result<ApiResponse<Vec<TickerItem>>> {
        let request = Request::builder()
            .path("/v1/public/ticker")
            .query(request.query_pairs())
            .auth(false)
            .build();

        self.transport.send(&request).await?.into_api()
    }
}
