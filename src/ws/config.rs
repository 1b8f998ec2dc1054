#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::fmt;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;
use url::Url;

use crate::{DEFAULT_WS_BASE_URL, Result};

const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
const RECONNECT_MULTIPLIER: f64 = 2.0;

/// Configuration for the realtime client.
#[derive(Clone, Builder)]
pub struct Config {
    /// Falls back to the `PROPHESEER_API_KEY` environment variable when unset.
    #[builder(into)]
    pub(crate) api_key: Option<String>,
    /// `http://` and `https://` are rewritten to `ws://` and `wss://`.
    #[builder(into, default = DEFAULT_WS_BASE_URL.to_owned())]
    pub(crate) base_url: String,
    /// Reconnect after the server drops the connection
    #[builder(default = true)]
    pub(crate) reconnect: bool,
    #[builder(default = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    pub(crate) max_reconnect_attempts: u32,
    /// Interval between `ping` frames while connected
    #[builder(default = DEFAULT_PING_INTERVAL)]
    pub(crate) ping_interval: Duration,
    /// How long [`connect`](super::Client::connect) waits before handing control back
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    pub(crate) connect_timeout: Duration,
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
            .field("reconnect", &self.reconnect)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("ping_interval", &self.ping_interval)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Config {
    /// Base URL with a WebSocket scheme and without a trailing `/`.
    #[must_use]
    pub fn ws_base_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');

        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_owned()
        }
    }

    /// `{base}/ws?api_key={key}` with the key percent-encoded.
    pub(crate) fn endpoint(&self, api_key: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/ws", self.ws_base_url()))?;
        url.query_pairs_mut().append_pair("api_key", api_key);
        Ok(url)
    }

    /// Reconnect delays: 1 s doubling up to 30 s, no jitter. The number of attempts is bounded
    /// by `max_reconnect_attempts`, never by elapsed time.
    pub(crate) fn reconnect_backoff() -> ExponentialBackoff {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(INITIAL_RECONNECT_DELAY)
            .with_randomization_factor(0.0)
            .with_multiplier(RECONNECT_MULTIPLIER)
            .with_max_interval(MAX_RECONNECT_DELAY)
            .with_max_elapsed_time(None)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert_eq!(config.ws_base_url(), "wss://api.propheseer.com");
        assert!(config.reconnect, "reconnect on by default");
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.ping_interval, Duration::from_secs(25));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn http_schemes_are_rewritten() {
        let secure = Config::builder().base_url("https://api.example.com/").build();
        let plain = Config::builder().base_url("http://127.0.0.1:8080").build();
        let native = Config::builder().base_url("ws://localhost:9000//").build();

        assert_eq!(secure.ws_base_url(), "wss://api.example.com");
        assert_eq!(plain.ws_base_url(), "ws://127.0.0.1:8080");
        assert_eq!(native.ws_base_url(), "ws://localhost:9000");
    }

    #[test]
    fn endpoint_encodes_api_key() -> Result<()> {
        let config = Config::builder().base_url("http://127.0.0.1:8080/").build();

        let url = config.endpoint("pk/test&key=1")?;

        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:8080/ws?api_key=pk%2Ftest%26key%3D1"
        );
        Ok(())
    }

    #[test]
    fn reconnect_backoff_doubles_and_caps() {
        use backoff::backoff::Backoff as _;

        let mut backoff = Config::reconnect_backoff();
        let delays: Vec<u64> = (1..=7)
            .map(|_| backoff.next_backoff().map_or(0, |delay| delay.as_secs()))
            .collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);

        backoff.reset();
        assert_eq!(
            backoff.next_backoff().map(|delay| delay.as_secs()),
            Some(1),
            "reset restarts at the initial delay"
        );
    }
}
