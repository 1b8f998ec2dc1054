#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod client;
pub mod error;
pub mod pagination;
pub mod rate_limit;
pub mod retry;
pub mod serde_helpers;
pub mod transport;
pub mod types;
#[cfg(feature = "ws")]
pub mod ws;

use std::time::Duration;

use serde::Serialize;

pub use crate::client::{Client, Config};
use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Version of this crate, reported in the `User-Agent` of every request.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable consulted for the API key when none is passed explicitly.
pub const API_KEY_VAR: &str = "PROPHESEER_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://api.propheseer.com";

pub const DEFAULT_WS_BASE_URL: &str = "wss://api.propheseer.com";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries after the first attempt, for a total of `DEFAULT_MAX_RETRIES + 1` sends.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// `User-Agent` sent over HTTP and on the realtime handshake.
#[must_use]
pub fn user_agent() -> String {
    format!("propheseer-rust/{VERSION}")
}

/// Resolves the credential: a non-blank explicit key wins, then [`API_KEY_VAR`].
pub(crate) fn resolve_api_key(explicit: Option<String>) -> Option<String> {
    explicit
        .filter(|key| !key.trim().is_empty())
        .or_else(|| std::env::var(API_KEY_VAR).ok())
        .filter(|key| !key.trim().is_empty())
}

/// Trait for converting request types to URL query parameters.
///
/// This trait is automatically implemented for all types that implement [`Serialize`].
/// It uses [`serde_html_form`] to flatten the struct into `key=value` pairs; fields that
/// serialize to nothing (`None` with `skip_serializing_none`) are omitted.
pub trait ToQueryParams: Serialize {
    /// Converts the request to a list of query pairs in declaration order.
    fn query_pairs(&self) -> Vec<(String, String)> {
        let encoded = serde_html_form::to_string(self)
            .inspect_err(|e| {
                #[cfg(feature = "tracing")]
                tracing::error!("Unable to convert to URL-encoded string {e:?}");
                #[cfg(not(feature = "tracing"))]
                let _: &serde_html_form::ser::Error = e;
            })
            .unwrap_or_default();

        url::form_urlencoded::parse(encoded.as_bytes())
            .into_owned()
            .collect()
    }
}

impl<T: Serialize> ToQueryParams for T {}

#[cfg(test)]
mod tests {
    use serde_with::skip_serializing_none;

    use super::*;

    #[skip_serializing_none]
    #[derive(Serialize)]
    struct Query {
        source: Option<&'static str>,
        limit: Option<u32>,
        q: Option<&'static str>,
    }

    #[test]
    fn query_pairs_omit_absent_values() {
        let query = Query {
            source: Some("kalshi"),
            limit: None,
            q: Some("fed rates"),
        };

        assert_eq!(
            query.query_pairs(),
            vec![
                ("source".to_owned(), "kalshi".to_owned()),
                ("q".to_owned(), "fed rates".to_owned()),
            ]
        );
    }

    #[test]
    fn empty_query_has_no_pairs() {
        let query = Query {
            source: None,
            limit: None,
            q: None,
        };

        assert!(query.query_pairs().is_empty(), "expected no pairs");
    }

    #[test]
    fn user_agent_carries_version() {
        assert_eq!(user_agent(), format!("propheseer-rust/{VERSION}"));
    }

    #[test]
    fn explicit_key_wins_over_environment() {
        assert_eq!(
            resolve_api_key(Some("pk_explicit".to_owned())).as_deref(),
            Some("pk_explicit")
        );

        let from_env = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty());
        assert_eq!(resolve_api_key(Some("   ".to_owned())), from_env);
    }
}
