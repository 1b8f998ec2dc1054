//! Request descriptors and the retrying HTTP pipeline shared by every endpoint.

use std::time::Duration;

use bon::Builder;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client as ReqwestClient, Method, StatusCode};
use secrecy::{ExposeSecret as _, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::Result;
use crate::error::Error;
use crate::rate_limit::RateLimitInfo;
use crate::retry::RetryPolicy;
use crate::serde_helpers::{deserialize_with_warnings, normalize_keys};

/// One outbound API call, built fresh per request.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Request {
    #[builder(default = Method::GET)]
    pub method: Method,
    /// Path relative to the base URL, e.g. `/v1/markets`. Identifiers embedded as path
    /// segments must already be encoded with [`encode_path_segment`].
    #[builder(into)]
    pub path: String,
    /// Query pairs; absent parameters are simply left out.
    #[builder(default)]
    pub query: Vec<(String, String)>,
    /// JSON payload, sent with `Content-Type: application/json`.
    pub body: Option<Value>,
    /// Whether the call needs the bearer credential.
    #[builder(default = true)]
    pub auth: bool,
}

/// Status and headers of the raw HTTP response.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// A successful response: the key-normalized JSON body plus everything the caller may
/// want to inspect about the exchange.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub body: Value,
    pub rate_limit: Option<RateLimitInfo>,
    pub http: ResponseMeta,
}

impl RawResponse {
    /// Takes the `data` member of the response envelope. A missing or `null` member maps to
    /// the type's default so sparse payloads still decode.
    pub fn take_data<T: DeserializeOwned + Default>(&mut self) -> Result<T> {
        match self.body.get_mut("data").map(Value::take) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(data) => deserialize_with_warnings(data),
        }
    }

    /// Converts into a typed [`ApiResponse`] around the envelope's `data`.
    pub fn into_api<T: DeserializeOwned + Default>(mut self) -> Result<ApiResponse<T>> {
        let data = self.take_data()?;
        Ok(ApiResponse {
            data,
            rate_limit: self.rate_limit,
            http: self.http,
        })
    }
}

/// A typed API payload along with the rate-limit snapshot and HTTP metadata of the response
/// it came from.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: T,
    pub rate_limit: Option<RateLimitInfo>,
    pub http: ResponseMeta,
}

/// Percent-encodes `segment` so it is always treated as a single path segment, including
/// identifiers that contain `/`, `?` or spaces.
#[must_use]
pub fn encode_path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Joins `base` and `path` and appends the non-empty `query` pairs.
pub fn build_url(base: &str, path: &str, query: &[(String, String)]) -> Result<Url> {
    let mut url = Url::parse(&format!("{base}{path}"))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

/// Sends [`Request`]s with authentication, retries and error mapping.
#[derive(Clone, Debug)]
pub struct Transport {
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
    retry: RetryPolicy,
    client: ReqwestClient,
}

impl Transport {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client = ReqwestClient::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.map(SecretString::from),
            timeout,
            retry: RetryPolicy::new(max_retries),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `request`, retrying rate limits, server errors and network failures up to the
    /// configured budget.
    ///
    /// Fails immediately, without touching the network, when the request needs a credential
    /// and none is configured.
    pub async fn send(&self, request: &Request) -> Result<RawResponse> {
        if request.auth && self.api_key.is_none() {
            return Err(Error::missing_api_key());
        }

        let url = build_url(&self.base_url, &request.path, &request.query)?;
        let headers = self.headers(request.auth)?;

        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let delay = self.retry.delay(attempt, last_error.as_ref());

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    method = %request.method,
                    path = %request.path,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = ?last_error.as_ref().map(Error::message),
                    "retrying request"
                );

                tokio::time::sleep(delay).await;
            }

            match self
                .send_once(request, url.clone(), headers.clone(), attempt)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && self.retry.allows(attempt + 1) => {
                    last_error = Some(e);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        method = %request.method,
                        path = %request.path,
                        kind = ?e.kind(),
                        status = ?e.status().map(|s| s.as_u16()),
                        message = %e.message(),
                        "API request failed"
                    );

                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::generic("request failed after retries")))
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self, request, url, headers),
            fields(method = %request.method, path = %request.path, status_code)
        )
    )]
    async fn send_once(
        &self,
        request: &Request,
        url: Url,
        headers: HeaderMap,
        attempt: u32,
    ) -> Result<RawResponse> {
        #[cfg(not(feature = "tracing"))]
        let _: u32 = attempt;

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.connection_error(e))?;
        let status = response.status();
        let headers = response.headers().clone();

        #[cfg(feature = "tracing")]
        tracing::Span::current().record("status_code", status.as_u16());

        if !status.is_success() {
            // An unreadable error body still maps by status alone
            let body = response.json::<Value>().await.unwrap_or(Value::Null);
            return Err(Error::from_response(status, &body, &headers));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.connection_error(e))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice::<Value>(&bytes)?
        };

        Ok(RawResponse {
            body: normalize_keys(body),
            rate_limit: RateLimitInfo::from_headers(&headers),
            http: ResponseMeta { status, headers },
        })
    }

    fn headers(&self, auth: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_str(&crate::user_agent())?);

        if auth && let Some(key) = &self.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }

    fn connection_error(&self, e: reqwest::Error) -> Error {
        let message = if e.is_timeout() {
            format!("Request timed out after {}s", self.timeout.as_secs_f64())
        } else {
            format!("Connection error: {e}")
        };
        Error::connection(message, Some(Box::new(e)))
    }
}
