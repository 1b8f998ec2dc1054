use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// HTTP header map type, re-exported for use with error inspection.
pub use reqwest::header::HeaderMap;
/// HTTP status code type, re-exported for use with error inspection.
pub use reqwest::StatusCode;
use serde_json::Value;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Missing or invalid API key, either detected locally or reported with a 401
    Authentication,
    /// The credit balance cannot cover the request (402)
    InsufficientCredits,
    /// The feature is gated behind a higher plan (403)
    PermissionDenied,
    /// The requested resource does not exist (404)
    NotFound,
    /// Too many requests (429), retried before surfacing
    RateLimit,
    /// Server-side failure (5xx), retried before surfacing
    InternalServer,
    /// Network-level failure or timeout, retried before surfacing
    Connection,
    /// Any other failure
    Generic,
    /// Invalid input supplied by the caller
    Validation,
    /// Error related to the realtime WebSocket connection
    WebSocket,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    pub fn generic<S: Into<String>>(message: S) -> Self {
        Generic {
            message: message.into(),
        }
        .into()
    }

    /// Local precondition failure raised before any network call when an endpoint requires a
    /// credential and none is configured.
    #[must_use]
    pub fn missing_api_key() -> Self {
        Authentication {
            message: format!(
                "API key is required. Pass it to the config or set the {} environment variable.",
                crate::API_KEY_VAR
            ),
            headers: None,
        }
        .into()
    }

    pub fn connection<S: Into<String>>(
        message: S,
        cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Connection {
            message: message.into(),
            cause,
        }
        .into()
    }

    /// Maps a non-successful HTTP response onto the error taxonomy.
    ///
    /// `body` is the raw (camelCase) error payload; an unparseable payload should be passed as
    /// [`Value::Null`]. The mapping is total: every status code produces an error.
    #[must_use]
    pub fn from_response(status_code: StatusCode, body: &Value, headers: &HeaderMap) -> Self {
        let message = non_empty_str(body, "error")
            .or_else(|| non_empty_str(body, "message"))
            .map_or_else(
                || format!("API error: {}", status_code.as_u16()),
                ToOwned::to_owned,
            );
        let headers = headers.clone();

        match status_code.as_u16() {
            401 => Authentication {
                message,
                headers: Some(headers),
            }
            .into(),
            402 => InsufficientCredits {
                message,
                balance_cents: int_field(body, "balanceCents"),
                required_cents: int_field(body, "requiredCents"),
                headers,
            }
            .into(),
            403 => PermissionDenied {
                message,
                code: non_empty_str(body, "code").map(ToOwned::to_owned),
                required_plan: non_empty_str(body, "requiredPlan").map(ToOwned::to_owned),
                headers,
            }
            .into(),
            404 => NotFound { message, headers }.into(),
            429 => RateLimit {
                message,
                retry_after: body
                    .get("retryAfter")
                    .and_then(Value::as_f64)
                    .and_then(|secs| Duration::try_from_secs_f64(secs.max(0.0)).ok()),
                headers,
            }
            .into(),
            500.. => InternalServer {
                status_code,
                message,
                headers,
            }
            .into(),
            _ => Status {
                status_code,
                message,
                code: non_empty_str(body, "code").map(ToOwned::to_owned),
                headers,
            }
            .into(),
        }
    }

    /// Human-readable description of the failure.
    #[must_use]
    pub fn message(&self) -> String {
        if let Some(e) = self.downcast_ref::<Authentication>() {
            return e.message.clone();
        }
        if let Some(e) = self.downcast_ref::<InsufficientCredits>() {
            return e.message.clone();
        }
        if let Some(e) = self.downcast_ref::<PermissionDenied>() {
            return e.message.clone();
        }
        if let Some(e) = self.downcast_ref::<NotFound>() {
            return e.message.clone();
        }
        if let Some(e) = self.downcast_ref::<RateLimit>() {
            return e.message.clone();
        }
        if let Some(e) = self.downcast_ref::<InternalServer>() {
            return e.message.clone();
        }
        if let Some(e) = self.downcast_ref::<Connection>() {
            return e.message.clone();
        }
        if let Some(e) = self.downcast_ref::<Status>() {
            return e.message.clone();
        }
        if let Some(e) = self.downcast_ref::<Generic>() {
            return e.message.clone();
        }
        self.source
            .as_ref()
            .map_or_else(|| format!("{:?}", self.kind), ToString::to_string)
    }

    /// HTTP status associated with the failure, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self.kind {
            Kind::Authentication => Some(StatusCode::UNAUTHORIZED),
            Kind::InsufficientCredits => Some(StatusCode::PAYMENT_REQUIRED),
            Kind::PermissionDenied => Some(StatusCode::FORBIDDEN),
            Kind::NotFound => Some(StatusCode::NOT_FOUND),
            Kind::RateLimit => Some(StatusCode::TOO_MANY_REQUESTS),
            Kind::InternalServer => self
                .downcast_ref::<InternalServer>()
                .map(|e| e.status_code),
            _ => self.downcast_ref::<Status>().map(|e| e.status_code),
        }
    }

    /// Machine-readable error code, either supplied by the API or synthesized from the kind.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self.kind {
            Kind::Authentication => Some("UNAUTHORIZED"),
            Kind::InsufficientCredits => Some("INSUFFICIENT_CREDITS"),
            Kind::PermissionDenied => Some(
                self.downcast_ref::<PermissionDenied>()
                    .and_then(|e| e.code.as_deref())
                    .unwrap_or("FORBIDDEN"),
            ),
            Kind::NotFound => Some("NOT_FOUND"),
            Kind::RateLimit => Some("RATE_LIMITED"),
            Kind::InternalServer => Some("INTERNAL_ERROR"),
            _ => self.downcast_ref::<Status>().and_then(|e| e.code.as_deref()),
        }
    }

    /// Snapshot of the response headers that accompanied the failure.
    #[must_use]
    pub fn headers(&self) -> Option<&HeaderMap> {
        if let Some(e) = self.downcast_ref::<Authentication>() {
            return e.headers.as_ref();
        }
        self.downcast_ref::<InsufficientCredits>()
            .map(|e| &e.headers)
            .or_else(|| self.downcast_ref::<PermissionDenied>().map(|e| &e.headers))
            .or_else(|| self.downcast_ref::<NotFound>().map(|e| &e.headers))
            .or_else(|| self.downcast_ref::<RateLimit>().map(|e| &e.headers))
            .or_else(|| self.downcast_ref::<InternalServer>().map(|e| &e.headers))
            .or_else(|| self.downcast_ref::<Status>().map(|e| &e.headers))
    }

    /// How long the server asked us to wait before retrying, for [`Kind::RateLimit`] errors.
    /// Fractional seconds are kept.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.downcast_ref::<RateLimit>().and_then(|e| e.retry_after)
    }

    /// Whether the request pipeline retries this failure locally before surfacing it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            Kind::Connection => true,
            Kind::RateLimit | Kind::InternalServer => self
                .status()
                .is_some_and(crate::retry::RetryPolicy::should_retry),
            _ => false,
        }
    }
}

fn non_empty_str<'body>(body: &'body Value, key: &str) -> Option<&'body str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn int_field(body: &Value, key: &str) -> Option<i64> {
    body.get(key).and_then(|v| {
        v.as_i64().or_else(|| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "Cent amounts are whole numbers even when encoded as floats"
            )]
            v.as_f64().map(|f| f.round() as i64)
        })
    })
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Missing or rejected API key.
#[non_exhaustive]
#[derive(Debug)]
pub struct Authentication {
    pub message: String,
    /// Absent when the failure was detected locally, before any request was sent.
    pub headers: Option<HeaderMap>,
}

impl fmt::Display for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authentication failed: {}", self.message)
    }
}

impl StdError for Authentication {}

#[non_exhaustive]
#[derive(Debug)]
pub struct InsufficientCredits {
    pub message: String,
    /// Current balance in cents
    pub balance_cents: Option<i64>,
    /// Amount the request would have cost, in cents
    pub required_cents: Option<i64>,
    pub headers: HeaderMap,
}

impl fmt::Display for InsufficientCredits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insufficient credits: {}", self.message)?;
        if let (Some(balance), Some(required)) = (self.balance_cents, self.required_cents) {
            write!(f, " (balance {balance}¢, required {required}¢)")?;
        }
        Ok(())
    }
}

impl StdError for InsufficientCredits {}

#[non_exhaustive]
#[derive(Debug)]
pub struct PermissionDenied {
    pub message: String,
    pub code: Option<String>,
    /// Plan needed to access the resource, e.g. `pro` or `business`
    pub required_plan: Option<String>,
    pub headers: HeaderMap,
}

impl fmt::Display for PermissionDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permission denied: {}", self.message)?;
        if let Some(plan) = &self.required_plan {
            write!(f, " (requires {plan} plan)")?;
        }
        Ok(())
    }
}

impl StdError for PermissionDenied {}

#[non_exhaustive]
#[derive(Debug)]
pub struct NotFound {
    pub message: String,
    pub headers: HeaderMap,
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not found: {}", self.message)
    }
}

impl StdError for NotFound {}

#[non_exhaustive]
#[derive(Debug)]
pub struct RateLimit {
    pub message: String,
    /// Server-requested wait before retrying
    pub retry_after: Option<Duration>,
    pub headers: HeaderMap,
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate limited: {}", self.message)?;
        if let Some(delay) = self.retry_after {
            write!(f, " (retry after {delay:?})")?;
        }
        Ok(())
    }
}

impl StdError for RateLimit {}

#[non_exhaustive]
#[derive(Debug)]
pub struct InternalServer {
    pub status_code: StatusCode,
    pub message: String,
    pub headers: HeaderMap,
}

impl fmt::Display for InternalServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server error({}): {}", self.status_code, self.message)
    }
}

impl StdError for InternalServer {}

/// Network-level failure: timeout, refused connection, broken transport.
#[non_exhaustive]
#[derive(Debug)]
pub struct Connection {
    pub message: String,
    pub cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Connection {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Non-successful HTTP status without a dedicated kind.
#[non_exhaustive]
#[derive(Debug)]
pub struct Status {
    pub status_code: StatusCode,
    pub message: String,
    pub code: Option<String>,
    pub headers: HeaderMap,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error({}): {}", self.status_code, self.message)
    }
}

impl StdError for Status {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Generic {
    pub message: String,
}

impl fmt::Display for Generic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Generic {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

impl From<Authentication> for Error {
    fn from(err: Authentication) -> Self {
        Error::with_source(Kind::Authentication, err)
    }
}

impl From<InsufficientCredits> for Error {
    fn from(err: InsufficientCredits) -> Self {
        Error::with_source(Kind::InsufficientCredits, err)
    }
}

impl From<PermissionDenied> for Error {
    fn from(err: PermissionDenied) -> Self {
        Error::with_source(Kind::PermissionDenied, err)
    }
}

impl From<NotFound> for Error {
    fn from(err: NotFound) -> Self {
        Error::with_source(Kind::NotFound, err)
    }
}

impl From<RateLimit> for Error {
    fn from(err: RateLimit) -> Self {
        Error::with_source(Kind::RateLimit, err)
    }
}

impl From<InternalServer> for Error {
    fn from(err: InternalServer) -> Self {
        Error::with_source(Kind::InternalServer, err)
    }
}

impl From<Connection> for Error {
    fn from(err: Connection) -> Self {
        Error::with_source(Kind::Connection, err)
    }
}

impl From<Status> for Error {
    fn from(err: Status) -> Self {
        Error::with_source(Kind::Generic, err)
    }
}

impl From<Generic> for Error {
    fn from(err: Generic) -> Self {
        Error::with_source(Kind::Generic, err)
    }
}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::with_source(Kind::Generic, e)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Generic, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}
