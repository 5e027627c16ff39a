use apprev_core::{FilterError, Store};
use thiserror::Error;

/// Transport- and payload-level failures raised by the source adapters and
/// the rate limiter.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {store}{}", retry_hint(.retry_after_secs))]
    RateLimited {
        store: Store,
        retry_after_secs: Option<u64>,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The payload was truncated or lacked the expected envelope. Sources
    /// occasionally serve these under load, so they are retried.
    #[error("malformed payload for {context}: {reason}")]
    MalformedPayload { context: String, reason: String },

    #[error("app not found: {app_id}")]
    AppNotFound { app_id: String },

    #[error("invalid page token \"{token}\": {reason}")]
    InvalidPageToken { token: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{store} unavailable after {attempts} attempts: {last}")]
    RetriesExhausted {
        store: Store,
        attempts: u32,
        #[source]
        last: Box<ScraperError>,
    },
}

#[allow(clippy::ref_option)]
fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(" (retry after {secs}s)"))
        .unwrap_or_default()
}

impl ScraperError {
    /// Returns `true` if the error is transient and worth another attempt
    /// after a backoff delay.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            ScraperError::RateLimited { .. } | ScraperError::MalformedPayload { .. } => true,
            ScraperError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            ScraperError::UnexpectedStatus { status, .. } => *status >= 500,
            ScraperError::NotFound { .. }
            | ScraperError::Deserialize { .. }
            | ScraperError::AppNotFound { .. }
            | ScraperError::InvalidPageToken { .. }
            | ScraperError::Cancelled
            | ScraperError::RetriesExhausted { .. } => false,
        }
    }
}

/// Caller-facing failures of a review fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid {store} app identifier \"{app_id}\": {reason}")]
    InvalidAppIdentifier {
        store: Store,
        app_id: String,
        reason: String,
    },

    #[error("limit must be at least 1")]
    InvalidLimit,

    #[error("invalid continuation token \"{token}\": {reason}")]
    InvalidContinuationToken { token: String, reason: String },

    #[error("invalid filter configuration: {0}")]
    FilterConfigInvalid(#[from] FilterError),

    #[error("no source adapter registered for {0}")]
    UnsupportedStore(Store),

    #[error("app {app_id} not found on {store}")]
    AppNotFound { store: Store, app_id: String },

    #[error("{store} unavailable after {attempts} attempts: {source}")]
    SourceUnavailable {
        store: Store,
        attempts: u32,
        #[source]
        source: Box<ScraperError>,
    },

    #[error("{store} request failed: {source}")]
    SourceFailure {
        store: Store,
        #[source]
        source: ScraperError,
    },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("fetch did not finish within its deadline")]
    DeadlineExceeded,
}

impl FetchError {
    /// Lift a transport error raised while talking to `store` for `app_id`.
    pub(crate) fn from_source(store: Store, app_id: &str, err: ScraperError) -> Self {
        match err {
            ScraperError::Cancelled => FetchError::Cancelled,
            ScraperError::AppNotFound { .. } => FetchError::AppNotFound {
                store,
                app_id: app_id.to_owned(),
            },
            ScraperError::InvalidPageToken { token, reason } => {
                FetchError::InvalidContinuationToken { token, reason }
            }
            ScraperError::RetriesExhausted { attempts, last, .. } => FetchError::SourceUnavailable {
                store,
                attempts,
                source: last,
            },
            other => FetchError::SourceFailure {
                store,
                source: other,
            },
        }
    }
}
