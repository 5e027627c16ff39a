//! Shared HTTP plumbing for the source adapters.

use std::time::Duration;

use apprev_core::Store;
use reqwest::{Client, Response, StatusCode};

use crate::error::ScraperError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the `reqwest` client used by an adapter.
///
/// # Errors
///
/// Returns [`ScraperError::Http`] if the client cannot be constructed
/// (e.g. invalid TLS config).
pub(crate) fn build_client(timeout: Duration, user_agent: &str) -> Result<Client, ScraperError> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(user_agent)
        .build()?)
}

/// Maps non-success statuses onto typed errors and passes successful
/// responses through.
///
/// # Errors
///
/// - [`ScraperError::RateLimited`] for 429, with the `Retry-After` seconds if sent.
/// - [`ScraperError::NotFound`] for 404.
/// - [`ScraperError::UnexpectedStatus`] for any other non-2xx status.
pub(crate) fn check_status(response: Response, store: Store) -> Result<Response, ScraperError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        return Err(ScraperError::RateLimited {
            store,
            retry_after_secs,
        });
    }

    let url = response.url().to_string();
    if status == StatusCode::NOT_FOUND {
        return Err(ScraperError::NotFound { url });
    }

    Err(ScraperError::UnexpectedStatus {
        status: status.as_u16(),
        url,
    })
}
