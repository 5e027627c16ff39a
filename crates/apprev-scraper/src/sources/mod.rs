//! Marketplace adapters and the raw record shape they emit.
//!
//! Each adapter speaks one marketplace's wire format and hands back
//! [`RawReview`]s with only the fields that source actually carried. Mapping
//! to the common [`apprev_core::Review`] schema happens in
//! [`crate::normalize`].

pub mod app_store;
pub mod play;

use std::str::FromStr;

use apprev_core::Store;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;
use crate::rate_limit::RateLimiter;

pub use app_store::AppStoreAdapter;
pub use play::PlayAdapter;

/// Source-side ordering of the review listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    #[default]
    Newest,
    MostHelpful,
}

impl FromStr for ReviewSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "newest" | "most_recent" | "recent" => Ok(ReviewSort::Newest),
            "most_helpful" | "helpful" => Ok(ReviewSort::MostHelpful),
            other => Err(format!(
                "unknown sort \"{other}\" (expected \"newest\" or \"most-helpful\")"
            )),
        }
    }
}

/// Listing parameters shared by every page of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub sort: ReviewSort,
    /// Locale the caller scoped the listing to. `None` uses the adapter default
    /// and leaves the per-review language unknown.
    pub language: Option<String>,
    pub country: Option<String>,
    /// Requested records per page, for sources that take one.
    pub page_size: usize,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            sort: ReviewSort::Newest,
            language: None,
            country: None,
            page_size: 100,
        }
    }
}

/// Everything an adapter call needs besides its own arguments.
#[derive(Clone, Copy)]
pub struct FetchContext<'a> {
    pub limiter: &'a RateLimiter,
    pub cancel: &'a CancellationToken,
    pub query: &'a PageQuery,
}

/// An app as resolved by its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// Identifier the source's review endpoint expects, which may differ
    /// from what the caller passed (App Store bundle ids resolve to track ids).
    pub app_id: String,
    pub name: Option<String>,
    /// Source-reported review/rating count, when exposed.
    pub total_reviews: Option<u64>,
}

/// One page of raw records plus the source's cursor for the next page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    pub records: Vec<RawReview>,
    /// `None` when the source has no further pages.
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawRating {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTimestamp {
    /// Seconds since the Unix epoch.
    Epoch(i64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReply {
    pub text: Option<String>,
    pub replied_at: Option<RawTimestamp>,
}

/// A review exactly as one source reported it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReview {
    pub id: Option<String>,
    pub author: Option<String>,
    pub rating: Option<RawRating>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub posted_at: Option<RawTimestamp>,
    pub helpful_count: Option<i64>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub app_version: Option<String>,
    pub reply: Option<RawReply>,
}

/// A marketplace the orchestrator can pull reviews from.
///
/// Implementations make exactly one primary request per `resolve_app` or
/// `fetch_page` call; the orchestrator wraps those calls in
/// [`crate::rate_limit::retry_with_backoff`]. Any secondary request an
/// adapter issues on its own must first go through `ctx.limiter.acquire`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn store(&self) -> Store;

    /// Checks the identifier grammar. Pure; never touches the network.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the identifier is malformed.
    fn validate_app_id(&self, app_id: &str) -> Result<(), String>;

    /// Checks a continuation token this source issued.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the token cannot be one of ours.
    fn validate_page_token(&self, _token: &str) -> Result<(), String> {
        Ok(())
    }

    async fn resolve_app(
        &self,
        app_id: &str,
        ctx: &FetchContext<'_>,
    ) -> Result<AppInfo, ScraperError>;

    async fn fetch_page(
        &self,
        app: &AppInfo,
        page_token: Option<&str>,
        ctx: &FetchContext<'_>,
    ) -> Result<RawPage, ScraperError>;
}
