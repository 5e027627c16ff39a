use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FilterSpec, Store};

/// A single review, normalized from either marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Source-provided review ID, or a content-derived ID when the source has none.
    pub id: String,
    pub user_name: String,
    /// Star rating, always within `1..=5`.
    pub rating: u8,
    pub title: Option<String>,
    pub text: Option<String>,
    /// When the review was posted, converted to UTC. `None` if the source
    /// date could not be parsed.
    pub date: Option<DateTime<Utc>>,
    pub helpful_count: Option<u64>,
    /// ISO 639-1 code, lowercase.
    pub language: Option<String>,
    /// ISO 3166-1 alpha-2 code, uppercase.
    pub country: Option<String>,
    /// App version the review was written against.
    pub version: Option<String>,
    pub developer_response: Option<DeveloperResponse>,
}

impl Review {
    #[must_use]
    pub fn has_developer_response(&self) -> bool {
        self.developer_response.is_some()
    }
}

/// A developer's public reply to a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperResponse {
    pub text: String,
    pub date: Option<DateTime<Utc>>,
}

/// Counters describing how a fetch arrived at its result. Not serialized
/// into the result payload; callers log or display it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchDiagnostics {
    pub pages_fetched: usize,
    pub raw_records: usize,
    /// Records skipped because they could not be normalized (bad or missing rating, etc.).
    pub normalization_dropped: usize,
    /// Normalized records removed by the filter.
    pub filtered_out: usize,
    /// The fetch stopped because it hit its page budget while the source still had pages.
    pub page_budget_exhausted: bool,
}

/// The result of one fetch: reviews plus pagination and provenance metadata.
///
/// `reviews_fetched` always equals `reviews.len()`; build values with
/// [`FetchResult::new`] to keep it that way.
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub app_id: String,
    pub app_name: Option<String>,
    pub store: Store,
    /// Source-reported total, when the source exposes one. Approximate.
    pub total_reviews: Option<u64>,
    pub reviews_fetched: usize,
    /// Present only when more reviews can be fetched.
    pub next_page_token: Option<String>,
    pub filters_applied: FilterSpec,
    pub timestamp: DateTime<Utc>,
    pub reviews: Vec<Review>,
    #[serde(skip)]
    pub diagnostics: FetchDiagnostics,
}

impl FetchResult {
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        store: Store,
        filters_applied: FilterSpec,
        reviews: Vec<Review>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_name: None,
            store,
            total_reviews: None,
            reviews_fetched: reviews.len(),
            next_page_token: None,
            filters_applied,
            timestamp: Utc::now(),
            reviews,
            diagnostics: FetchDiagnostics::default(),
        }
    }
}
