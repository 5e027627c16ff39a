//! Post-fetch filtering of normalized reviews.
//!
//! Predicates are AND-composed and applied in source order. Filtering is
//! pure: it never reorders, deduplicates, or rewrites reviews.

use apprev_core::{FilterSpec, ResponseMode, Review};

/// Returns `true` if `review` satisfies every predicate set in `spec`.
#[must_use]
pub fn matches(review: &Review, spec: &FilterSpec) -> bool {
    rating_matches(review, spec)
        && date_matches(review, spec)
        && code_matches(review.language.as_deref(), spec.language.as_deref())
        && code_matches(review.country.as_deref(), spec.country.as_deref())
        && response_matches(review, spec.developer_response)
}

/// Keeps the reviews matching `spec`, preserving their order.
#[must_use]
pub fn apply(reviews: Vec<Review>, spec: &FilterSpec) -> Vec<Review> {
    reviews
        .into_iter()
        .filter(|review| matches(review, spec))
        .collect()
}

fn rating_matches(review: &Review, spec: &FilterSpec) -> bool {
    spec.min_rating.is_none_or(|min| review.rating >= min)
        && spec.max_rating.is_none_or(|max| review.rating <= max)
}

/// Undated reviews cannot be placed in a window, so any date bound excludes them.
fn date_matches(review: &Review, spec: &FilterSpec) -> bool {
    if !spec.has_date_bounds() {
        return true;
    }
    let Some(date) = review.date else {
        return false;
    };
    spec.since.is_none_or(|since| date >= since) && spec.until.is_none_or(|until| date <= until)
}

fn code_matches(actual: Option<&str>, wanted: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => actual.is_some_and(|actual| actual.eq_ignore_ascii_case(wanted)),
    }
}

fn response_matches(review: &Review, mode: ResponseMode) -> bool {
    match mode {
        ResponseMode::Any => true,
        ResponseMode::Present => review.has_developer_response(),
        ResponseMode::Absent => !review.has_developer_response(),
    }
}
