use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a review must, must not, or may carry a developer response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Any,
    Present,
    Absent,
}

/// Post-fetch filter criteria. All set predicates must hold for a review to
/// be kept; unset predicates pass everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub min_rating: Option<u8>,
    pub max_rating: Option<u8>,
    /// Inclusive lower date bound.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper date bound.
    pub until: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub developer_response: ResponseMode,
}

/// A filter configuration that can never be satisfied or is malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("{field} must be between 1 and 5, got {value}")]
    RatingOutOfRange { field: &'static str, value: u8 },

    #[error("min_rating ({min}) is greater than max_rating ({max})")]
    RatingRangeInverted { min: u8, max: u8 },

    #[error("since ({since}) is after until ({until})")]
    DateRangeInverted {
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    },

    #[error("language must be a two-letter ISO 639-1 code, got \"{0}\"")]
    InvalidLanguage(String),

    #[error("country must be a two-letter ISO 3166-1 code, got \"{0}\"")]
    InvalidCountry(String),
}

impl FilterSpec {
    /// Filter that keeps only reviews with exactly `rating` stars.
    #[must_use]
    pub fn exact_rating(rating: u8) -> Self {
        Self {
            min_rating: Some(rating),
            max_rating: Some(rating),
            ..Self::default()
        }
    }

    /// Returns `true` when any date bound is set.
    #[must_use]
    pub fn has_date_bounds(&self) -> bool {
        self.since.is_some() || self.until.is_some()
    }

    /// Reject contradictory or malformed criteria.
    ///
    /// # Errors
    ///
    /// Returns the first [`FilterError`] found, checking ratings, then dates,
    /// then locale codes.
    pub fn validate(&self) -> Result<(), FilterError> {
        for (field, value) in [("min_rating", self.min_rating), ("max_rating", self.max_rating)] {
            if let Some(value) = value {
                if !(1..=5).contains(&value) {
                    return Err(FilterError::RatingOutOfRange { field, value });
                }
            }
        }

        if let (Some(min), Some(max)) = (self.min_rating, self.max_rating) {
            if min > max {
                return Err(FilterError::RatingRangeInverted { min, max });
            }
        }

        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(FilterError::DateRangeInverted { since, until });
            }
        }

        if let Some(language) = &self.language {
            if !is_two_letter_code(language) {
                return Err(FilterError::InvalidLanguage(language.clone()));
            }
        }

        if let Some(country) = &self.country {
            if !is_two_letter_code(country) {
                return Err(FilterError::InvalidCountry(country.clone()));
            }
        }

        Ok(())
    }
}

fn is_two_letter_code(code: &str) -> bool {
    code.len() == 2 && code.bytes().all(|b| b.is_ascii_alphabetic())
}

#[cfg(test)]
#[path = "filters_test.rs"]
mod tests;
