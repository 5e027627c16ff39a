//! App Store adapter.
//!
//! Reviews come from the public customer-reviews RSS feed, which serves at
//! most [`MAX_FEED_PAGE`] pages per storefront. App metadata and bundle-id
//! resolution go through the iTunes lookup API.

mod feed;
mod types;

use std::time::Duration;

use apprev_core::{AppConfig, Store};
use async_trait::async_trait;
use reqwest::Client;

use crate::error::ScraperError;
use crate::http::{build_client, check_status};
use crate::sources::{AppInfo, FetchContext, PageQuery, RawPage, ReviewSort, SourceAdapter};
use crate::validate::{is_package_name, is_track_id};

use self::types::{LookupResponse, LookupResult};

pub const DEFAULT_BASE_URL: &str = "https://itunes.apple.com";

/// The feed refuses pages past this index.
pub const MAX_FEED_PAGE: u32 = 10;

/// Source adapter for the Apple App Store.
#[derive(Debug, Clone)]
pub struct AppStoreAdapter {
    client: Client,
    base_url: String,
    default_country: String,
}

fn parse_page_token(token: &str) -> Result<u32, String> {
    let page = token
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("expected a page number between 1 and {MAX_FEED_PAGE}"))?;
    if (1..=MAX_FEED_PAGE).contains(&page) {
        Ok(page)
    } else {
        Err(format!("page {page} is outside 1..={MAX_FEED_PAGE}"))
    }
}

/// Next page to request after `page`, if the feed can have one.
fn next_page(page: u32, had_entries: bool, last_page: Option<u32>) -> Option<u32> {
    let ceiling = last_page.map_or(MAX_FEED_PAGE, |last| last.min(MAX_FEED_PAGE));
    (had_entries && page < ceiling).then_some(page + 1)
}

impl AppStoreAdapter {
    /// Creates an adapter talking to `base_url` (no trailing slash). Both the
    /// RSS feed and the lookup API are served from this host.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, ScraperError> {
        Ok(Self {
            client: build_client(timeout, user_agent)?,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            default_country: "us".to_owned(),
        })
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        Ok(Self::new(
            config.itunes_base_url.as_str(),
            config.request_timeout(),
            &config.user_agent,
        )?
        .with_default_country(&config.default_country))
    }

    /// Storefront used when a fetch does not name one.
    #[must_use]
    pub fn with_default_country(mut self, country: &str) -> Self {
        self.default_country = country.to_ascii_lowercase();
        self
    }

    fn storefront(&self, query: &PageQuery) -> String {
        query
            .country
            .as_deref()
            .unwrap_or(&self.default_country)
            .to_ascii_lowercase()
    }

    async fn lookup(&self, key: &str, value: &str, country: &str) -> Result<Option<LookupResult>, ScraperError> {
        let url = format!("{}/lookup", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[(key, value), ("country", country)])
            .send()
            .await?;
        let body = check_status(response, Store::Ios)?.text().await?;
        let parsed: LookupResponse =
            serde_json::from_str(&body).map_err(|source| ScraperError::Deserialize {
                context: format!("itunes lookup {key}={value}"),
                source,
            })?;
        Ok(parsed.results.into_iter().next())
    }
}

#[async_trait]
impl SourceAdapter for AppStoreAdapter {
    fn store(&self) -> Store {
        Store::Ios
    }

    fn validate_app_id(&self, app_id: &str) -> Result<(), String> {
        if is_track_id(app_id) || is_package_name(app_id) {
            Ok(())
        } else {
            Err("expected a numeric app id (8+ digits) or a bundle id such as com.example.app".to_owned())
        }
    }

    fn validate_page_token(&self, token: &str) -> Result<(), String> {
        parse_page_token(token).map(|_| ())
    }

    async fn resolve_app(
        &self,
        app_id: &str,
        ctx: &FetchContext<'_>,
    ) -> Result<AppInfo, ScraperError> {
        let country = self.storefront(ctx.query);

        if is_track_id(app_id) {
            let found = match self.lookup("id", app_id, &country).await {
                Ok(found) => found,
                Err(err) => {
                    tracing::warn!(app_id, error = %err, "iTunes lookup failed, app name unknown");
                    None
                }
            };
            return Ok(AppInfo {
                app_id: app_id.to_owned(),
                name: found.as_ref().and_then(|r| r.track_name.clone()),
                total_reviews: found.and_then(|r| r.user_rating_count),
            });
        }

        let found = self.lookup("bundleId", app_id, &country).await?;
        let Some((track_id, found)) = found.and_then(|r| r.track_id.map(|id| (id, r))) else {
            return Err(ScraperError::AppNotFound {
                app_id: app_id.to_owned(),
            });
        };
        tracing::debug!(bundle_id = app_id, track_id, "resolved bundle id");

        Ok(AppInfo {
            app_id: track_id.to_string(),
            name: found.track_name,
            total_reviews: found.user_rating_count,
        })
    }

    async fn fetch_page(
        &self,
        app: &AppInfo,
        page_token: Option<&str>,
        ctx: &FetchContext<'_>,
    ) -> Result<RawPage, ScraperError> {
        let page = match page_token {
            Some(token) => parse_page_token(token).map_err(|reason| ScraperError::InvalidPageToken {
                token: token.to_owned(),
                reason,
            })?,
            None => 1,
        };
        let country = self.storefront(ctx.query);
        let sort = match ctx.query.sort {
            ReviewSort::Newest => "mostrecent",
            ReviewSort::MostHelpful => "mosthelpful",
        };
        let url = format!(
            "{}/{country}/rss/customerreviews/page={page}/id={}/sortby={sort}/xml",
            self.base_url, app.app_id
        );

        let response = self.client.get(&url).send().await?;
        let body = check_status(response, Store::Ios)?.text().await?;
        let parsed = feed::parse_feed(&body, &country)?;

        let next = next_page(page, !parsed.records.is_empty(), parsed.last_page);
        tracing::debug!(
            app_id = %app.app_id,
            page,
            records = parsed.records.len(),
            last_page = ?parsed.last_page,
            "fetched App Store feed page"
        );

        Ok(RawPage {
            records: parsed.records,
            next_token: next.map(|n| n.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_tokens_must_be_within_feed_range() {
        assert_eq!(parse_page_token("1"), Ok(1));
        assert_eq!(parse_page_token("10"), Ok(10));
        assert!(parse_page_token("0").is_err());
        assert!(parse_page_token("11").is_err());
        assert!(parse_page_token("abc").is_err());
    }

    #[test]
    fn next_page_stops_at_hard_ceiling() {
        assert_eq!(next_page(1, true, None), Some(2));
        assert_eq!(next_page(9, true, None), Some(10));
        assert_eq!(next_page(10, true, None), None);
        assert_eq!(next_page(10, true, Some(12)), None);
    }

    #[test]
    fn next_page_respects_last_link_and_empty_pages() {
        assert_eq!(next_page(2, true, Some(3)), Some(3));
        assert_eq!(next_page(3, true, Some(3)), None);
        assert_eq!(next_page(1, false, Some(10)), None);
    }

    #[test]
    fn accepts_track_ids_and_bundle_ids() {
        let adapter = AppStoreAdapter::new(DEFAULT_BASE_URL, Duration::from_secs(5), "test").unwrap();
        assert!(adapter.validate_app_id("284882215").is_ok());
        assert!(adapter.validate_app_id("com.example.chat").is_ok());
        assert!(adapter.validate_app_id("1234").is_err());
        assert!(adapter.validate_app_id("not an id").is_err());
        assert!(adapter.validate_page_token("4").is_ok());
        assert!(adapter.validate_page_token("page-4").is_err());
    }
}
