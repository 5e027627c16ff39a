//! Google Play adapter.
//!
//! Reviews come from the Play web client's `batchexecute` RPC endpoint,
//! paginated by an opaque cursor. The app's display name comes from the
//! public details page.

mod parse;

use std::time::Duration;

use apprev_core::{AppConfig, Store};
use async_trait::async_trait;
use reqwest::Client;

use crate::error::ScraperError;
use crate::http::{build_client, check_status};
use crate::sources::{AppInfo, FetchContext, PageQuery, RawPage, RawReview, SourceAdapter};
use crate::validate::is_package_name;

pub const DEFAULT_BASE_URL: &str = "https://play.google.com";

const BATCHEXECUTE_PATH: &str = "/_/PlayStoreUi/data/batchexecute";
const DETAILS_PATH: &str = "/store/apps/details";

/// Source adapter for Google Play.
#[derive(Debug, Clone)]
pub struct PlayAdapter {
    client: Client,
    base_url: String,
    default_language: String,
    default_country: String,
}

impl PlayAdapter {
    /// Creates an adapter talking to `base_url` (no trailing slash).
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
            default_language: "en".to_owned(),
            default_country: "us".to_owned(),
        })
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        Ok(Self::new(
            config.play_base_url.as_str(),
            config.request_timeout(),
            &config.user_agent,
        )?
        .with_default_locale(&config.default_language, &config.default_country))
    }

    /// Locale used when a fetch does not name one.
    #[must_use]
    pub fn with_default_locale(mut self, language: &str, country: &str) -> Self {
        self.default_language = language.to_ascii_lowercase();
        self.default_country = country.to_ascii_lowercase();
        self
    }

    fn locale(&self, query: &PageQuery) -> (String, String) {
        let language = query
            .language
            .as_deref()
            .unwrap_or(&self.default_language)
            .to_ascii_lowercase();
        let country = query
            .country
            .as_deref()
            .unwrap_or(&self.default_country)
            .to_ascii_lowercase();
        (language, country)
    }

    async fn batchexecute(
        &self,
        rpc: &str,
        inner: &str,
        query: &PageQuery,
    ) -> Result<serde_json::Value, ScraperError> {
        let (hl, gl) = self.locale(query);
        let url = format!("{}{BATCHEXECUTE_PATH}", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("rpcids", rpc), ("hl", hl.as_str()), ("gl", gl.as_str())])
            .form(&[("f.req", parse::envelope(rpc, inner))])
            .send()
            .await?;
        let body = check_status(response, Store::Android)?.text().await?;
        parse::extract_rpc_payload(&body, rpc)
    }

    /// Re-requests a truncated review and swaps in its full body.
    ///
    /// Only cancellation is propagated; any other failure keeps the
    /// truncated body.
    async fn expand(
        &self,
        app_id: &str,
        record: &mut RawReview,
        ctx: &FetchContext<'_>,
    ) -> Result<(), ScraperError> {
        let Some(review_id) = record.id.clone() else {
            return Ok(());
        };

        ctx.limiter.acquire(Store::Android, ctx.cancel).await?;

        let inner = parse::expand_request(app_id, &review_id);
        let outcome = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(ScraperError::Cancelled),
            outcome = self.batchexecute(parse::EXPAND_RPC, &inner, ctx.query) => outcome,
        };

        match outcome.map(|payload| parse::parse_expand_payload(&payload)) {
            Ok(Some(full)) => match full.body {
                Some(body) if !body.trim().is_empty() => record.body = Some(body),
                _ => tracing::debug!(%review_id, "expanded review had no body, keeping truncated text"),
            },
            Ok(None) => {
                tracing::debug!(%review_id, "expand returned no record, keeping truncated text");
            }
            Err(err) => {
                tracing::warn!(%review_id, error = %err, "failed to expand truncated review");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for PlayAdapter {
    fn store(&self) -> Store {
        Store::Android
    }

    fn validate_app_id(&self, app_id: &str) -> Result<(), String> {
        if is_package_name(app_id) {
            Ok(())
        } else {
            Err("expected a package name such as com.example.app".to_owned())
        }
    }

    async fn resolve_app(
        &self,
        app_id: &str,
        ctx: &FetchContext<'_>,
    ) -> Result<AppInfo, ScraperError> {
        let (hl, gl) = self.locale(ctx.query);
        let url = format!("{}{DETAILS_PATH}", self.base_url);

        let page = async {
            let response = self
                .client
                .get(&url)
                .query(&[("id", app_id), ("hl", hl.as_str()), ("gl", gl.as_str())])
                .send()
                .await?;
            Ok::<_, ScraperError>(check_status(response, Store::Android)?.text().await?)
        }
        .await;

        let name = match page {
            Ok(html) => parse::extract_app_name(&html),
            Err(ScraperError::NotFound { .. }) => {
                return Err(ScraperError::AppNotFound {
                    app_id: app_id.to_owned(),
                });
            }
            Err(err) => {
                tracing::warn!(app_id, error = %err, "could not load Play details page, app name unknown");
                None
            }
        };

        Ok(AppInfo {
            app_id: app_id.to_owned(),
            name,
            total_reviews: None,
        })
    }

    async fn fetch_page(
        &self,
        app: &AppInfo,
        page_token: Option<&str>,
        ctx: &FetchContext<'_>,
    ) -> Result<RawPage, ScraperError> {
        let query = ctx.query;
        let inner = parse::reviews_request(&app.app_id, query.sort, query.page_size, page_token);
        let payload = self.batchexecute(parse::REVIEWS_RPC, &inner, query).await?;
        let mut page = parse::parse_reviews_payload(&payload);

        tracing::debug!(
            app_id = %app.app_id,
            records = page.records.len(),
            has_next = page.next_token.is_some(),
            "fetched Play review page"
        );

        let (language, country) = self.locale(query);
        for record in &mut page.records {
            // The listing is only locale-scoped when the caller asked for one.
            if query.language.is_some() {
                record.language = Some(language.clone());
            }
            if query.country.is_some() {
                record.country = Some(country.clone());
            }
        }

        for record in &mut page.records {
            if record.body.as_deref().is_some_and(parse::is_truncated) {
                self.expand(&app.app_id, record, ctx).await?;
            }
        }

        Ok(page)
    }
}
