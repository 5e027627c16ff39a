//! Fetch orchestration: validation, app resolution, the page loop, and
//! continuation cursors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use apprev_core::{AppConfig, FetchDiagnostics, FetchResult, FilterSpec, Review, Store};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, ScraperError};
use crate::filter;
use crate::normalize::normalize_page;
use crate::rate_limit::{retry_with_backoff, RateLimiter};
use crate::sources::{
    AppInfo, AppStoreAdapter, FetchContext, PageQuery, PlayAdapter, ReviewSort, SourceAdapter,
};

pub const DEFAULT_MAX_PAGES: usize = 10;
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Records requested per review still wanted, leaving room for filtering.
const PAGE_OVERFETCH_FACTOR: usize = 3;

/// Separates the source's own page token from the record offset in a
/// continuation cursor.
const CURSOR_OFFSET_SEPARATOR: char = '@';

/// One review fetch as requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub app_id: String,
    pub store: Store,
    /// Maximum number of reviews to return. Must be at least 1.
    pub limit: usize,
    pub filters: FilterSpec,
    /// Cursor from a previous result's `next_page_token`.
    pub continuation_token: Option<String>,
    pub sort: ReviewSort,
    /// Locale to scope the source listing to. `None` uses the adapter default.
    pub language: Option<String>,
    pub country: Option<String>,
    pub deadline: Option<Duration>,
}

impl FetchRequest {
    #[must_use]
    pub fn new(app_id: impl Into<String>, store: Store, limit: usize) -> Self {
        Self {
            app_id: app_id.into(),
            store,
            limit,
            filters: FilterSpec::default(),
            continuation_token: None,
            sort: ReviewSort::default(),
            language: None,
            country: None,
            deadline: None,
        }
    }
}

/// Where to resume a listing: the source page token (`None` for the first
/// page) and how many raw records of that page were already consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Cursor {
    source_token: Option<String>,
    offset: usize,
}

impl Cursor {
    fn decode(token: &str) -> Self {
        if let Some((source, offset)) = token.rsplit_once(CURSOR_OFFSET_SEPARATOR) {
            if let Ok(offset) = offset.parse::<usize>() {
                return Self {
                    source_token: (!source.is_empty()).then(|| source.to_owned()),
                    offset,
                };
            }
        }
        Self {
            source_token: Some(token.to_owned()),
            offset: 0,
        }
    }

    fn encode(&self) -> Option<String> {
        match (&self.source_token, self.offset) {
            (None, 0) => None,
            (Some(token), 0) => Some(token.clone()),
            (token, offset) => Some(format!(
                "{}{CURSOR_OFFSET_SEPARATOR}{offset}",
                token.as_deref().unwrap_or_default()
            )),
        }
    }
}

/// Dispatches fetches to the registered source adapters, sharing one
/// [`RateLimiter`] across all of them.
#[derive(Clone)]
pub struct ReviewFetcher {
    adapters: HashMap<Store, Arc<dyn SourceAdapter>>,
    limiter: Arc<RateLimiter>,
    max_pages: usize,
    page_size: usize,
}

impl std::fmt::Debug for ReviewFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stores: Vec<_> = self.adapters.keys().copied().collect();
        stores.sort_by_key(|store| store.as_str());
        f.debug_struct("ReviewFetcher")
            .field("stores", &stores)
            .field("limiter", &self.limiter)
            .field("max_pages", &self.max_pages)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl ReviewFetcher {
    /// A fetcher with no adapters registered.
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            adapters: HashMap::new(),
            limiter,
            max_pages: DEFAULT_MAX_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Both marketplace adapters plus a limiter, all configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if an HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        let limiter = Arc::new(RateLimiter::from_config(config));
        Ok(Self::new(limiter)
            .with_adapter(Arc::new(PlayAdapter::from_config(config)?))
            .with_adapter(Arc::new(AppStoreAdapter::from_config(config)?))
            .with_max_pages(config.max_pages_per_fetch)
            .with_page_size(config.play_page_size))
    }

    /// Registers `adapter` for the store it reports, replacing any previous one.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.store(), adapter);
        self
    }

    /// Page budget per fetch call.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetches up to `request.limit` reviews matching `request.filters`.
    ///
    /// All validation happens before any network call. Partial progress is
    /// discarded if a page fails for good.
    ///
    /// # Errors
    ///
    /// - Validation: [`FetchError::InvalidLimit`], [`FetchError::FilterConfigInvalid`],
    ///   [`FetchError::UnsupportedStore`], [`FetchError::InvalidAppIdentifier`],
    ///   [`FetchError::InvalidContinuationToken`].
    /// - Source: [`FetchError::AppNotFound`], [`FetchError::SourceUnavailable`],
    ///   [`FetchError::SourceFailure`].
    /// - [`FetchError::Cancelled`] or [`FetchError::DeadlineExceeded`].
    pub async fn fetch(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        let (adapter, cursor) = self.validate(&request)?;

        match request.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.run(adapter, &request, cursor, cancel))
                .await
                .map_err(|_| {
                    tracing::warn!(
                        store = %request.store,
                        app_id = %request.app_id,
                        deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                        "fetch deadline exceeded"
                    );
                    FetchError::DeadlineExceeded
                })?,
            None => self.run(adapter, &request, cursor, cancel).await,
        }
    }

    /// Runs independent fetches concurrently, at most `max_concurrent` at a
    /// time. Results come back in request order.
    pub async fn fetch_all(
        &self,
        requests: Vec<FetchRequest>,
        max_concurrent: usize,
        cancel: &CancellationToken,
    ) -> Vec<Result<FetchResult, FetchError>> {
        let mut results: Vec<(usize, Result<FetchResult, FetchError>)> =
            stream::iter(requests.into_iter().enumerate())
                .map(|(position, request)| async move { (position, self.fetch(request, cancel).await) })
                .buffer_unordered(max_concurrent.max(1))
                .collect()
                .await;
        results.sort_by_key(|(position, _)| *position);
        results.into_iter().map(|(_, result)| result).collect()
    }

    fn validate(&self, request: &FetchRequest) -> Result<(&Arc<dyn SourceAdapter>, Cursor), FetchError> {
        if request.limit == 0 {
            return Err(FetchError::InvalidLimit);
        }
        request.filters.validate()?;

        let adapter = self
            .adapters
            .get(&request.store)
            .ok_or(FetchError::UnsupportedStore(request.store))?;

        adapter
            .validate_app_id(&request.app_id)
            .map_err(|reason| FetchError::InvalidAppIdentifier {
                store: request.store,
                app_id: request.app_id.clone(),
                reason,
            })?;

        let cursor = match request.continuation_token.as_deref() {
            None => Cursor {
                source_token: None,
                offset: 0,
            },
            Some(token) if token.trim().is_empty() => {
                return Err(FetchError::InvalidContinuationToken {
                    token: token.to_owned(),
                    reason: "token is empty".to_owned(),
                });
            }
            Some(token) => {
                let cursor = Cursor::decode(token.trim());
                if let Some(source) = cursor.source_token.as_deref() {
                    adapter
                        .validate_page_token(source)
                        .map_err(|reason| FetchError::InvalidContinuationToken {
                            token: token.to_owned(),
                            reason,
                        })?;
                }
                cursor
            }
        };

        Ok((adapter, cursor))
    }

    async fn run(
        &self,
        adapter: &Arc<dyn SourceAdapter>,
        request: &FetchRequest,
        cursor: Cursor,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        let store = request.store;
        let lift = |err: ScraperError| FetchError::from_source(store, &request.app_id, err);

        let query = PageQuery {
            sort: request.sort,
            language: request.language.clone(),
            country: request.country.clone(),
            page_size: self.page_size,
        };
        let ctx = FetchContext {
            limiter: &self.limiter,
            cancel,
            query: &query,
        };

        let app = retry_with_backoff(&self.limiter, store, cancel, || {
            adapter.resolve_app(&request.app_id, &ctx)
        })
        .await
        .map_err(lift)?;
        tracing::debug!(%store, app_id = %app.app_id, name = ?app.name, "resolved app");

        let (reviews, next_page_token, diagnostics) = self
            .collect_pages(adapter, &app, request, cursor, &ctx)
            .await
            .map_err(lift)?;

        tracing::info!(
            %store,
            app_id = %app.app_id,
            reviews = reviews.len(),
            pages = diagnostics.pages_fetched,
            dropped = diagnostics.normalization_dropped,
            filtered_out = diagnostics.filtered_out,
            has_more = next_page_token.is_some(),
            "fetch complete"
        );

        let mut result = FetchResult::new(app.app_id, store, request.filters.clone(), reviews);
        result.app_name = app.name;
        result.total_reviews = app.total_reviews;
        result.next_page_token = next_page_token;
        result.diagnostics = diagnostics;
        Ok(result)
    }

    async fn collect_pages(
        &self,
        adapter: &Arc<dyn SourceAdapter>,
        app: &AppInfo,
        request: &FetchRequest,
        start: Cursor,
        ctx: &FetchContext<'_>,
    ) -> Result<(Vec<Review>, Option<String>, FetchDiagnostics), ScraperError> {
        let store = request.store;
        let mut reviews: Vec<Review> = Vec::with_capacity(request.limit.min(self.page_size));
        let mut diagnostics = FetchDiagnostics::default();
        let mut page_token = start.source_token;
        let mut offset = start.offset;

        loop {
            let token = page_token.as_deref();
            let page_query = PageQuery {
                page_size: self.page_size_for(request.limit - reviews.len(), offset),
                ..ctx.query.clone()
            };
            let page_ctx = FetchContext {
                query: &page_query,
                ..*ctx
            };
            let page = retry_with_backoff(&self.limiter, store, ctx.cancel, || {
                adapter.fetch_page(app, token, &page_ctx)
            })
            .await?;
            diagnostics.pages_fetched += 1;

            let page_len = page.records.len();

            let mut resume_at = None;
            for (index, outcome) in normalize_page(page.records, store, token, offset) {
                let review = match outcome {
                    Ok(review) => review,
                    Err(_) => {
                        diagnostics.normalization_dropped += 1;
                        continue;
                    }
                };
                if !filter::matches(&review, &request.filters) {
                    diagnostics.filtered_out += 1;
                    continue;
                }
                reviews.push(review);
                if reviews.len() == request.limit {
                    resume_at = Some(index + 1);
                    break;
                }
            }

            diagnostics.raw_records += resume_at.unwrap_or(page_len).saturating_sub(offset);

            if let Some(resume_at) = resume_at {
                let cursor = if resume_at < page_len {
                    Cursor {
                        source_token: page_token,
                        offset: resume_at,
                    }
                } else {
                    Cursor {
                        source_token: page.next_token,
                        offset: 0,
                    }
                };
                return Ok((reviews, cursor.encode(), diagnostics));
            }

            let Some(next) = page.next_token else {
                return Ok((reviews, None, diagnostics));
            };

            if diagnostics.pages_fetched >= self.max_pages {
                diagnostics.page_budget_exhausted = true;
                tracing::info!(
                    %store,
                    app_id = %app.app_id,
                    pages = diagnostics.pages_fetched,
                    collected = reviews.len(),
                    limit = request.limit,
                    "page budget exhausted, returning partial results"
                );
                return Ok((reviews, Some(next), diagnostics));
            }

            page_token = Some(next);
            offset = 0;
        }
    }

    /// Records to ask the source for when `remaining` reviews are still
    /// wanted and the first `offset` records of the page were already served.
    /// Never more than the configured page size.
    fn page_size_for(&self, remaining: usize, offset: usize) -> usize {
        offset
            .saturating_add(remaining.saturating_mul(PAGE_OVERFETCH_FACTOR))
            .min(self.page_size)
    }
}
