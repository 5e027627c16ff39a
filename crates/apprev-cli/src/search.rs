//! The `search` command: fetch reviews for one or more apps and print them
//! as JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use apprev_core::{FilterSpec, ResponseMode, Store};
use apprev_scraper::{FetchRequest, ReviewFetcher, ReviewSort};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::Args;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Review filters, shared by the `search` command and the MCP tool.
///
/// `language` and `country` also scope the source listing, so the store is
/// asked for reviews in that locale before the filter runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args, Deserialize)]
#[serde(default)]
pub struct FilterArgs {
    /// Only reviews with exactly this many stars
    #[arg(long, conflicts_with_all = ["min_rating", "max_rating"])]
    pub rating: Option<u8>,

    /// Minimum star rating, inclusive
    #[arg(long)]
    pub min_rating: Option<u8>,

    /// Maximum star rating, inclusive
    #[arg(long)]
    pub max_rating: Option<u8>,

    /// Two-letter language code (e.g. en)
    #[arg(long)]
    pub language: Option<String>,

    /// Two-letter country code (e.g. US)
    #[arg(long)]
    pub country: Option<String>,

    /// Earliest review date, YYYY-MM-DD
    #[arg(long)]
    pub date_from: Option<String>,

    /// Latest review date, YYYY-MM-DD (the whole day is included)
    #[arg(long)]
    pub date_to: Option<String>,

    /// Only reviews the developer has replied to
    #[arg(long, conflicts_with = "no_dev_response")]
    pub has_dev_response: bool,

    /// Only reviews without a developer reply
    #[arg(long)]
    pub no_dev_response: bool,
}

impl FilterArgs {
    /// Builds the [`FilterSpec`]. Range checks are left to
    /// [`FilterSpec::validate`], which the fetcher runs.
    ///
    /// # Errors
    ///
    /// Returns an error for unparseable dates or mutually exclusive options.
    pub fn to_spec(&self) -> anyhow::Result<FilterSpec> {
        let mut spec = match self.rating {
            Some(rating) => {
                if self.min_rating.is_some() || self.max_rating.is_some() {
                    anyhow::bail!("rating cannot be combined with min_rating or max_rating");
                }
                FilterSpec::exact_rating(rating)
            }
            None => FilterSpec {
                min_rating: self.min_rating,
                max_rating: self.max_rating,
                ..FilterSpec::default()
            },
        };

        spec.language.clone_from(&self.language);
        spec.country.clone_from(&self.country);
        spec.since = self.date_from.as_deref().map(start_of_day).transpose()?;
        spec.until = self.date_to.as_deref().map(end_of_day).transpose()?;
        spec.developer_response = match (self.has_dev_response, self.no_dev_response) {
            (false, false) => ResponseMode::Any,
            (true, false) => ResponseMode::Present,
            (false, true) => ResponseMode::Absent,
            (true, true) => {
                anyhow::bail!("has_dev_response and no_dev_response are mutually exclusive")
            }
        };

        Ok(spec)
    }

    /// A fetch request for `app_id` with these filters and locale scope.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::to_spec`] errors.
    pub fn request(&self, app_id: &str, store: Store, limit: usize) -> anyhow::Result<FetchRequest> {
        let mut request = FetchRequest::new(app_id.trim(), store, limit);
        request.filters = self.to_spec()?;
        request.language.clone_from(&self.language);
        request.country.clone_from(&self.country);
        Ok(request)
    }
}

fn parse_day(value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .with_context(|| format!("invalid date \"{value}\", expected YYYY-MM-DD"))
}

fn start_of_day(value: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(parse_day(value)?.and_time(NaiveTime::MIN).and_utc())
}

fn end_of_day(value: &str) -> anyhow::Result<DateTime<Utc>> {
    parse_day(value)?
        .and_hms_nano_opt(23, 59, 59, 999_999_999)
        .map(|end| end.and_utc())
        .with_context(|| format!("no end of day for \"{value}\""))
}

/// Arguments for `apprev search`.
#[derive(Debug, Args)]
pub struct SearchArgs {
    /// App identifiers: package names for android, numeric or bundle ids for ios
    #[arg(required = true)]
    pub app_ids: Vec<String>,

    /// Marketplace to query (android or ios)
    #[arg(long)]
    pub store: Store,

    /// Maximum number of reviews per app
    #[arg(long, default_value_t = 100)]
    pub limit: usize,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Source ordering: newest or most-helpful
    #[arg(long, default_value = "newest")]
    pub sort: ReviewSort,

    /// Continuation token from a previous result's next_page_token
    #[arg(long)]
    pub page_token: Option<String>,

    /// Give up on a fetch after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Write the JSON to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Log fetch progress to stderr
    #[arg(long, short)]
    pub verbose: bool,
}

impl SearchArgs {
    /// One request per app id.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid filter options, or when a page token is
    /// given for more than one app.
    pub fn requests(&self) -> anyhow::Result<Vec<FetchRequest>> {
        if self.page_token.is_some() && self.app_ids.len() > 1 {
            anyhow::bail!("--page-token applies to a single app id");
        }

        self.app_ids
            .iter()
            .map(|app_id| {
                let mut request = self.filters.request(app_id, self.store, self.limit)?;
                request.sort = self.sort;
                request.continuation_token.clone_from(&self.page_token);
                request.deadline = self.timeout_secs.map(Duration::from_secs);
                Ok(request)
            })
            .collect()
    }
}

/// Run `apprev search`.
///
/// A single app prints one result object. Several apps are fetched
/// concurrently and print an array in argument order, with failed fetches
/// reported as `{app_id, error}` entries.
///
/// # Errors
///
/// Returns an error if argument validation fails, if any fetch fails, or if
/// the output cannot be written.
pub(crate) async fn run_search(
    fetcher: &ReviewFetcher,
    args: &SearchArgs,
    max_concurrent: usize,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let requests = args.requests()?;
    let app_ids: Vec<String> = requests.iter().map(|r| r.app_id.clone()).collect();
    let results = fetcher.fetch_all(requests, max_concurrent, cancel).await;

    if let [app_id] = app_ids.as_slice() {
        let result = results
            .into_iter()
            .next()
            .context("fetch produced no result")?
            .with_context(|| format!("failed to fetch {} reviews for {app_id}", args.store))?;
        return write_output(&serde_json::to_value(&result)?, args.output.as_deref()).await;
    }

    let mut failed = 0usize;
    let mut entries = Vec::with_capacity(results.len());
    for (app_id, result) in app_ids.iter().zip(results) {
        match result {
            Ok(result) => entries.push(serde_json::to_value(&result)?),
            Err(err) => {
                failed += 1;
                tracing::error!(%app_id, store = %args.store, error = %err, "fetch failed");
                entries.push(json!({ "app_id": app_id, "error": err.to_string() }));
            }
        }
    }

    write_output(&Value::Array(entries), args.output.as_deref()).await?;

    if failed > 0 {
        anyhow::bail!("{failed} of {} fetches failed", app_ids.len());
    }
    Ok(())
}

async fn write_output(value: &Value, path: Option<&Path>) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            tokio::fs::write(path, format!("{text}\n"))
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote results");
        }
        None => println!("{text}"),
    }
    Ok(())
}
