//! The `search_reviews` tool: definition, argument decoding, and execution.

use std::time::Duration;

use apprev_core::Store;
use apprev_scraper::{FetchRequest, ReviewFetcher, ReviewSort};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::message::{McpError, McpResult};
use crate::search::FilterArgs;

pub const SEARCH_REVIEWS: &str = "search_reviews";

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    pub fn json(value: &impl Serialize) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|e| e.to_string());
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            content: vec![ToolContent::Text { text: message }],
            is_error: Some(true),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// Arguments accepted by `search_reviews`; mirrors `apprev search` for one app.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchReviewsArgs {
    pub app_id: String,
    pub store: Store,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(flatten)]
    pub filters: FilterArgs,
    #[serde(default)]
    pub sort: ReviewSort,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl SearchReviewsArgs {
    fn into_request(self) -> anyhow::Result<FetchRequest> {
        let mut request = self.filters.request(&self.app_id, self.store, self.limit)?;
        request.sort = self.sort;
        request.continuation_token = self.page_token;
        request.deadline = self.timeout_secs.map(Duration::from_secs);
        Ok(request)
    }
}

#[must_use]
pub fn list_tools() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: SEARCH_REVIEWS,
        description: "Fetch, normalize and filter user reviews for an app on Google Play \
                      (store \"android\") or the App Store (store \"ios\"). Returns the \
                      reviews plus a next_page_token when more are available.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "app_id": {
                    "type": "string",
                    "description": "Package name for android (com.example.app); numeric id or bundle id for ios"
                },
                "store": { "type": "string", "enum": ["android", "ios"] },
                "limit": { "type": "integer", "minimum": 1, "default": DEFAULT_LIMIT },
                "rating": { "type": "integer", "minimum": 1, "maximum": 5, "description": "Exact star rating" },
                "min_rating": { "type": "integer", "minimum": 1, "maximum": 5 },
                "max_rating": { "type": "integer", "minimum": 1, "maximum": 5 },
                "language": { "type": "string", "description": "Two-letter language code" },
                "country": { "type": "string", "description": "Two-letter country code" },
                "date_from": { "type": "string", "description": "YYYY-MM-DD, inclusive" },
                "date_to": { "type": "string", "description": "YYYY-MM-DD, whole day inclusive" },
                "has_dev_response": { "type": "boolean" },
                "no_dev_response": { "type": "boolean" },
                "sort": { "type": "string", "enum": ["newest", "most_helpful"], "default": "newest" },
                "page_token": { "type": "string", "description": "next_page_token from a previous call" },
                "timeout_secs": { "type": "integer", "minimum": 1 }
            },
            "required": ["app_id", "store"]
        }),
    }]
}

/// Runs a tool call. Bad arguments are protocol errors; fetch failures come
/// back as an error result so the client can show them.
///
/// # Errors
///
/// Returns [`McpError::InvalidParams`] for an unknown tool or arguments that
/// do not decode.
pub async fn call(
    fetcher: &ReviewFetcher,
    params: ToolCallParams,
    cancel: &CancellationToken,
) -> McpResult<ToolCallResult> {
    if params.name != SEARCH_REVIEWS {
        return Err(McpError::InvalidParams(format!("unknown tool: {}", params.name)));
    }

    let args: SearchReviewsArgs = serde_json::from_value(params.arguments)
        .map_err(|e| McpError::InvalidParams(e.to_string()))?;
    let request = args
        .into_request()
        .map_err(|e| McpError::InvalidParams(format!("{e:#}")))?;

    tracing::info!(app_id = %request.app_id, store = %request.store, limit = request.limit, "search_reviews");
    Ok(match fetcher.fetch(request, cancel).await {
        Ok(result) => ToolCallResult::json(&result),
        Err(err) => {
            tracing::warn!(error = %err, "search_reviews failed");
            ToolCallResult::error(err.to_string())
        }
    })
}
