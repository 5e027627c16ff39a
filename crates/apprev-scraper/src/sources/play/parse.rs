//! Request builders and response parsers for the Play `batchexecute`
//! endpoint. Everything here is pure so it can be tested on fixtures.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::ScraperError;
use crate::normalize::decode_entities;
use crate::sources::{RawPage, RawRating, RawReply, RawReview, RawTimestamp, ReviewSort};

/// RPC returning one page of reviews.
pub(crate) const REVIEWS_RPC: &str = "UsvDTd";
/// RPC returning a single review in full.
pub(crate) const EXPAND_RPC: &str = "oCPfdb";

/// Marker Play appends to review bodies it shortened in the listing.
const TRUNCATION_MARKER: char = '…';
const XSSI_PREFIX: &str = ")]}'";
const TITLE_SUFFIXES: [&str; 2] = [" - Apps on Google Play", " – Apps on Google Play"];

static OG_TITLE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\b[^>]*property\s*=\s*["']og:title["'][^>]*>"#).expect("valid og:title regex")
});
static CONTENT_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bcontent\s*=\s*"([^"]*)"|\bcontent\s*=\s*'([^']*)'"#).expect("valid content regex")
});

fn sort_code(sort: ReviewSort) -> u8 {
    match sort {
        ReviewSort::MostHelpful => 1,
        ReviewSort::Newest => 2,
    }
}

/// Inner payload for [`REVIEWS_RPC`].
pub(crate) fn reviews_request(
    app_id: &str,
    sort: ReviewSort,
    count: usize,
    token: Option<&str>,
) -> String {
    json!([
        null,
        null,
        [2, sort_code(sort), [count, null, token], null, []],
        [app_id, 7]
    ])
    .to_string()
}

/// Inner payload for [`EXPAND_RPC`].
pub(crate) fn expand_request(app_id: &str, review_id: &str) -> String {
    json!([null, null, [app_id, 7], review_id]).to_string()
}

/// Wraps an inner payload into the `f.req` form value.
pub(crate) fn envelope(rpc: &str, inner: &str) -> String {
    json!([[[rpc, inner, null, "generic"]]]).to_string()
}

/// Locates the `wrb.fr` frame for `rpc` and parses the JSON string it carries.
///
/// Returns `Value::Null` when the frame is present but empty, which Play
/// sends for apps without reviews.
///
/// # Errors
///
/// - [`ScraperError::MalformedPayload`] if no parsable frame for `rpc` exists
///   (truncated or unexpected response).
/// - [`ScraperError::Deserialize`] if the frame's payload is not JSON.
pub(crate) fn extract_rpc_payload(body: &str, rpc: &str) -> Result<Value, ScraperError> {
    let stripped = body.trim_start().strip_prefix(XSSI_PREFIX).unwrap_or(body);

    let frames = std::iter::once(stripped)
        .chain(stripped.lines())
        .filter_map(|chunk| serde_json::from_str::<Value>(chunk.trim()).ok());

    for candidate in frames {
        let Some(entries) = candidate.as_array() else {
            continue;
        };
        let Some(frame) = entries.iter().find(|entry| {
            entry.get(0).and_then(Value::as_str) == Some("wrb.fr")
                && entry.get(1).and_then(Value::as_str) == Some(rpc)
        }) else {
            continue;
        };

        return match frame.get(2) {
            Some(Value::String(payload)) => {
                serde_json::from_str(payload).map_err(|source| ScraperError::Deserialize {
                    context: format!("play {rpc} payload"),
                    source,
                })
            }
            _ => Ok(Value::Null),
        };
    }

    Err(ScraperError::MalformedPayload {
        context: format!("play {rpc} response"),
        reason: "no wrb.fr frame found".to_owned(),
    })
}

/// Splits a [`REVIEWS_RPC`] payload into records and the next-page cursor.
pub(crate) fn parse_reviews_payload(payload: &Value) -> RawPage {
    let records = payload
        .get(0)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(parse_record).collect())
        .unwrap_or_default();

    let next_token = payload
        .pointer("/1/1")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_owned);

    RawPage {
        records,
        next_token,
    }
}

/// Extracts the single review record from an [`EXPAND_RPC`] payload.
pub(crate) fn parse_expand_payload(payload: &Value) -> Option<RawReview> {
    payload
        .get(0)
        .filter(|record| record.is_array())
        .map(parse_record)
}

fn string_at(record: &Value, pointer: &str) -> Option<String> {
    record
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
}

pub(crate) fn parse_record(record: &Value) -> RawReview {
    let reply_text = string_at(record, "/7/1");
    let reply = reply_text.map(|text| RawReply {
        text: Some(text),
        replied_at: record
            .pointer("/7/2/0")
            .and_then(Value::as_i64)
            .map(RawTimestamp::Epoch),
    });

    RawReview {
        id: string_at(record, "/0"),
        author: string_at(record, "/1/0"),
        rating: record.pointer("/2").and_then(Value::as_f64).map(RawRating::Number),
        title: None,
        body: string_at(record, "/4"),
        posted_at: record
            .pointer("/5/0")
            .and_then(Value::as_i64)
            .map(RawTimestamp::Epoch),
        helpful_count: record.pointer("/6").and_then(Value::as_i64),
        language: None,
        country: None,
        app_version: string_at(record, "/10"),
        reply,
    }
}

pub(crate) fn is_truncated(body: &str) -> bool {
    body.trim_end().ends_with(TRUNCATION_MARKER)
}

/// Display name from a details page's `og:title` meta tag.
pub(crate) fn extract_app_name(html: &str) -> Option<String> {
    let tag = OG_TITLE_TAG_RE.find(html)?.as_str();
    let caps = CONTENT_ATTR_RE.captures(tag)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();

    let mut name = decode_entities(raw.trim());
    for suffix in TITLE_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_owned();
            break;
        }
    }
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_owned())
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
