//! Maps source-specific [`RawReview`]s onto the common [`Review`] schema.

use apprev_core::{DeveloperResponse, Review, Store};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::sources::{RawRating, RawReview, RawTimestamp};

const ANONYMOUS: &str = "Anonymous";
const SYNTHESIZED_ID_HEX_LEN: usize = 16;

/// Epoch values above this are taken to be milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%B %d, %Y", "%d/%m/%Y", "%m/%d/%Y"];

/// Where a raw record sat in the source listing. Feeds the synthesized id
/// when the source provides none.
///
/// The page is named by the source token that fetched it (`None` for the
/// first page), so a resumed fetch places a record where a fresh walk would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOrigin<'a> {
    pub store: Store,
    pub page_token: Option<&'a str>,
    pub index: usize,
}

/// Why a raw record was skipped instead of normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("record has no rating")]
    MissingRating,
    #[error("rating {0} is outside 1..=5")]
    RatingOutOfRange(String),
    #[error("record has neither a usable rating nor any text")]
    Unparseable,
}

/// Normalizes one raw record.
///
/// # Errors
///
/// Returns the [`DropReason`] when the record cannot carry a valid rating.
pub fn normalize_review(raw: RawReview, origin: &RecordOrigin<'_>) -> Result<Review, DropReason> {
    let title = raw.title.as_deref().and_then(clean_text);
    let text = raw.body.as_deref().and_then(clean_text);

    let rating = match raw.rating.as_ref() {
        Some(rating) => parse_rating(rating)?,
        None if title.is_none() && text.is_none() => return Err(DropReason::Unparseable),
        None => return Err(DropReason::MissingRating),
    };

    let user_name = raw
        .author
        .as_deref()
        .and_then(clean_text)
        .unwrap_or_else(|| ANONYMOUS.to_owned());
    let date = raw.posted_at.as_ref().and_then(parse_timestamp);

    let id = match raw.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => synthesize_id(origin, &user_name, title.as_deref(), text.as_deref(), date),
    };

    let developer_response = raw.reply.and_then(|reply| {
        let text = reply.text.as_deref().and_then(clean_text)?;
        Some(DeveloperResponse {
            text,
            date: reply.replied_at.as_ref().and_then(parse_timestamp),
        })
    });

    Ok(Review {
        id,
        user_name,
        rating,
        title,
        text,
        date,
        helpful_count: raw.helpful_count.and_then(|n| u64::try_from(n).ok()),
        language: locale_code(raw.language.as_deref()).map(|c| c.to_ascii_lowercase()),
        country: locale_code(raw.country.as_deref()).map(|c| c.to_ascii_uppercase()),
        version: raw.app_version.as_deref().and_then(clean_text),
        developer_response,
    })
}

/// Normalizes the records of one page starting at raw index `start`.
///
/// Lazy: records are normalized as the iterator is consumed, so a caller
/// that stops early never touches the rest of the page. Each item carries
/// the record's raw index within the page. Dropped records are logged here
/// and yielded as `Err` for the caller to count.
pub fn normalize_page<'a>(
    records: Vec<RawReview>,
    store: Store,
    page_token: Option<&'a str>,
    start: usize,
) -> impl Iterator<Item = (usize, Result<Review, DropReason>)> + 'a {
    records
        .into_iter()
        .enumerate()
        .skip(start)
        .map(move |(index, raw)| {
            let origin = RecordOrigin {
                store,
                page_token,
                index,
            };
            let outcome = normalize_review(raw, &origin);
            if let Err(reason) = &outcome {
                tracing::debug!(%store, ?page_token, index, %reason, "dropped review record");
            }
            (index, outcome)
        })
}

fn parse_rating(rating: &RawRating) -> Result<u8, DropReason> {
    let value = match rating {
        RawRating::Number(n) => *n,
        RawRating::Text(s) => s.trim().parse::<f64>().map_err(|_| DropReason::Unparseable)?,
    };
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(DropReason::Unparseable);
    }
    if !(1.0..=5.0).contains(&value) {
        return Err(DropReason::RatingOutOfRange(value.to_string()));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(value as u8)
}

fn locale_code(code: Option<&str>) -> Option<&str> {
    code.map(str::trim).filter(|c| !c.is_empty())
}

/// Parses a source timestamp into UTC. Returns `None` for anything
/// unrecognized rather than guessing.
pub fn parse_timestamp(ts: &RawTimestamp) -> Option<DateTime<Utc>> {
    match ts {
        RawTimestamp::Epoch(secs) => from_epoch(*secs),
        RawTimestamp::Text(text) => parse_date_text(text),
    }
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse::<i64>().ok().and_then(from_epoch);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    None
}

/// Collapses whitespace and decodes stray HTML entities. Blank input yields `None`.
pub(crate) fn clean_text(text: &str) -> Option<String> {
    let decoded = decode_entities(text);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Single-pass decoding of named and numeric HTML entities. Unknown
/// entities are left as-is.
pub(crate) fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|ch| (ch, semi)));

        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn synthesize_id(
    origin: &RecordOrigin<'_>,
    author: &str,
    title: Option<&str>,
    body: Option<&str>,
    date: Option<DateTime<Utc>>,
) -> String {
    let date = date.map(|d| d.to_rfc3339()).unwrap_or_default();
    let material = format!(
        "{author}\u{1f}{}\u{1f}{}\u{1f}{date}\u{1f}{}\u{1f}{}",
        title.unwrap_or_default(),
        body.unwrap_or_default(),
        origin.page_token.unwrap_or_default(),
        origin.index,
    );
    let digest = format!("{:x}", Sha256::digest(material.as_bytes()));
    format!("{}_{}", origin.store, &digest[..SYNTHESIZED_ID_HEX_LEN])
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
