//! Parser for the App Store customer-reviews Atom feed.

use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::error::ScraperError;
use crate::sources::{RawRating, RawReview, RawTimestamp};

static PAGE_IN_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"page=(\d+)").expect("valid page regex"));

/// Review entries of one feed page plus the feed's last page number.
#[derive(Debug, Default)]
pub(crate) struct FeedPage {
    pub records: Vec<RawReview>,
    /// Page number of the `rel="last"` link, if the feed declared one.
    pub last_page: Option<u32>,
}

#[derive(Default)]
struct EntryBuilder {
    id: String,
    title: String,
    text_content: String,
    html_content: String,
    rating: String,
    version: String,
    vote_sum: String,
    author: String,
    updated: String,
    is_app_metadata: bool,
}

impl EntryBuilder {
    fn into_raw(self, country: &str) -> RawReview {
        let non_empty = |s: String| {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        };

        let body = non_empty(self.text_content).or_else(|| non_empty(strip_html(&self.html_content)));

        RawReview {
            id: non_empty(self.id),
            author: non_empty(self.author),
            rating: non_empty(self.rating).map(RawRating::Text),
            title: non_empty(self.title),
            body,
            posted_at: non_empty(self.updated).map(RawTimestamp::Text),
            helpful_count: self.vote_sum.trim().parse::<i64>().ok(),
            language: None,
            country: Some(country.to_ascii_uppercase()),
            app_version: non_empty(self.version),
            reply: None,
        }
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(std::borrow::Cow::into_owned))
}

fn last_page_from_link(e: &BytesStart<'_>) -> Option<u32> {
    if attribute(e, b"rel").as_deref() != Some("last") {
        return None;
    }
    let href = attribute(e, b"href")?;
    PAGE_IN_URL_RE
        .captures(&href)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn malformed(reason: impl Into<String>) -> ScraperError {
    ScraperError::MalformedPayload {
        context: "app store review feed".to_owned(),
        reason: reason.into(),
    }
}

/// Parses one feed page. `country` is the storefront the page was requested
/// from and is stamped on every record.
///
/// # Errors
///
/// Returns [`ScraperError::MalformedPayload`] if the document is not a feed
/// or ends before its elements are closed.
pub(crate) fn parse_feed(xml: &str, country: &str) -> Result<FeedPage, ScraperError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = FeedPage::default();
    let mut stack: Vec<String> = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut content_type = String::new();
    let mut saw_feed = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    "feed" => saw_feed = true,
                    "entry" => entry = Some(EntryBuilder::default()),
                    "content" => content_type = attribute(&e, b"type").unwrap_or_default(),
                    "im:name" => {
                        if let Some(current) = entry.as_mut() {
                            current.is_app_metadata = true;
                        }
                    }
                    "link" if entry.is_none() => {
                        if let Some(last) = last_page_from_link(&e) {
                            page.last_page = Some(last);
                        }
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                if name.as_ref() == b"link" && entry.is_none() {
                    if let Some(last) = last_page_from_link(&e) {
                        page.last_page = Some(last);
                    }
                }
            }
            Ok(Event::End(e)) => {
                stack.pop();
                if e.name().as_ref() == b"entry" {
                    if let Some(done) = entry.take() {
                        if !done.is_app_metadata {
                            page.records.push(done.into_raw(country));
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default();
                append_entry_text(entry.as_mut(), &stack, &content_type, &text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                append_entry_text(entry.as_mut(), &stack, &content_type, &text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e.to_string())),
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed(format!("document ended inside <{}>", stack.join("/"))));
    }
    if !saw_feed {
        return Err(malformed("no <feed> root element"));
    }

    Ok(page)
}

fn append_entry_text(
    entry: Option<&mut EntryBuilder>,
    stack: &[String],
    content_type: &str,
    text: &str,
) {
    let Some(entry) = entry else {
        return;
    };
    let Some(tag) = stack.last() else {
        return;
    };
    let parent = stack.len().checked_sub(2).and_then(|i| stack.get(i));

    let target = match (tag.as_str(), parent.map(String::as_str)) {
        ("id", Some("entry")) => &mut entry.id,
        ("title", Some("entry")) => &mut entry.title,
        ("updated", Some("entry")) => &mut entry.updated,
        ("content", Some("entry")) if content_type == "html" => &mut entry.html_content,
        ("content", Some("entry")) => &mut entry.text_content,
        ("im:rating", _) => &mut entry.rating,
        ("im:version", _) => &mut entry.version,
        ("im:voteSum", _) => &mut entry.vote_sum,
        ("name", Some("author")) => &mut entry.author,
        _ => return,
    };
    target.push_str(text);
}

/// Removes markup tags and collapses whitespace.
pub(crate) fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
