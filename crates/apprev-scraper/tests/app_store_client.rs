//! Integration tests for the App Store adapter driven through
//! `ReviewFetcher`, with `wiremock` serving both the iTunes lookup API and
//! the customer-reviews feed.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use apprev_core::{FilterSpec, Store};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{any, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use apprev_scraper::{
    AppStoreAdapter, FetchError, FetchRequest, RateLimiter, ReviewFetcher, ReviewSort,
    SourcePolicy,
};

const TRACK_ID: &str = "284882215";

fn fetcher(server: &MockServer) -> ReviewFetcher {
    let policy = SourcePolicy {
        min_interval: Duration::ZERO,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        max_attempts: 3,
        jitter: false,
    };
    let adapter = AppStoreAdapter::new(server.uri(), Duration::from_secs(5), "apprev-test/0.1")
        .expect("failed to build test AppStoreAdapter");
    ReviewFetcher::new(Arc::new(RateLimiter::new().with_policy(Store::Ios, policy)))
        .with_adapter(Arc::new(adapter))
}

/// A feed page with one review per `(id, rating)` pair, preceded by the
/// app-metadata entry the real feed always leads with.
fn feed(reviews: &[(&str, u8)], last_page: u32) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns:im="http://itunes.apple.com/rss" xmlns="http://www.w3.org/2005/Atom">
  <link rel="last" href="https://itunes.apple.com/us/rss/customerreviews/page={last_page}/id={TRACK_ID}/sortby=mostrecent/xml"/>
  <entry><id>https://apps.apple.com/app/id{TRACK_ID}</id><im:name>Example Chat</im:name></entry>
"#
    );
    for (id, rating) in reviews {
        let _ = write!(
            xml,
            r#"  <entry>
    <updated>2024-03-01T10:22:05-07:00</updated>
    <id>{id}</id>
    <title>Review {id}</title>
    <content type="text">Body of {id}</content>
    <im:rating>{rating}</im:rating>
    <im:version>2.14.0</im:version>
    <author><name>user_{id}</name></author>
  </entry>
"#
        );
    }
    xml.push_str("</feed>");
    xml
}

fn feed_path(country: &str, page: u32, sort: &str) -> String {
    format!("/{country}/rss/customerreviews/page={page}/id={TRACK_ID}/sortby={sort}/xml")
}

async fn mount_lookup_by_id(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .and(query_param("id", TRACK_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resultCount": 1,
            "results": [{"trackId": 284_882_215, "trackName": "Example Chat", "userRatingCount": 18_234}]
        })))
        .mount(server)
        .await;
}

async fn mount_feed(server: &MockServer, country: &str, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path(feed_path(country, page, "mostrecent")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn numeric_id_fetch_reports_name_and_total() {
    let server = MockServer::start().await;
    mount_lookup_by_id(&server).await;
    mount_feed(&server, "us", 1, feed(&[("101", 5), ("102", 3)], 1)).await;

    let result = fetcher(&server)
        .fetch(FetchRequest::new(TRACK_ID, Store::Ios, 10), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.app_name.as_deref(), Some("Example Chat"));
    assert_eq!(result.total_reviews, Some(18_234));
    assert_eq!(result.reviews_fetched, 2);
    assert_eq!(result.reviews[0].id, "101");
    assert_eq!(result.reviews[0].country.as_deref(), Some("US"));
    assert!(result.next_page_token.is_none());
}

#[tokio::test]
async fn bundle_id_resolves_to_track_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .and(query_param("bundleId", "com.example.chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resultCount": 1,
            "results": [{"trackId": 284_882_215, "trackName": "Example Chat", "bundleId": "com.example.chat"}]
        })))
        .mount(&server)
        .await;
    mount_feed(&server, "us", 1, feed(&[("201", 4)], 1)).await;

    let result = fetcher(&server)
        .fetch(
            FetchRequest::new("com.example.chat", Store::Ios, 10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.app_id, TRACK_ID);
    assert_eq!(result.reviews_fetched, 1);
}

#[tokio::test]
async fn unknown_bundle_id_is_app_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resultCount": 0, "results": []})))
        .mount(&server)
        .await;

    let err = fetcher(&server)
        .fetch(
            FetchRequest::new("com.nobody.app", Store::Ios, 10),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::AppNotFound { store: Store::Ios, .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// paging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn page_ten_is_the_end_even_with_more_reviews() {
    let server = MockServer::start().await;
    mount_lookup_by_id(&server).await;
    // The feed claims further pages, but it never serves past page 10.
    mount_feed(&server, "us", 10, feed(&[("901", 5), ("902", 4)], 12)).await;

    let mut request = FetchRequest::new(TRACK_ID, Store::Ios, 50);
    request.continuation_token = Some("10".to_owned());

    let result = fetcher(&server)
        .fetch(request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.reviews_fetched, 2);
    assert!(result.next_page_token.is_none());
}

#[tokio::test]
async fn walks_pages_until_limit_then_issues_page_token() {
    let server = MockServer::start().await;
    mount_lookup_by_id(&server).await;
    mount_feed(&server, "us", 1, feed(&[("1", 5), ("2", 1)], 5)).await;
    mount_feed(&server, "us", 2, feed(&[("3", 5), ("4", 5)], 5)).await;

    let mut request = FetchRequest::new(TRACK_ID, Store::Ios, 3);
    request.filters = FilterSpec {
        min_rating: Some(4),
        ..FilterSpec::default()
    };

    let result = fetcher(&server)
        .fetch(request, &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<&str> = result.reviews.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3", "4"]);
    assert!(result.reviews.iter().all(|r| r.rating >= 4));
    assert_eq!(result.next_page_token.as_deref(), Some("3"));
    assert_eq!(result.diagnostics.pages_fetched, 2);
    assert_eq!(result.diagnostics.filtered_out, 1);
}

#[tokio::test]
async fn storefront_and_sort_shape_the_feed_url() {
    let server = MockServer::start().await;
    mount_lookup_by_id(&server).await;
    Mock::given(method("GET"))
        .and(path(feed_path("gb", 1, "mosthelpful")))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[("301", 2)], 1)))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = FetchRequest::new(TRACK_ID, Store::Ios, 5);
    request.country = Some("GB".to_owned());
    request.sort = ReviewSort::MostHelpful;

    let result = fetcher(&server)
        .fetch(request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.reviews[0].country.as_deref(), Some("GB"));
}

#[tokio::test]
async fn out_of_range_page_token_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut request = FetchRequest::new(TRACK_ID, Store::Ios, 5);
    request.continuation_token = Some("11".to_owned());

    let err = fetcher(&server)
        .fetch(request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::InvalidContinuationToken { .. }), "got {err:?}");
}

#[tokio::test]
async fn truncated_feed_is_retried() {
    let server = MockServer::start().await;
    mount_lookup_by_id(&server).await;
    Mock::given(method("GET"))
        .and(path(feed_path("us", 1, "mostrecent")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<feed><entry><id>1</id>"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_feed(&server, "us", 1, feed(&[("401", 3)], 1)).await;

    let result = fetcher(&server)
        .fetch(FetchRequest::new(TRACK_ID, Store::Ios, 5), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.reviews_fetched, 1);
}
