//! Tests for the fl.ru source against a mock site.

use std::path::PathBuf;

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::NaiveDate;
use chrono::TimeZone;
use freelance_feed::source::ListingRecord;
use freelance_feed::source::ListingSource;
use freelance_feed::source::error::SourceError;
use freelance_feed::source::fl_source::FlSource;
use freelance_feed::source::parser::TimeZones;
use futures::StreamExt;
use futures::TryStreamExt;
use httpmock::Method::GET;
use httpmock::Mock;
use httpmock::MockServer;

/// Loads a test response file from the responses directory.
fn get_response(filename: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/responses");
    path.push(filename);
    std::fs::read_to_string(path).expect("Failed to read response file")
}

fn zones() -> TimeZones {
    TimeZones {
        source: FixedOffset::east_opt(3 * 3600).unwrap(),
        listing: FixedOffset::east_opt(5 * 3600).unwrap(),
    }
}

fn site_time(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    zones()
        .source
        .with_ymd_and_hms(2026, 10, 17, hour, minute, 0)
        .unwrap()
}

fn source(server: &MockServer, max_pages: u32) -> FlSource {
    FlSource::new(&server.url("/"), max_pages, 100, zones()).expect("Failed to create source")
}

async fn mock_page<'a>(server: &'a MockServer, page: u32, filename: &str) -> Mock<'a> {
    let body = get_response(filename);
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/projects")
                .query_param("kind", "1")
                .query_param("page", page.to_string());
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body(body);
        })
        .await
}

async fn mock_detail<'a>(server: &'a MockServer, path: &str, filename: &str) -> Mock<'a> {
    let body = get_response(filename);
    server
        .mock_async(|when, then| {
            when.method(GET).path(path.to_string());
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body(body);
        })
        .await
}

/// Page one with its three details, page two with its two new details and an
/// empty page three.
async fn mock_site(server: &MockServer) -> Vec<Mock<'_>> {
    vec![
        mock_page(server, 1, "fl_projects_page_1.html").await,
        mock_page(server, 2, "fl_projects_page_2.html").await,
        mock_page(server, 3, "fl_projects_page_empty.html").await,
        mock_detail(server, "/projects/5100003/landing.html", "fl_project_5100003.html").await,
        mock_detail(server, "/projects/5100002/logo.html", "fl_project_5100002.html").await,
        mock_detail(server, "/projects/5100001/parser.html", "fl_project_5100001.html").await,
        mock_detail(server, "/projects/5100000/broken.html", "fl_project_broken.html").await,
        mock_detail(server, "/projects/5099999/texts.html", "fl_project_5099999.html").await,
    ]
}

fn articles(records: &[ListingRecord]) -> Vec<i64> {
    records.iter().map(|r| r.article).collect()
}

#[tokio::test]
async fn test_listings_up_to_parses_details() {
    let server = MockServer::start_async().await;
    let mocks = mock_site(&server).await;
    let source = source(&server, 5);

    let records: Vec<ListingRecord> = source.listings_up_to(2).try_collect().await.unwrap();
    assert_eq!(articles(&records), vec![5100003, 5100002]);

    let landing = &records[0];
    assert_eq!(landing.title, "Лендинг для кофейни");
    assert_eq!(
        landing.description,
        "Нужен одностраничный сайт для кофейни с меню и формой брони."
    );
    assert_eq!(landing.budget, Some(15000));
    assert_eq!(landing.deadline, NaiveDate::from_ymd_opt(2026, 10, 25));
    assert!(landing.safe_deal);
    assert!(landing.without_executor);
    assert_eq!(landing.published, site_time(12, 30));
    assert_eq!(landing.published.offset().local_minus_utc(), 5 * 3600);
    assert_eq!(landing.url, server.url("/projects/5100003/landing.html"));
    assert_eq!(
        landing.categories,
        vec![
            ("Сайты".to_string(), "Лендинги".to_string()),
            ("Сайты".to_string(), "Верстка".to_string()),
        ]
    );

    let logo = &records[1];
    assert_eq!(logo.budget, Some(3000));
    assert_eq!(logo.deadline, None);
    assert!(!logo.safe_deal);
    assert!(!logo.without_executor);

    // Only as much of the site as needed is fetched.
    mocks[0].assert_hits_async(1).await;
    mocks[1].assert_hits_async(0).await;
    mocks[5].assert_hits_async(0).await;
}

#[tokio::test]
async fn test_listings_since_stops_at_older_listing() {
    let server = MockServer::start_async().await;
    let mocks = mock_site(&server).await;
    let source = source(&server, 5);

    let since = site_time(12, 15).with_timezone(&zones().listing);
    let records: Vec<ListingRecord> = source.listings_since(since).try_collect().await.unwrap();
    assert_eq!(articles(&records), vec![5100003, 5100002]);

    // The first older listing ends the walk.
    mocks[5].assert_hits_async(1).await;
    mocks[1].assert_hits_async(0).await;
}

#[tokio::test]
async fn test_full_walk_skips_pinned_duplicate_and_broken_listings() {
    let server = MockServer::start_async().await;
    let mocks = mock_site(&server).await;
    let source = source(&server, 5);

    let records: Vec<ListingRecord> = source.listings_up_to(100).try_collect().await.unwrap();
    assert_eq!(articles(&records), vec![5100003, 5100002, 5100001, 5099999]);

    let parser = &records[2];
    assert_eq!(parser.budget, None);
    assert_eq!(
        parser.categories,
        vec![("Программирование".to_string(), "Парсинг данных".to_string())]
    );

    // Bumped listings carry the bump time.
    assert_eq!(records[3].published, site_time(11, 50));

    mocks[2].assert_hits_async(1).await;
    mocks[4].assert_hits_async(1).await;
    mocks[5].assert_hits_async(1).await;
}

#[tokio::test]
async fn test_page_cap_ends_walk() {
    let server = MockServer::start_async().await;
    let mocks = mock_site(&server).await;
    let source = source(&server, 1);

    let records: Vec<ListingRecord> = source.listings_up_to(100).try_collect().await.unwrap();
    assert_eq!(articles(&records), vec![5100003, 5100002, 5100001]);
    mocks[1].assert_hits_async(0).await;
}

#[tokio::test]
async fn test_page_failure_ends_stream_with_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/projects");
            then.status(500);
        })
        .await;
    let source = source(&server, 5);

    let mut stream = source.listings_up_to(10);
    let first = stream.next().await.expect("Expected an item");
    assert!(matches!(first, Err(SourceError::HttpStatus { status: 500, .. })));
}

#[tokio::test]
async fn test_removed_listing_is_skipped() {
    let server = MockServer::start_async().await;
    mock_page(&server, 1, "fl_projects_page_1.html").await;
    mock_detail(&server, "/projects/5100003/landing.html", "fl_project_5100003.html").await;
    mock_detail(&server, "/projects/5100001/parser.html", "fl_project_5100001.html").await;
    let removed = server
        .mock_async(|when, then| {
            when.method(GET).path("/projects/5100002/logo.html");
            then.status(404);
        })
        .await;
    let source = source(&server, 5);

    let records: Vec<ListingRecord> = source.listings_up_to(2).try_collect().await.unwrap();
    assert_eq!(articles(&records), vec![5100003, 5100001]);
    removed.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_detail_failure_is_not_skipped() {
    let server = MockServer::start_async().await;
    mock_page(&server, 1, "fl_projects_page_1.html").await;
    mock_detail(&server, "/projects/5100003/landing.html", "fl_project_5100003.html").await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/projects/5100002/logo.html");
            then.status(502);
        })
        .await;
    let source = source(&server, 5);

    let results: Vec<Result<ListingRecord, SourceError>> = source.listings_up_to(10).collect().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().article, 5100003);
    assert!(matches!(results[1], Err(SourceError::HttpStatus { status: 502, .. })));
}
