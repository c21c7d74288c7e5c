//! Integration tests for the harvester
//!
//! These tests use wiremock to serve listing and detail pages and run the
//! full harvest cycle end-to-end: HTTP source, CSS extraction, JSON
//! checkpoint and record sink.

use paged_harvest::checkpoint::{CheckpointStore, JsonFileStore};
use paged_harvest::config::{parse_config, Config};
use paged_harvest::crawler::{
    build_controller, AnomalyHandler, AnomalyPolicy, ChannelListener, CrawlEvent,
};
use paged_harvest::output::{read_records, SqliteSink};
use paged_harvest::{ControllerState, ExecutionMode, HarvestError};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for a listing served by `base_url`
fn create_test_config(base_url: &str, dir: &Path, sink: &str, records: &str) -> Config {
    let toml = format!(
        r##"
[job]
target = "{base}/list"
max-pages = 2
delay-ms = 0
mode = "headless"

[http]
user-agent = "paged-harvest-tests/1.0"
timeout-secs = 5

[output]
state-dir = '{state}'
records-path = '{records}'
sink = "{sink}"

[selectors]
data-source = "Example"
row = "tr.result-row"
skip-classes = ["promo"]
key-attr = "data-id"
detail-link = "td.title a"
next-page = "a.next"

[[selectors.list-fields]]
name = "title"
selector = "td.title a"

[[selectors.detail-fields]]
name = "headline"
selector = "h1"

[selectors.detail-pairs]
item = "ul.info li"
label = "strong"
value = "span"
"##,
        base = base_url,
        state = dir.join("state").display(),
        records = dir.join(records).display(),
        sink = sink,
    );

    parse_config(&toml).expect("test config should be valid")
}

/// Uses a fixed anomaly policy whatever the job's mode
fn policy(choice: AnomalyPolicy) -> impl FnOnce(ExecutionMode) -> Box<dyn AnomalyHandler> {
    move |_| -> Box<dyn AnomalyHandler> { Box::new(choice) }
}

fn listing_page(keys: &[&str], next: Option<&str>) -> String {
    let rows: String = keys
        .iter()
        .map(|key| {
            format!(
                r#"<tr class="result-row" data-id="{key}"><td class="title"><a href="/item/{key}">Item {key}</a></td></tr>"#
            )
        })
        .collect();
    let next = next
        .map(|href| format!(r#"<a class="next" href="{}">Next</a>"#, href))
        .unwrap_or_default();

    format!(
        r#"<html><body><table><tbody>{rows}<tr class="result-row promo" data-id="ad"><td class="title"><a href="/ad">Ad</a></td></tr></tbody></table>{next}</body></html>"#
    )
}

fn detail_page(key: &str) -> String {
    format!(
        r#"<html><body><h1>Item {key}</h1><ul class="info"><li><strong>Rooms:</strong><span>{key}+1</span></li></ul></body></html>"#
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

/// Serves listing pages [A, B, C] and [D, E] with their detail pages
async fn mount_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(html(listing_page(&["A", "B", "C"], Some("/list/2"))))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list/2"))
        .respond_with(html(listing_page(&["D", "E"], None)))
        .mount(server)
        .await;

    for key in ["A", "B", "C", "D", "E"] {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}", key)))
            .respond_with(html(detail_page(key)))
            .mount(server)
            .await;
    }
}

fn record_keys(records_path: &Path) -> Vec<String> {
    read_records(records_path)
        .expect("records file should be readable")
        .into_iter()
        .map(|r| r.key)
        .collect()
}

#[tokio::test]
async fn test_full_harvest_two_pages() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), "jsonl", "records.jsonl");

    let mut controller =
        build_controller(&config, false, policy(AnomalyPolicy::Retry)).unwrap();
    let report = controller.run().await.unwrap();

    assert_eq!(report.outcome, ControllerState::Completed);
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.processed, 5);

    let records = read_records(&dir.path().join("records.jsonl")).unwrap();
    let keys: Vec<_> = records.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["A", "B", "C", "D", "E"]);

    let first = &records[0];
    assert_eq!(first.data_source, "Example");
    assert_eq!(first.page, 1);
    assert_eq!(first.listing["title"], "Item A");
    assert_eq!(first.detail["headline"], "Item A");
    assert_eq!(first.detail["Rooms"], "A+1");
    assert_eq!(records[4].page, 2);

    let saved = JsonFileStore::new(config.checkpoint_path())
        .load()
        .unwrap()
        .unwrap();
    assert!(saved.completed);
    assert_eq!(saved.total_processed, 5);
    assert_eq!(saved.page_cursor, 3);
}

#[tokio::test]
async fn test_resume_after_interruption() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), "jsonl", "records.jsonl");

    // A previous run recorded A and then died
    let mut store = JsonFileStore::new(config.checkpoint_path());
    let mut state = store
        .initialize(&config.job.target, config.job.job_config())
        .unwrap();
    store.record_processed(&mut state, "A").unwrap();

    Mock::given(method("GET"))
        .and(path("/item/A"))
        .respond_with(html(detail_page("A")))
        .expect(0)
        .mount(&server)
        .await;
    mount_listing(&server).await;

    let mut controller =
        build_controller(&config, false, policy(AnomalyPolicy::Retry)).unwrap();
    let report = controller.run().await.unwrap();

    assert_eq!(report.outcome, ControllerState::Completed);
    assert_eq!(report.total_processed, 5);
    assert_eq!(
        record_keys(&dir.path().join("records.jsonl")),
        vec!["B", "C", "D", "E"]
    );

    let saved = JsonFileStore::new(config.checkpoint_path())
        .load()
        .unwrap()
        .unwrap();
    assert!(saved.completed);
    assert_eq!(saved.total_processed, 5);
    assert_eq!(saved.page_cursor, 3);
}

#[tokio::test]
async fn test_resume_walks_to_second_page() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), "jsonl", "records.jsonl");

    let mut store = JsonFileStore::new(config.checkpoint_path());
    let mut state = store
        .initialize(&config.job.target, config.job.job_config())
        .unwrap();
    for key in ["A", "B", "C"] {
        store.record_processed(&mut state, key).unwrap();
    }
    store.advance_page(&mut state, 2).unwrap();

    let mut controller =
        build_controller(&config, false, policy(AnomalyPolicy::Retry)).unwrap();
    controller.run().await.unwrap();

    assert_eq!(record_keys(&dir.path().join("records.jsonl")), vec!["D", "E"]);
}

#[tokio::test]
async fn test_completed_job_is_left_alone() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), "jsonl", "records.jsonl");

    build_controller(&config, false, policy(AnomalyPolicy::Retry))
        .unwrap()
        .run()
        .await
        .unwrap();
    let requests = server.received_requests().await.unwrap().len();

    let report = build_controller(&config, false, policy(AnomalyPolicy::Retry))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, ControllerState::Completed);
    assert_eq!(report.processed, 0);
    assert_eq!(server.received_requests().await.unwrap().len(), requests);
}

#[tokio::test]
async fn test_fresh_restarts_completed_job() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), "jsonl", "records.jsonl");

    build_controller(&config, false, policy(AnomalyPolicy::Retry))
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = build_controller(&config, true, policy(AnomalyPolicy::Retry))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.processed, 5);
    assert_eq!(record_keys(&dir.path().join("records.jsonl")).len(), 10);
}

#[tokio::test]
async fn test_redirected_detail_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item/B"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/login", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html("<html><body>Sign in</body></html>".to_string()))
        .mount(&server)
        .await;
    mount_listing(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), "jsonl", "records.jsonl");

    let (listener, mut rx) = ChannelListener::new();
    let mut controller = build_controller(&config, false, policy(AnomalyPolicy::Abort))
        .unwrap()
        .with_listener(Arc::new(listener));
    let report = controller.run().await.unwrap();

    assert_eq!(report.outcome, ControllerState::Completed);
    assert_eq!(report.failed, 1);
    assert_eq!(
        record_keys(&dir.path().join("records.jsonl")),
        vec!["A", "C", "D", "E"]
    );

    let mut anomalies = 0;
    let mut failed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            CrawlEvent::Anomaly { resolved, .. } => {
                assert!(resolved.ends_with("/login"));
                anomalies += 1;
            }
            CrawlEvent::ItemFailed { key, .. } => failed.push(key),
            _ => {}
        }
    }
    assert_eq!(anomalies, 3);
    assert_eq!(failed, vec!["B"]);
}

#[tokio::test]
async fn test_unreachable_listing_fails_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), "jsonl", "records.jsonl");

    let mut controller =
        build_controller(&config, false, policy(AnomalyPolicy::Retry)).unwrap();
    let result = controller.run().await;

    assert!(matches!(
        result,
        Err(HarvestError::FetchFailed { attempts: 3, .. })
    ));
    assert_eq!(controller.control().status(), ControllerState::Failed);

    let saved = JsonFileStore::new(config.checkpoint_path())
        .load()
        .unwrap()
        .unwrap();
    assert_eq!(saved.page_cursor, 1);
    assert!(!saved.completed);
}

#[tokio::test]
async fn test_sqlite_sink() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), "sqlite", "records.db");

    let mut controller =
        build_controller(&config, false, policy(AnomalyPolicy::Retry)).unwrap();
    controller.run().await.unwrap();
    drop(controller);

    let sink = SqliteSink::open(&dir.path().join("records.db")).unwrap();
    assert_eq!(sink.count().unwrap(), 5);
    assert_eq!(sink.emit_count("C").unwrap(), Some(1));
}

#[tokio::test]
async fn test_other_target_checkpoint_is_rejected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), "jsonl", "records.jsonl");

    let mut store = JsonFileStore::new(config.checkpoint_path());
    store
        .initialize("https://elsewhere.example/list", config.job.job_config())
        .unwrap();

    let result = build_controller(&config, false, policy(AnomalyPolicy::Retry));
    assert!(matches!(result, Err(HarvestError::TargetMismatch { .. })));
}
