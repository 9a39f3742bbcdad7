//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the remote catalog API and run
//! the full crawl cycle end-to-end against a database in a temp directory.

use maplister::config::{load_config_with_hash, Config};
use maplister::crawler::{run_crawl, Shutdown};
use maplister::storage::{RunStatus, SqliteStorage, Storage};
use maplister::ListerError;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_SIZE: usize = 2;

/// Writes a config file pointing at the mock server and loads it back
fn create_test_config(dir: &TempDir, base_url: &str) -> (Config, String, PathBuf) {
    let db_path = dir.path().join("maps.db");
    let config_path = dir.path().join("maplister.toml");
    let content = format!(
        r#"
[api]
base-url = "{}"
game = "tf2"

[crawler]
page-size = {}
max-attempts = 3
retry-delay-ms = 0
workers = 4

[user-agent]
crawler-name = "TestLister"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{}"
"#,
        base_url,
        PAGE_SIZE,
        db_path.display()
    );
    std::fs::write(&config_path, content).expect("Failed to write config");

    let (config, hash) = load_config_with_hash(&config_path).expect("Failed to load config");
    (config, hash, db_path)
}

fn map_json(id: u32) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("ctf_map_{}", id),
        "date": 1_500_000_000 + id,
        "mdate": 1_600_000_000 + id,
        "downloads": 10 * id,
        "rating": 8.5,
        "votes": 4,
        "views": 100 + id,
    })
}

/// Mounts count, main, every category page, and detail and download pages
async fn mount_catalog(server: &MockServer, categories: &[(&str, &[u32])]) {
    let total: usize = categories.iter().map(|(_, maps)| maps.len()).sum();

    Mock::given(method("GET"))
        .and(path("/maps/count"))
        .and(query_param("game", "297"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": total })))
        .mount(server)
        .await;

    let listing: Vec<_> = categories
        .iter()
        .map(|(id, _)| json!({ "id": id, "name": format!("Category {}", id) }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/categories"))
        .and(query_param("game", "297"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "categories": listing })))
        .mount(server)
        .await;

    for (category_id, maps) in categories {
        let mut pages: Vec<Vec<u32>> = maps.chunks(PAGE_SIZE).map(|c| c.to_vec()).collect();
        // A full last page needs an empty page after it
        if pages.last().map_or(true, |p| p.len() == PAGE_SIZE) {
            pages.push(Vec::new());
        }

        for (index, ids) in pages.iter().enumerate() {
            let body: Vec<_> = ids.iter().map(|id| map_json(*id)).collect();
            Mock::given(method("GET"))
                .and(path(format!("/categories/{}/maps", category_id)))
                .and(query_param("page", (index + 1).to_string()))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({ "maps": body, "total": maps.len() })),
                )
                .mount(server)
                .await;
        }

        for id in maps.iter() {
            Mock::given(method("GET"))
                .and(path(format!("/maps/{}", id)))
                .respond_with(ResponseTemplate::new(200).set_body_json(map_json(*id)))
                .mount(server)
                .await;

            Mock::given(method("GET"))
                .and(path(format!("/maps/{}/download", id)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "url": format!("https://files.example.com/{}.zip", id),
                    "size": (1024 * 1024 * 3 / 2).to_string(),
                })))
                .mount(server)
                .await;
        }
    }
}

async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}

fn open_db(db_path: &Path) -> SqliteStorage {
    SqliteStorage::new(db_path).expect("Failed to open DB")
}

#[tokio::test]
async fn test_full_crawl_mirrors_catalog() {
    let server = MockServer::start().await;
    mount_catalog(&server, &[("1", &[10, 11, 12]), ("2", &[20])]).await;

    let dir = TempDir::new().unwrap();
    let (config, hash, db_path) = create_test_config(&dir, &server.uri());

    let report = run_crawl(&config, &hash, Shutdown::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.advisory_count, 4);
    assert_eq!(report.categories_seen, 2);
    assert_eq!(report.categories_completed, 2);
    assert_eq!(report.maps_seen, 4);
    assert_eq!(report.stats.maps_inserted, 4);
    assert_eq!(report.stats.downloads_updated, 4);
    assert!(report.failures.is_empty());

    let storage = open_db(&db_path);
    assert_eq!(storage.count_categories().unwrap(), 2);
    assert_eq!(storage.count_maps().unwrap(), 4);
    assert_eq!(storage.count_maps_missing_downloads().unwrap(), 0);

    let map = storage.get_map("11").unwrap().expect("map 11 stored");
    assert_eq!(map.category_id, "1");
    assert_eq!(map.name, "ctf_map_11");
    assert_eq!(map.views, 111);
    assert_eq!(map.download_url.as_deref(), Some("https://files.example.com/11.zip"));
    assert_eq!(map.file_size.as_deref(), Some("1.5 MB"));

    let run = storage.get_latest_run().unwrap().expect("run recorded");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, hash);
    assert_eq!(run.game, "tf2");
    assert_eq!(run.maps_inserted, 4);

    // Category 1: pages 1 and 2 (short) only
    assert_eq!(requests_to(&server, "/categories/1/maps").await, 2);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    mount_catalog(&server, &[("1", &[1, 2]), ("2", &[3])]).await;

    let dir = TempDir::new().unwrap();
    let (config, hash, db_path) = create_test_config(&dir, &server.uri());

    run_crawl(&config, &hash, Shutdown::new()).await.expect("First crawl failed");
    let second = run_crawl(&config, &hash, Shutdown::new())
        .await
        .expect("Second crawl failed");

    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.stats.mutations(), 0);
    assert_eq!(second.stats.maps_unchanged, 3);

    // Detail and download pages were only needed by the first run
    assert_eq!(requests_to(&server, "/maps/1").await, 1);
    assert_eq!(requests_to(&server, "/maps/1/download").await, 1);

    let storage = open_db(&db_path);
    assert_eq!(storage.count_maps().unwrap(), 3);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;

    // Mounted first so it answers the first two requests for page 1
    Mock::given(method("GET"))
        .and(path("/categories/1/maps"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_catalog(&server, &[("1", &[7])]).await;

    let dir = TempDir::new().unwrap();
    let (config, hash, db_path) = create_test_config(&dir, &server.uri());

    let report = run_crawl(&config, &hash, Shutdown::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(requests_to(&server, "/categories/1/maps").await, 3);
    assert!(open_db(&db_path).get_map("7").unwrap().is_some());
}

#[tokio::test]
async fn test_recrawl_deletes_removed_maps() {
    let server = MockServer::start().await;
    mount_catalog(&server, &[("1", &[1, 2, 3]), ("2", &[4])]).await;

    let dir = TempDir::new().unwrap();
    let (config, hash, db_path) = create_test_config(&dir, &server.uri());
    run_crawl(&config, &hash, Shutdown::new()).await.expect("First crawl failed");

    server.reset().await;
    mount_catalog(&server, &[("1", &[1, 3]), ("2", &[4])]).await;

    let report = run_crawl(&config, &hash, Shutdown::new())
        .await
        .expect("Second crawl failed");
    assert_eq!(report.stats.maps_deleted, 1);

    let storage = open_db(&db_path);
    assert!(storage.get_map("2").unwrap().is_none());
    assert!(storage.get_map("1").unwrap().is_some());
    assert!(storage.get_map("3").unwrap().is_some());
    assert!(storage.get_map("4").unwrap().is_some());
}

#[tokio::test]
async fn test_failed_category_keeps_its_maps() {
    let server = MockServer::start().await;
    mount_catalog(&server, &[("1", &[1, 2, 3])]).await;

    let dir = TempDir::new().unwrap();
    let (config, hash, db_path) = create_test_config(&dir, &server.uri());
    run_crawl(&config, &hash, Shutdown::new()).await.expect("First crawl failed");

    // Page 2 of category 1 now always fails
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/categories/1/maps"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_catalog(&server, &[("1", &[1, 2])]).await;

    let report = run_crawl(&config, &hash, Shutdown::new())
        .await
        .expect("Second crawl failed");

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.categories_completed, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.stats.maps_deleted, 0);
    assert_eq!(open_db(&db_path).count_maps().unwrap(), 3);
}

#[tokio::test]
async fn test_failed_count_stage_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/maps/count"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (config, hash, db_path) = create_test_config(&dir, &server.uri());

    let result = run_crawl(&config, &hash, Shutdown::new()).await;
    assert!(matches!(result, Err(ListerError::Fetch(_))));

    assert_eq!(requests_to(&server, "/maps/count").await, 3);
    assert_eq!(requests_to(&server, "/categories").await, 0);

    let storage = open_db(&db_path);
    assert_eq!(storage.count_categories().unwrap(), 0);
    assert!(storage.get_latest_run().unwrap().is_none());
}
