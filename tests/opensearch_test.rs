#![cfg(feature = "opensearch")]

use mockito::{Matcher, Server};
use school_log_shipper::builder::EntryBuilder;
use school_log_shipper::config::{LoggerConfig, StoreConfig};
use school_log_shipper::logger::Logger;
use school_log_shipper::opensearch::OpenSearchStore;
use school_log_shipper::query;
use school_log_shipper::record::Fields;
use school_log_shipper::shipper::Shipper;
use school_log_shipper::store::{default_mapping, BulkItem, DocumentStore, StoreError};
use serde_json::json;
use std::sync::Arc;
use tokio::time::Duration;

const INDEX: &str = "school-application-logs";

fn store_config(server: &Server) -> StoreConfig {
    let host_port = server.host_with_port();
    let (host, port) = host_port.split_once(':').unwrap();
    StoreConfig {
        host: host.to_string(),
        port: port.parse().unwrap(),
        ..StoreConfig::default()
    }
}

#[tokio::test]
async fn connect_reads_cluster_info() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"cluster_name":"school","version":{"number":"2.11.1","distribution":"opensearch"}}"#)
        .create_async()
        .await;

    let store = OpenSearchStore::new(server.url());
    let info = store.connect().await.unwrap();

    assert_eq!(info.cluster_name, "school");
    assert_eq!(info.version, "2.11.1");
    mock.assert_async().await;
}

#[tokio::test]
async fn index_exists_maps_404_to_false() {
    let mut server = Server::new_async().await;
    let missing = server
        .mock("HEAD", "/missing-logs")
        .with_status(404)
        .create_async()
        .await;
    let present = server
        .mock("HEAD", "/school-application-logs")
        .with_status(200)
        .create_async()
        .await;

    let store = OpenSearchStore::new(server.url());
    assert!(!store.index_exists("missing-logs").await.unwrap());
    assert!(store.index_exists(INDEX).await.unwrap());

    missing.assert_async().await;
    present.assert_async().await;
}

#[tokio::test]
async fn create_index_tolerates_already_exists() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/school-application-logs")
        .match_body(Matcher::PartialJson(json!({
            "settings": {"number_of_shards": 1, "number_of_replicas": 0}
        })))
        .with_status(400)
        .with_body(r#"{"error":{"type":"resource_already_exists_exception"},"status":400}"#)
        .create_async()
        .await;

    let store = OpenSearchStore::new(server.url());
    store.create_index(INDEX, &default_mapping()).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn create_index_surfaces_other_errors() {
    let mut server = Server::new_async().await;
    server
        .mock("PUT", "/school-application-logs")
        .with_status(403)
        .with_body("forbidden")
        .create_async()
        .await;

    let store = OpenSearchStore::new(server.url());
    let err = store.create_index(INDEX, &default_mapping()).await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 403, .. }));
}

#[tokio::test]
async fn bulk_sends_ndjson_and_reports_item_errors() {
    let mut server = Server::new_async().await;
    let expected = concat!(
        r#"{"index":{"_index":"school-application-logs"}}"#, "\n",
        r#"{"message":"one"}"#, "\n",
        r#"{"index":{"_index":"notification-logs"}}"#, "\n",
        r#"{"message":"two"}"#, "\n",
    );
    let mock = server
        .mock("POST", "/_bulk")
        .match_header("content-type", "application/x-ndjson")
        .match_body(Matcher::Exact(expected.to_string()))
        .with_status(200)
        .with_body(
            r#"{"took":3,"errors":true,"items":[
                {"index":{"_index":"school-application-logs","_id":"a1","status":201}},
                {"index":{"_index":"notification-logs","_id":null,"status":400,
                  "error":{"type":"mapper_parsing_exception","reason":"failed to parse"}}}
            ]}"#,
        )
        .create_async()
        .await;

    let store = OpenSearchStore::new(server.url());
    let response = store
        .bulk(&[
            BulkItem::new(INDEX, json!({"message": "one"})),
            BulkItem::new("notification-logs", json!({"message": "two"})),
        ])
        .await
        .unwrap();

    assert!(response.errors);
    assert_eq!(response.items.len(), 2);
    assert_eq!(response.items[0].id.as_deref(), Some("a1"));
    let failed: Vec<_> = response.failed_items().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, 400);
    assert_eq!(failed[0].index, "notification-logs");
    mock.assert_async().await;
}

#[tokio::test]
async fn bulk_server_error_is_a_request_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/_bulk")
        .with_status(503)
        .with_body("cluster unavailable")
        .create_async()
        .await;

    let store = OpenSearchStore::new(server.url());
    let err = store
        .bulk(&[BulkItem::new(INDEX, json!({"message": "one"}))])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 503, .. }));
}

#[tokio::test]
async fn unreachable_store_is_a_transport_error() {
    let store = OpenSearchStore::new("http://127.0.0.1:1");
    let err = store.connect().await.unwrap_err();
    assert!(matches!(err, StoreError::Transport(_)));
}

#[tokio::test]
async fn search_posts_sorted_body_and_parses_hits() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/school-application-logs/_search")
        .match_body(Matcher::Json(json!({
            "query": {"match": {"level": "error"}},
            "sort": [{"timestamp": {"order": "desc"}}],
            "size": 10
        })))
        .with_status(200)
        .with_body(
            r#"{"hits":{"total":{"value":2,"relation":"eq"},"max_score":null,"hits":[
                {"_index":"school-application-logs","_id":"b","_score":null,
                 "_source":{"timestamp":"2024-05-01T10:00:00.000Z","level":"error"}},
                {"_index":"school-application-logs","_id":"a","_score":null,
                 "_source":{"timestamp":"2024-05-01T09:00:00.000Z","level":"error"}}
            ]}}"#,
        )
        .create_async()
        .await;

    let store = OpenSearchStore::new(server.url());
    let result = store
        .search(INDEX, &query::search_body(query::by_level("error"), 10))
        .await
        .unwrap();

    assert_eq!(result.total, 2);
    assert!(result.hits.len() <= 10);
    assert_eq!(result.hits[0].id, "b");
    assert_eq!(result.hits[1].source["timestamp"], "2024-05-01T09:00:00.000Z");
    mock.assert_async().await;
}

#[tokio::test]
async fn cluster_health_parses_status() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/_cluster/health")
        .with_status(200)
        .with_body(r#"{"cluster_name":"school","status":"yellow","number_of_nodes":1,"active_shards":5}"#)
        .create_async()
        .await;

    let store = OpenSearchStore::new(server.url());
    let health = store.cluster_health().await.unwrap();
    assert_eq!(health.status, "yellow");
    assert_eq!(health.number_of_nodes, 1);
    assert_eq!(health.active_shards, 5);
}

#[tokio::test]
async fn config_credentials_become_basic_auth() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/_cluster/health")
        .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
        .with_status(200)
        .with_body(r#"{"status":"green","number_of_nodes":3,"active_shards":9}"#)
        .create_async()
        .await;

    let config = StoreConfig {
        username: Some("admin".into()),
        password: Some("secret".into()),
        ..store_config(&server)
    };
    let store = OpenSearchStore::from_config(&config).unwrap();
    store.cluster_health().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn logger_lifecycle_against_http_store() {
    let mut server = Server::new_async().await;
    let info = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(r#"{"cluster_name":"school","version":{"number":"2.11.1"}}"#)
        .create_async()
        .await;
    let exists = server
        .mock("HEAD", "/school-application-logs")
        .with_status(404)
        .create_async()
        .await;
    let create = server
        .mock("PUT", "/school-application-logs")
        .with_status(200)
        .with_body(r#"{"acknowledged":true}"#)
        .create_async()
        .await;
    let bulk = server
        .mock("POST", "/_bulk")
        .match_body(Matcher::Regex(r#""message":"Application started""#.to_string()))
        .with_status(200)
        .with_body(r#"{"errors":false,"items":[{"index":{"_index":"school-application-logs","_id":"x","status":201}}]}"#)
        .expect(1)
        .create_async()
        .await;

    let config = LoggerConfig {
        store: store_config(&server),
        log_dir: None,
        console: false,
        ..LoggerConfig::default()
    };
    let store = Arc::new(OpenSearchStore::from_config(&config.store).unwrap());
    let logger = Logger::from_parts(
        EntryBuilder::new(config.service.clone(), config.environment.clone()),
        None,
        Shipper::new(store, config.index_name.clone(), config.batch_size),
        Duration::from_secs(60),
    );

    logger.initialize().await.unwrap();
    logger
        .info("SchoolApplication#1.0.0", "initialize", "Application started", Fields::new(), Fields::new())
        .await
        .unwrap();
    let report = logger.cleanup().await.unwrap();

    assert_eq!(report.shipped, 1);
    info.assert_async().await;
    exists.assert_async().await;
    create.assert_async().await;
    bulk.assert_async().await;
}
