use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use school_log_shipper::builder::EntryBuilder;
use school_log_shipper::logger::Logger;
use school_log_shipper::shipper::Shipper;
use school_log_shipper::store::{
    BulkItem, BulkResponse, ClusterHealth, ClusterInfo, DocumentStore, SearchResult, StoreError,
};
use school_log_shipper::{fields, Fields};
use serde_json::{json, Value};
use tokio::time::Duration;

/// Store that only counts what it receives, to measure the pipeline
/// itself without network I/O.
#[derive(Default)]
struct CountingStore {
    bulk_calls: AtomicU64,
    documents: AtomicU64,
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn connect(&self) -> Result<ClusterInfo, StoreError> {
        Ok(ClusterInfo {
            cluster_name: "counting".to_string(),
            version: "0".to_string(),
        })
    }

    async fn index_exists(&self, _index: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn create_index(&self, _index: &str, _mapping: &Value) -> Result<(), StoreError> {
        Ok(())
    }

    async fn bulk(&self, items: &[BulkItem]) -> Result<BulkResponse, StoreError> {
        self.bulk_calls.fetch_add(1, Ordering::Relaxed);
        self.documents.fetch_add(items.len() as u64, Ordering::Relaxed);
        Ok(BulkResponse::default())
    }

    async fn search(&self, _index: &str, _body: &Value) -> Result<SearchResult, StoreError> {
        Ok(SearchResult::default())
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, StoreError> {
        Ok(ClusterHealth {
            status: "green".to_string(),
            number_of_nodes: 1,
            active_shards: 0,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), StoreError> {
    let store = Arc::new(CountingStore::default());
    let logger = Logger::from_parts(
        EntryBuilder::new("school-application", "load-test"),
        None,
        Shipper::new(store.clone(), "school-application-logs", 1_000),
        Duration::from_millis(200),
    );
    logger.initialize().await?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        logger
            .info("LoadTest#1.0.0", "run", "load test entry", fields(json!({ "iteration": i })), Fields::new())
            .await?;
    }

    let elapsed = start.elapsed();
    logger.cleanup().await?;

    println!(
        "sent {} entries in {:?} (~{:.0} entries/s), {} bulk calls, {} documents shipped",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        store.bulk_calls.load(Ordering::Relaxed),
        store.documents.load(Ordering::Relaxed),
    );
    Ok(())
}
