//! In-memory document store used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use school_log_shipper::builder::EntryBuilder;
use school_log_shipper::logger::Logger;
use school_log_shipper::shipper::Shipper;
use school_log_shipper::store::{
    BulkItem, BulkItemResult, BulkResponse, ClusterHealth, ClusterInfo, DocumentStore, SearchHit,
    SearchResult, StoreError,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkMode {
    Accept,
    RejectAll,
    Unreachable,
}

#[derive(Default)]
struct State {
    reachable: bool,
    indices: HashSet<String>,
    created: Vec<String>,
    bulk_calls: Vec<Vec<BulkItem>>,
    indexed: Vec<BulkItem>,
}

pub struct RecordingStore {
    mode: Mutex<BulkMode>,
    state: Mutex<State>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingStore {
            mode: Mutex::new(BulkMode::Accept),
            state: Mutex::new(State {
                reachable: true,
                ..State::default()
            }),
        })
    }

    pub fn with_index(index: &str) -> Arc<Self> {
        let store = Self::new();
        store.state.lock().unwrap().indices.insert(index.to_string());
        store
    }

    pub fn set_mode(&self, mode: BulkMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    pub fn bulk_calls(&self) -> Vec<Vec<BulkItem>> {
        self.state.lock().unwrap().bulk_calls.clone()
    }

    pub fn created_indices(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn indexed(&self) -> Vec<BulkItem> {
        self.state.lock().unwrap().indexed.clone()
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.state.lock().unwrap().reachable {
            Ok(())
        } else {
            Err(StoreError::transport("connection refused"))
        }
    }
}

/// Only `match_all` and single-field `match` clauses are understood.
fn matches(clause: &Value, document: &Value) -> bool {
    if let Some(term) = clause.get("match").and_then(Value::as_object) {
        return term.iter().all(|(field, expected)| document.get(field) == Some(expected));
    }
    clause.get("match_all").is_some()
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn connect(&self) -> Result<ClusterInfo, StoreError> {
        self.check_reachable()?;
        Ok(ClusterInfo {
            cluster_name: "test-cluster".to_string(),
            version: "2.11.0".to_string(),
        })
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        self.check_reachable()?;
        Ok(self.state.lock().unwrap().indices.contains(index))
    }

    async fn create_index(&self, index: &str, _mapping: &Value) -> Result<(), StoreError> {
        self.check_reachable()?;
        let mut state = self.state.lock().unwrap();
        if state.indices.insert(index.to_string()) {
            state.created.push(index.to_string());
        }
        Ok(())
    }

    async fn bulk(&self, items: &[BulkItem]) -> Result<BulkResponse, StoreError> {
        let mode = *self.mode.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        state.bulk_calls.push(items.to_vec());

        match mode {
            BulkMode::Accept => {
                state.indexed.extend(items.iter().cloned());
                Ok(BulkResponse {
                    errors: false,
                    items: items
                        .iter()
                        .map(|item| BulkItemResult {
                            index: item.index.clone(),
                            id: None,
                            status: 201,
                            error: None,
                        })
                        .collect(),
                })
            }
            BulkMode::RejectAll => Ok(BulkResponse {
                errors: true,
                items: items
                    .iter()
                    .map(|item| BulkItemResult {
                        index: item.index.clone(),
                        id: None,
                        status: 400,
                        error: Some(json!({"type": "mapper_parsing_exception"})),
                    })
                    .collect(),
            }),
            BulkMode::Unreachable => Err(StoreError::transport("connection refused")),
        }
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResult, StoreError> {
        self.check_reachable()?;
        let size = body["size"].as_u64().unwrap_or(10) as usize;
        let state = self.state.lock().unwrap();

        let mut found: Vec<&BulkItem> = state
            .indexed
            .iter()
            .filter(|item| item.index == index && matches(&body["query"], &item.document))
            .collect();
        found.sort_by(|a, b| {
            let a = a.document["timestamp"].as_str().unwrap_or_default();
            let b = b.document["timestamp"].as_str().unwrap_or_default();
            b.cmp(a)
        });

        Ok(SearchResult {
            total: found.len() as u64,
            hits: found
                .into_iter()
                .take(size)
                .enumerate()
                .map(|(i, item)| SearchHit {
                    index: item.index.clone(),
                    id: i.to_string(),
                    score: None,
                    source: item.document.clone(),
                })
                .collect(),
        })
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, StoreError> {
        self.check_reachable()?;
        Ok(ClusterHealth {
            status: "green".to_string(),
            number_of_nodes: 1,
            active_shards: 3,
        })
    }
}

pub const INDEX: &str = "school-application-logs";
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(5_000);

/// Logger without a local sink over `store`.
pub fn logger(store: Arc<RecordingStore>, batch_size: usize) -> Logger {
    logger_with(store, batch_size, EntryBuilder::new("school-application", "test"))
}

pub fn logger_with(store: Arc<RecordingStore>, batch_size: usize, builder: EntryBuilder) -> Logger {
    Logger::from_parts(
        builder,
        None,
        Shipper::new(store, INDEX, batch_size),
        FLUSH_INTERVAL,
    )
}
