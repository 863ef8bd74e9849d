use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;

/// One pending document together with the index that should receive it.
///
/// On the wire every item becomes two NDJSON lines: the action descriptor
/// and the document source.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub index: String,
    pub document: Value,
}

impl BulkItem {
    pub fn new(index: impl Into<String>, document: Value) -> Self {
        BulkItem {
            index: index.into(),
            document,
        }
    }

    /// The `{"index":{"_index":...}}` action line for this item.
    pub fn action(&self) -> Value {
        json!({ "index": { "_index": self.index } })
    }
}

/// Per-item outcome reported by a bulk call.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    pub index: String,
    pub id: Option<String>,
    pub status: u16,
    pub error: Option<Value>,
}

/// Result of a bulk call that reached the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    /// `true` when at least one item was rejected.
    pub errors: bool,
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|item| item.error.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub cluster_name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClusterHealth {
    pub status: String,
    pub number_of_nodes: u64,
    pub active_shards: u64,
}

/// Error type returned by [`DocumentStore`] implementations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The request never produced a response (connection refused, timeout).
    #[error("transport failure: {0}")]
    Transport(#[source] Box<dyn Error + Send + Sync>),

    #[error("store responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode store response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn transport(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        StoreError::Transport(err.into())
    }
}

/// Remote document store that receives shipped logs and answers queries.
///
/// Implementations are driven from Tokio tasks and must use async I/O.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check connectivity and return basic cluster information.
    async fn connect(&self) -> Result<ClusterInfo, StoreError>;

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError>;

    /// Create `index` with the given mapping/settings body.
    ///
    /// Implementations treat "index already exists" as success.
    async fn create_index(&self, index: &str, mapping: &Value) -> Result<(), StoreError>;

    /// Write all `items` in a single bulk request.
    ///
    /// **Returns**
    /// - `Ok(..)` when the store acknowledged the request, even if some
    ///   items were rejected (see [`BulkResponse::errors`]).
    /// - `Err(..)` when the request itself failed.
    async fn bulk(&self, items: &[BulkItem]) -> Result<BulkResponse, StoreError>;

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResult, StoreError>;

    async fn cluster_health(&self) -> Result<ClusterHealth, StoreError>;
}

/// Mapping used when the log index has to be created.
pub fn default_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "timestamp": { "type": "date" },
                "level": { "type": "keyword" },
                "message": { "type": "text" },
                "service": { "type": "keyword" },
                "userId": { "type": "keyword" },
                "action": { "type": "keyword" },
                "resource": { "type": "keyword" },
                "metadata": { "type": "object", "dynamic": true },
                "ip": { "type": "ip" },
                "userAgent": { "type": "text" }
            }
        },
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0
        }
    })
}
