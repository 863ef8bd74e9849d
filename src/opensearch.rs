use crate::config::StoreConfig;
use crate::store::{
    BulkItem, BulkItemResult, BulkResponse, ClusterHealth, ClusterInfo, DocumentStore, SearchHit,
    SearchResult, StoreError,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout applied by [`OpenSearchStore::from_config`].
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenSearch client over the HTTP REST API.
#[derive(Clone)]
pub struct OpenSearchStore {
    client: Client,
    /// Base URL of the OpenSearch cluster, e.g. "http://localhost:9200".
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl OpenSearchStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        OpenSearchStore {
            client: Client::new(),
            base_url: base_url.into(),
            username: None,
            password: None,
        }
    }

    pub fn from_config(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(cfg.accept_invalid_certs)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(StoreError::transport)?;

        Ok(OpenSearchStore {
            client,
            base_url: cfg.base_url(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let builder = self.client.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        builder.send().await.map_err(StoreError::transport)
    }
}

async fn error_for_status(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
    let bytes = error_for_status(resp)
        .await?
        .bytes()
        .await
        .map_err(StoreError::transport)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn encode_index(index: &str) -> String {
    urlencoding::encode(index).into_owned()
}

#[derive(Deserialize)]
struct InfoBody {
    cluster_name: String,
    version: VersionBody,
}

#[derive(Deserialize)]
struct VersionBody {
    number: String,
}

#[derive(Deserialize)]
struct BulkBody {
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemBody>>,
}

#[derive(Deserialize)]
struct BulkItemBody {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id")]
    id: Option<String>,
    status: u16,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct SearchBody {
    hits: HitsBody,
}

#[derive(Deserialize)]
struct HitsBody {
    total: Option<TotalBody>,
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TotalBody {
    Object { value: u64 },
    Count(u64),
}

#[async_trait]
impl DocumentStore for OpenSearchStore {
    async fn connect(&self) -> Result<ClusterInfo, StoreError> {
        let resp = self.send(self.request(Method::GET, "")).await?;
        let body: InfoBody = decode(resp).await?;
        Ok(ClusterInfo {
            cluster_name: body.cluster_name,
            version: body.version.number,
        })
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let resp = self
            .send(self.request(Method::HEAD, &encode_index(index)))
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => error_for_status(resp).await.map(|_| true),
        }
    }

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<(), StoreError> {
        let resp = self
            .send(self.request(Method::PUT, &encode_index(index)).json(mapping))
            .await?;
        match error_for_status(resp).await {
            Ok(_) => {
                info!(index, "index created");
                Ok(())
            }
            Err(StoreError::Status { status: 400, body })
                if body.contains("resource_already_exists_exception") =>
            {
                debug!(index, "index already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn bulk(&self, items: &[BulkItem]) -> Result<BulkResponse, StoreError> {
        let mut body = String::new();
        for item in items {
            body.push_str(&serde_json::to_string(&item.action())?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&item.document)?);
            body.push('\n');
        }

        let resp = self
            .send(
                self.request(Method::POST, "_bulk")
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
            )
            .await?;
        let parsed: BulkBody = decode(resp).await?;

        let items = parsed
            .items
            .into_iter()
            .filter_map(|entry| entry.into_values().next())
            .map(|item| BulkItemResult {
                index: item.index,
                id: item.id,
                status: item.status,
                error: item.error,
            })
            .collect();

        Ok(BulkResponse {
            errors: parsed.errors,
            items,
        })
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResult, StoreError> {
        let path = format!("{}/_search", encode_index(index));
        let resp = self.send(self.request(Method::POST, &path).json(body)).await?;
        let parsed: SearchBody = decode(resp).await?;

        let total = match parsed.hits.total {
            Some(TotalBody::Object { value }) | Some(TotalBody::Count(value)) => value,
            None => parsed.hits.hits.len() as u64,
        };
        Ok(SearchResult {
            hits: parsed.hits.hits,
            total,
        })
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, StoreError> {
        let resp = self.send(self.request(Method::GET, "_cluster/health")).await?;
        decode(resp).await
    }
}
