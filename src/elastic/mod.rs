use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::alerts::document::to_document;
use crate::alerts::{AlertStore, AlertStoreError};
use crate::config::ElasticsearchConfig;
use crate::core::Alert;

/// Alert store backed by an Elasticsearch index, spoken to over its REST API.
pub struct ElasticAlertStore {
    base_url: String,
    index: String,
    client: Client,
    auth: Option<String>, // base64 encoded user:pass
}

impl ElasticAlertStore {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, AlertStoreError> {
        let mut builder =
            Client::builder().timeout(Duration::from_millis(config.request_timeout_ms));

        if let Some(ca_path) = &config.ca_cert {
            let pem = std::fs::read(ca_path).map_err(|e| {
                AlertStoreError::Unavailable(format!("cannot read CA certificate {ca_path}: {e}"))
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        let auth = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some(basic_credentials(user, pass)),
            (Some(user), None) => Some(basic_credentials(user, "")),
            _ => None,
        };

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            client: builder.build()?,
            auth,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.auth {
            Some(auth) => req.header("Authorization", format!("Basic {auth}")),
            None => req,
        }
    }

    /// Cluster info from `GET /`. Used at startup to check connectivity.
    pub async fn info(&self) -> Result<Value, AlertStoreError> {
        let resp = self.request(Method::GET, "/").send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Create the alerts index with its mapping if it does not exist.
    /// Returns `true` when the index was created.
    pub async fn ensure_index(&self) -> Result<bool, AlertStoreError> {
        let path = format!("/{}", self.index);
        let resp = self.request(Method::HEAD, &path).send().await?;
        if resp.status() != StatusCode::NOT_FOUND {
            check_status(resp).await?;
            info!(index = %self.index, "Alerts index already exists");
            return Ok(false);
        }

        let resp = self
            .request(Method::PUT, &path)
            .json(&index_mapping())
            .send()
            .await?;
        check_status(resp).await?;
        info!(index = %self.index, "Alerts index created");
        Ok(true)
    }
}

#[async_trait]
impl AlertStore for ElasticAlertStore {
    async fn upsert(&self, alert: &Alert) -> Result<(), AlertStoreError> {
        let path = format!("/{}/_doc/{}", self.index, alert.id);
        let resp = self
            .request(Method::PUT, &path)
            .json(&to_document(alert))
            .send()
            .await?;
        check_status(resp).await?;
        debug!(id = %alert.id, index = %self.index, "Alert indexed");
        Ok(())
    }

    async fn query_recent(&self, limit: usize) -> Result<Vec<Value>, AlertStoreError> {
        let path = format!("/{}/_search", self.index);
        let resp = self
            .request(Method::POST, &path)
            .json(&search_body(limit))
            .send()
            .await?;

        // No index yet means no alerts yet.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body: Value = check_status(resp).await?.json().await?;
        parse_hits(&body)
    }
}

fn basic_credentials(user: &str, pass: &str) -> String {
    use base64::{Engine, engine::general_purpose::STANDARD};
    STANDARD.encode(format!("{user}:{pass}"))
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, AlertStoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(AlertStoreError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Mapping for the alerts index.
pub fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id":             { "type": "keyword" },
                "transaction_id": { "type": "keyword" },
                "account_id":     { "type": "keyword" },
                "reason":         { "type": "text" },
                "score":          { "type": "float" },
                "timestamp":      { "type": "date", "format": "epoch_millis" }
            }
        }
    })
}

pub fn search_body(limit: usize) -> Value {
    json!({
        "size": limit,
        "sort": [
            { "timestamp": { "order": "desc" } }
        ]
    })
}

/// Extract `_source` documents from a search response.
pub fn parse_hits(body: &Value) -> Result<Vec<Value>, AlertStoreError> {
    let hits = body
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .ok_or_else(|| AlertStoreError::MalformedResponse("missing hits.hits".into()))?;
    Ok(hits
        .iter()
        .filter_map(|hit| hit.get("_source").cloned())
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use chrono::Utc;

    use super::*;

    #[test]
    fn credentials_are_base64() {
        assert_eq!(basic_credentials("elastic", "changeme"), "ZWxhc3RpYzpjaGFuZ2VtZQ==");
    }

    #[test]
    fn mapping_uses_epoch_millis() {
        let mapping = index_mapping();
        let ts = &mapping["mappings"]["properties"]["timestamp"];
        assert_eq!(ts["type"], "date");
        assert_eq!(ts["format"], "epoch_millis");
        assert_eq!(mapping["mappings"]["properties"]["id"]["type"], "keyword");
    }

    #[test]
    fn search_sorts_by_timestamp_desc() {
        let body = search_body(10);
        assert_eq!(body["size"], 10);
        assert_eq!(body["sort"][0]["timestamp"]["order"], "desc");
    }

    #[test]
    fn parse_hits_extracts_sources() {
        let body = json!({
            "hits": { "total": { "value": 2 }, "hits": [
                { "_id": "a", "_source": { "id": "a", "score": "0.85" } },
                { "_id": "b" },
                { "_id": "c", "_source": { "id": "c", "score": 0.9 } }
            ]}
        });
        let docs = parse_hits(&body).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["score"], "0.85");
    }

    #[test]
    fn parse_hits_empty_and_malformed() {
        assert!(parse_hits(&json!({"hits": {"hits": []}})).unwrap().is_empty());
        assert!(matches!(
            parse_hits(&json!({"error": "boom"})),
            Err(AlertStoreError::MalformedResponse(_))
        ));
    }

    // ── Against an in-process fake of the Elasticsearch REST API ─────

    #[derive(Default)]
    struct FakeCluster {
        index_exists: bool,
        docs: BTreeMap<String, Value>,
        last_auth: Option<String>,
    }

    type Shared = Arc<Mutex<FakeCluster>>;

    async fn head_index(State(es): State<Shared>) -> AxumStatus {
        if es.lock().unwrap().index_exists {
            AxumStatus::OK
        } else {
            AxumStatus::NOT_FOUND
        }
    }

    async fn create_index(State(es): State<Shared>, Json(_mapping): Json<Value>) -> Json<Value> {
        es.lock().unwrap().index_exists = true;
        Json(json!({ "acknowledged": true }))
    }

    async fn put_doc(
        State(es): State<Shared>,
        Path(id): Path<String>,
        headers: HeaderMap,
        Json(doc): Json<Value>,
    ) -> (AxumStatus, Json<Value>) {
        let mut es = es.lock().unwrap();
        es.last_auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !es.index_exists {
            return (AxumStatus::NOT_FOUND, Json(json!({ "error": "index_not_found" })));
        }
        es.docs.insert(id, doc);
        (AxumStatus::CREATED, Json(json!({ "result": "created" })))
    }

    async fn search(State(es): State<Shared>, Json(query): Json<Value>) -> (AxumStatus, Json<Value>) {
        let es = es.lock().unwrap();
        if !es.index_exists {
            return (AxumStatus::NOT_FOUND, Json(json!({ "error": "index_not_found" })));
        }
        let size = query["size"].as_u64().unwrap_or(10) as usize;
        let mut docs: Vec<Value> = es.docs.values().cloned().collect();
        docs.sort_by_key(|d| std::cmp::Reverse(d["timestamp"].as_i64().unwrap_or(0)));
        let hits: Vec<Value> = docs
            .into_iter()
            .take(size)
            .map(|d| json!({ "_source": d }))
            .collect();
        (AxumStatus::OK, Json(json!({ "hits": { "hits": hits } })))
    }

    async fn spawn_fake(cluster: FakeCluster) -> (String, Shared) {
        let shared: Shared = Arc::new(Mutex::new(cluster));
        let app = Router::new()
            .route("/", get(|| async { Json(json!({ "cluster_name": "fake" })) }))
            .route("/alerts", axum::routing::head(head_index).put(create_index))
            .route("/alerts/_doc/{id}", put(put_doc))
            .route("/alerts/_search", post(search))
            .with_state(shared.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), shared)
    }

    fn store_for(url: &str) -> ElasticAlertStore {
        ElasticAlertStore::new(&ElasticsearchConfig {
            url: url.to_string(),
            username: Some("elastic".into()),
            password: Some("changeme".into()),
            ..ElasticsearchConfig::default()
        })
        .unwrap()
    }

    fn alert(id: &str, score: f64, millis: i64) -> Alert {
        use chrono::TimeZone;
        Alert {
            id: id.to_string(),
            transaction_id: "tx1".into(),
            account_id: "BLCKLST001".into(),
            reason: "test".into(),
            score,
            timestamp: Utc.timestamp_millis_opt(millis).unwrap(),
        }
    }

    #[tokio::test]
    async fn info_and_ensure_index() {
        let (url, es) = spawn_fake(FakeCluster::default()).await;
        let store = store_for(&url);

        assert_eq!(store.info().await.unwrap()["cluster_name"], "fake");
        assert!(store.ensure_index().await.unwrap());
        assert!(es.lock().unwrap().index_exists);
        assert!(!store.ensure_index().await.unwrap());
    }

    #[tokio::test]
    async fn upsert_then_query_recent() {
        let (url, es) = spawn_fake(FakeCluster {
            index_exists: true,
            ..FakeCluster::default()
        })
        .await;
        let store = store_for(&url);

        store.upsert(&alert("alert-1", 0.9, 1_000)).await.unwrap();
        store.upsert(&alert("alert-2", 1.2, 2_000)).await.unwrap();
        store.upsert(&alert("alert-1", 0.9, 1_000)).await.unwrap();

        assert_eq!(
            es.lock().unwrap().last_auth.as_deref(),
            Some("Basic ZWxhc3RpYzpjaGFuZ2VtZQ==")
        );

        let docs = store.query_recent(10).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["id"], "alert-2");
        assert_eq!(docs[0]["timestamp"], 2_000);
    }

    #[tokio::test]
    async fn missing_index_reads_as_empty() {
        let (url, _) = spawn_fake(FakeCluster::default()).await;
        let store = store_for(&url);
        assert!(store.query_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_error_status_is_reported() {
        let (url, _) = spawn_fake(FakeCluster::default()).await;
        let store = store_for(&url);
        let err = store.upsert(&alert("alert-1", 0.9, 1_000)).await.unwrap_err();
        assert!(matches!(err, AlertStoreError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn unreachable_cluster_is_an_error() {
        let store = store_for("http://127.0.0.1:1");
        assert!(matches!(
            store.query_recent(10).await,
            Err(AlertStoreError::Http(_))
        ));
    }
}
