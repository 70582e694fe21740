//! HTTP client for the metadata store (REST rows) and object store (raw files).
//!
//! Every call carries the public API key and the caller's bearer token, so the
//! store applies its own row-level access rules.

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use vaultgate_config::StoreConfig;
use vaultgate_core::document::{Collection, DocumentRecord, DocumentStore, StoredObject};
use vaultgate_core::error::UpstreamError;

/// Sort records newest first (stable; undated records last) and keep `limit`.
pub fn newest_first(records: &mut Vec<DocumentRecord>, limit: usize) {
    records.sort_by(|a, b| match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    records.truncate(limit);
}

pub struct RestDocumentStore {
    base_url: String,
    rest_path: String,
    object_path: String,
    api_key: Option<String>,
    list_timeout: Duration,
    object_timeout: Duration,
    client: reqwest::Client,
}

impl RestDocumentStore {
    /// Store at `base_url` with the default paths and timeouts.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::from_config(base_url, api_key, &StoreConfig::default(), reqwest::Client::new())
    }

    pub fn from_config(
        base_url: impl Into<String>,
        api_key: Option<String>,
        config: &StoreConfig,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rest_path: config.rest_path.clone(),
            object_path: config.object_path.clone(),
            api_key,
            list_timeout: Duration::from_secs(config.list_timeout_secs),
            object_timeout: Duration::from_secs(config.object_timeout_secs),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}{}/{}", self.base_url, self.rest_path, table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder, bearer: &str) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(bearer);
        match &self.api_key {
            Some(key) => request.header("apikey", key),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, UpstreamError> {
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl DocumentStore for RestDocumentStore {
    async fn list(
        &self,
        collection: &Collection,
        scope: &str,
        limit: usize,
        bearer: &str,
    ) -> Result<Vec<DocumentRecord>, UpstreamError> {
        let scope_filter = format!("eq.{scope}");
        let order = format!("{}.desc", collection.order_column);
        let limit_param = limit.to_string();

        let request = self
            .client
            .get(self.rest_url(&collection.table))
            .query(&[
                ("select", collection.select.as_str()),
                (collection.scope_column.as_str(), scope_filter.as_str()),
                ("order", order.as_str()),
                ("limit", limit_param.as_str()),
            ])
            .timeout(self.list_timeout);

        let response = self.send(self.authorized(request, bearer)).await.map_err(|e| {
            warn!(collection = %collection.name, scope = %scope, error = %e, "Listing failed");
            e
        })?;

        let mut records: Vec<DocumentRecord> = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        newest_first(&mut records, limit);
        debug!(collection = %collection.name, scope = %scope, count = records.len(), "Listed documents");
        Ok(records)
    }

    async fn fetch_bytes(
        &self,
        bucket: &str,
        path: &str,
        bearer: &str,
    ) -> Result<Option<StoredObject>, UpstreamError> {
        let url = format!(
            "{}{}/{}/{}",
            self.base_url,
            self.object_path,
            bucket,
            path.trim_start_matches('/')
        );
        let request = self.client.get(&url).timeout(self.object_timeout);

        let response = match self.send(self.authorized(request, bearer)).await {
            Ok(response) => response,
            Err(UpstreamError::Status { status: 404, .. }) => {
                debug!(bucket = %bucket, path = %path, "Object not found");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(Some(StoredObject {
            bytes: bytes.to_vec(),
            content_type,
        }))
    }

    async fn store_cached_text(
        &self,
        collection: &Collection,
        document_id: &str,
        text: &str,
        bearer: &str,
    ) -> Result<(), UpstreamError> {
        let id_filter = format!("eq.{document_id}");
        let request = self
            .client
            .patch(self.rest_url(&collection.table))
            .query(&[("id", id_filter.as_str())])
            .header("Prefer", "return=minimal")
            .json(&json!({
                "extracted_text": text,
                "text_extracted_at": chrono::Utc::now().to_rfc3339(),
            }))
            .timeout(self.list_timeout);

        self.send(self.authorized(request, bearer)).await?;
        debug!(collection = %collection.name, document = %document_id, "Cached extracted text");
        Ok(())
    }

    async fn channel_server_id(&self, channel_id: &str, bearer: &str) -> Result<Option<String>, UpstreamError> {
        let id_filter = format!("eq.{channel_id}");
        let request = self
            .client
            .get(self.rest_url("channels"))
            .query(&[("select", "server_id"), ("id", id_filter.as_str())])
            .timeout(self.list_timeout);

        let rows: Vec<Value> = self
            .send(self.authorized(request, bearer))
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        Ok(rows
            .first()
            .and_then(|row| row.get("server_id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, patch};
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn vault_collection() -> Collection {
        Collection {
            name: "vault".into(),
            table: "files".into(),
            scope_column: "vault_id".into(),
            order_column: "uploaded_at".into(),
            select: "id,name,file_path".into(),
            bucket: "vault-files".into(),
            limit: 50,
            cache_text: true,
        }
    }

    fn record(id: &str, day: Option<u32>) -> DocumentRecord {
        DocumentRecord {
            id: Some(id.into()),
            created_at: day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn newest_first_is_stable_with_undated_last() {
        let mut records = vec![
            record("old", Some(1)),
            record("undated-a", None),
            record("new", Some(3)),
            record("undated-b", None),
            record("mid", Some(2)),
        ];
        newest_first(&mut records, 4);
        let ids: Vec<_> = records.iter().map(|r| r.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["new", "mid", "old", "undated-a"]);
    }

    #[tokio::test]
    async fn list_sends_filters_and_credentials() {
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let router = Router::new().route(
            "/rest/v1/files",
            get(move |Query(q): Query<HashMap<String, String>>, headers: HeaderMap| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some((q, headers));
                    Json(json!([
                        {"id": "a", "name": "a.txt", "file_path": "v/a.txt", "uploaded_at": "2024-01-01T00:00:00Z"},
                        {"id": "b", "name": "b.txt", "file_path": "v/b.txt", "uploaded_at": "2024-02-01T00:00:00Z"}
                    ]))
                }
            }),
        );
        let store = RestDocumentStore::new(serve(router).await, Some("anon".into()));

        let records = store.list(&vault_collection(), "v1", 50, "user-token").await.unwrap();
        assert_eq!(records[0].id.as_deref(), Some("b"));
        assert_eq!(records.len(), 2);

        let (query, headers) = seen.lock().unwrap().take().unwrap();
        assert_eq!(query["vault_id"], "eq.v1");
        assert_eq!(query["order"], "uploaded_at.desc");
        assert_eq!(query["limit"], "50");
        assert_eq!(headers["authorization"], "Bearer user-token");
        assert_eq!(headers["apikey"], "anon");
    }

    #[tokio::test]
    async fn list_accepts_textual_sizes() {
        let router = Router::new().route(
            "/rest/v1/server_files",
            get(|| async {
                Json(json!([
                    {"id": "s1", "name": "roadmap.txt", "size": "1234", "file_path": "srv/roadmap.txt"},
                    {"id": "s2", "name": "blob.bin", "size": "n/a", "file_path": "srv/blob.bin"},
                    {"id": "s3", "name": "plan.md", "size": 77, "file_path": "srv/plan.md"}
                ]))
            }),
        );
        let store = RestDocumentStore::new(serve(router).await, None);
        let collection = Collection {
            name: "server".into(),
            table: "server_files".into(),
            scope_column: "server_id".into(),
            order_column: "created_at".into(),
            select: "id,name,size,file_path,file_type,created_at,uploaded_by".into(),
            bucket: "server-files".into(),
            limit: 20,
            cache_text: false,
        };

        let records = store.list(&collection, "srv", 20, "t").await.unwrap();
        let sizes: Vec<_> = records.iter().map(|r| r.size).collect();
        assert_eq!(sizes, vec![Some(1234), None, Some(77)]);
    }

    #[tokio::test]
    async fn list_failure_is_upstream_status() {
        let router = Router::new().route(
            "/rest/v1/files",
            get(|| async { (StatusCode::FORBIDDEN, "permission denied") }),
        );
        let store = RestDocumentStore::new(serve(router).await, None);

        let err = store.list(&vault_collection(), "v1", 10, "t").await.unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn fetch_bytes_handles_found_and_missing() {
        let router = Router::new().route(
            "/storage/v1/object/vault-files/{*path}",
            get(|Path(path): Path<String>| async move {
                if path == "v1/a.txt" {
                    ([("content-type", "text/plain")], "hello").into_response()
                } else {
                    (StatusCode::NOT_FOUND, "missing").into_response()
                }
            }),
        );
        let store = RestDocumentStore::new(serve(router).await, None);

        let object = store.fetch_bytes("vault-files", "v1/a.txt", "t").await.unwrap().unwrap();
        assert_eq!(object.bytes, b"hello");
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));

        assert!(store.fetch_bytes("vault-files", "v1/nope.txt", "t").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn channel_lookup() {
        let router = Router::new().route(
            "/rest/v1/channels",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                if q.get("id").map(String::as_str) == Some("eq.c1") {
                    Json(json!([{"server_id": "s1"}]))
                } else {
                    Json(json!([]))
                }
            }),
        );
        let store = RestDocumentStore::new(serve(router).await, None);

        assert_eq!(store.channel_server_id("c1", "t").await.unwrap().as_deref(), Some("s1"));
        assert_eq!(store.channel_server_id("c2", "t").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cached_text_is_patched_with_timestamp() {
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let router = Router::new().route(
            "/rest/v1/files",
            patch(move |Query(q): Query<HashMap<String, String>>, Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some((q, body));
                    StatusCode::NO_CONTENT
                }
            }),
        );
        let store = RestDocumentStore::new(serve(router).await, None);

        store
            .store_cached_text(&vault_collection(), "doc-1", "extracted", "t")
            .await
            .unwrap();

        let (query, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(query["id"], "eq.doc-1");
        assert_eq!(body["extracted_text"], "extracted");
        let stamp = body["text_extracted_at"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }
}
