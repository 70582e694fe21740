//! Document domain: metadata records, the collections they live in, and the
//! store seam used to list, download, and annotate them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;

/// A document's metadata row as returned by the metadata store.
///
/// Field names follow the store's columns; the generic names are accepted
/// as aliases. The core only reads rows and patches the text-cache fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "file_path", alias = "storage_path")]
    pub storage_path: Option<String>,

    #[serde(default, rename = "file_type", alias = "declared_mime")]
    pub declared_mime: Option<String>,

    /// Byte size. Stores disagree on the column type, so numeric strings are
    /// accepted and anything unreadable becomes `None`.
    #[serde(default, rename = "file_size", alias = "size", deserialize_with = "lenient_size")]
    pub size: Option<u64>,

    #[serde(default, alias = "uploaded_at")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, rename = "extracted_text", alias = "cached_text")]
    pub cached_text: Option<String>,

    #[serde(default, rename = "text_extracted_at", alias = "cached_text_at")]
    pub cached_text_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    /// Display name, falling back to the last segment of the storage path.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.storage_path
            .as_deref()
            .and_then(|p| p.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Cached text, if present and not blank.
    pub fn usable_cached_text(&self) -> Option<&str> {
        self.cached_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

fn lenient_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Where a family of documents lives and how it is listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// Short name used in logs and routes (e.g. "vault").
    pub name: String,
    /// Metadata table.
    pub table: String,
    /// Column holding the owner scope id.
    pub scope_column: String,
    /// Column used for newest-first ordering.
    pub order_column: String,
    /// Column list requested from the store.
    pub select: String,
    /// Object-store bucket holding the raw files.
    pub bucket: String,
    /// Maximum number of documents per listing.
    pub limit: usize,
    /// Whether extracted text is read from and written back to the row.
    pub cache_text: bool,
}

/// Raw bytes of a stored object plus the content type the store reported.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// The metadata + object store collaborator.
///
/// Every call forwards the caller's bearer token so the store can apply
/// its own row-level access rules.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List a collection for one owner scope, newest first, at most `limit` rows.
    async fn list(
        &self,
        collection: &Collection,
        scope: &str,
        limit: usize,
        bearer: &str,
    ) -> Result<Vec<DocumentRecord>, UpstreamError>;

    /// Download an object. `Ok(None)` means the object does not exist.
    async fn fetch_bytes(
        &self,
        bucket: &str,
        path: &str,
        bearer: &str,
    ) -> Result<Option<StoredObject>, UpstreamError>;

    /// Persist extracted text on the document row.
    async fn store_cached_text(
        &self,
        collection: &Collection,
        document_id: &str,
        text: &str,
        bearer: &str,
    ) -> Result<(), UpstreamError>;

    /// Resolve which server a channel belongs to. `Ok(None)` if the channel
    /// is not visible to the caller.
    async fn channel_server_id(
        &self,
        channel_id: &str,
        bearer: &str,
    ) -> Result<Option<String>, UpstreamError>;
}
