//! Fetch → extract → cache → assemble pipeline for one owner scope.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use vaultgate_core::context::{AssemblyResult, ContextBudget, ContextDocument};
use vaultgate_core::document::{Collection, DocumentRecord, DocumentStore};
use vaultgate_core::error::UpstreamError;
use vaultgate_documents::TextExtractor;

use crate::assembler::ContextAssembler;

/// Documents fetched and extracted concurrently when not configured.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Builds a bounded context from the documents of one owner scope.
pub struct ContextBuilder {
    store: Arc<dyn DocumentStore>,
    extractor: TextExtractor,
    assembler: ContextAssembler,
    concurrency: usize,
}

impl ContextBuilder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            extractor: TextExtractor::default(),
            assembler: ContextAssembler::new(),
            concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    /// Maximum documents fetched and extracted at once (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// List the scope's documents and pack their text into `budget`.
    ///
    /// Only the listing can fail; a document whose bytes or text cannot be
    /// obtained is left out.
    pub async fn build_context(
        &self,
        collection: &Collection,
        scope: &str,
        budget: &ContextBudget,
        bearer: &str,
    ) -> Result<AssemblyResult, UpstreamError> {
        let documents = self.collect_documents(collection, scope, bearer).await?;
        let result = self.assembler.assemble(&documents, budget);

        info!(
            collection = %collection.name,
            scope = %scope,
            available = documents.len(),
            included = result.included.len(),
            truncated = result.truncated_count(),
            used_chars = result.used_chars,
            "Context assembled"
        );
        Ok(result)
    }

    /// Texts of the scope's documents, newest first, blanks removed.
    pub async fn collect_documents(
        &self,
        collection: &Collection,
        scope: &str,
        bearer: &str,
    ) -> Result<Vec<ContextDocument>, UpstreamError> {
        let records = self.store.list(collection, scope, collection.limit, bearer).await?;
        debug!(collection = %collection.name, scope = %scope, count = records.len(), "Collecting document texts");

        let texts: Vec<Option<ContextDocument>> = futures::stream::iter(records)
            .filter(|record| {
                let usable = record.id.is_some() && record.storage_path.is_some();
                if !usable {
                    debug!(name = ?record.name, "Skipping record without id or storage path");
                }
                futures::future::ready(usable)
            })
            .map(|record| self.document_text(collection, record, bearer))
            .buffered(self.concurrency)
            .collect()
            .await;

        Ok(texts.into_iter().flatten().collect())
    }

    async fn document_text(
        &self,
        collection: &Collection,
        record: DocumentRecord,
        bearer: &str,
    ) -> Option<ContextDocument> {
        let name = record.display_name();

        if collection.cache_text {
            if let Some(cached) = record.usable_cached_text() {
                debug!(file = %name, "Using cached text");
                return non_blank(name, cached);
            }
        }

        let path = record.storage_path.as_deref()?;
        let object = match self.store.fetch_bytes(&collection.bucket, path, bearer).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                debug!(file = %name, path = %path, "Object missing from storage");
                return None;
            }
            Err(e) => {
                warn!(file = %name, path = %path, error = %e, "Failed to download document");
                return None;
            }
        };

        let mime = record
            .declared_mime
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or(object.content_type);

        let text = self.extractor.extract_blocking(object.bytes, mime, name.clone()).await?;
        let document = non_blank(name, &text)?;

        if collection.cache_text {
            if let Some(id) = record.id.clone() {
                self.spawn_write_back(collection, id, document.text.clone(), bearer);
            }
        }

        Some(document)
    }

    /// Persist freshly extracted text without waiting for the store.
    fn spawn_write_back(&self, collection: &Collection, id: String, text: String, bearer: &str) {
        let store = Arc::clone(&self.store);
        let collection = collection.clone();
        let bearer = bearer.to_string();

        tokio::spawn(async move {
            if let Err(e) = store.store_cached_text(&collection, &id, &text, &bearer).await {
                warn!(collection = %collection.name, document = %id, error = %e, "Failed to cache extracted text");
            }
        });
    }
}

fn non_blank(name: String, text: &str) -> Option<ContextDocument> {
    let text = text.trim();
    (!text.is_empty()).then(|| ContextDocument::new(name, text))
}
