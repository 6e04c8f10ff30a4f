//! Hosted search-index collaborator.
//!
//! The pipeline's only contact with the hosted engine is through the
//! [`SearchIndex`] trait: index administration, batched document upload
//! with a multimodal-combination mapping, and raw search. [`MarqoIndex`]
//! implements it over the engine's REST API using an explicit
//! [`IndexTarget`]; nothing here holds process-global client state.
//!
//! Each request is sent once. A non-success status becomes an error
//! carrying the status and response body.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::IndexConfig;
use crate::progress::{UploadProgressEvent, UploadProgressReporter};

/// Page size used when draining an index.
pub const EMPTY_PAGE_SIZE: usize = 400;

/// Endpoint, credentials, and index name for one hosted index.
#[derive(Debug, Clone)]
pub struct IndexTarget {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub index_name: String,
}

impl IndexTarget {
    /// Build a target from config, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var)
                    .map_err(|_| anyhow!("{} environment variable not set", var))?,
            ),
            None => None,
        };
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            index_name: config.name.clone(),
        })
    }
}

/// Index settings sent on creation.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub model: String,
    pub treat_urls_as_images: bool,
}

impl IndexSettings {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            model: config.model.clone(),
            treat_urls_as_images: config.treat_urls_as_images,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "treatUrlsAndPointersAsImages": self.treat_urls_as_images,
            "model": self.model,
        })
    }
}

/// A tensor field combining text and image-URL attributes under weights.
#[derive(Debug, Clone)]
pub struct MultimodalField {
    pub name: String,
    pub weights: BTreeMap<String, f64>,
}

impl MultimodalField {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            name: config.multimodal_field.clone(),
            weights: config.multimodal_weights.clone(),
        }
    }
}

/// Request body for one document batch.
pub fn add_documents_body(documents: &[Value], field: &MultimodalField) -> Value {
    let mut mappings = serde_json::Map::new();
    mappings.insert(
        field.name.clone(),
        json!({
            "type": "multimodal_combination",
            "weights": field.weights,
        }),
    );
    json!({
        "documents": documents,
        "tensorFields": [field.name],
        "useExistingTensors": true,
        "mappings": mappings,
    })
}

/// Operations the pipeline needs from a hosted index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    fn name(&self) -> &str;

    async fn create(&self, settings: &IndexSettings) -> Result<Value>;

    async fn delete(&self) -> Result<Value>;

    async fn stats(&self) -> Result<Value>;

    /// Add or replace one batch of documents.
    async fn add_documents(&self, documents: &[Value], field: &MultimodalField) -> Result<Value>;

    async fn get_document(&self, id: &str) -> Result<Value>;

    async fn delete_documents(&self, ids: &[String]) -> Result<Value>;

    /// Run a search with a fully built request body (see [`crate::recipes`]).
    async fn search(&self, request: &Value) -> Result<Value>;
}

/// [`SearchIndex`] over the hosted engine's REST API.
pub struct MarqoIndex {
    target: IndexTarget,
    client: reqwest::Client,
}

impl MarqoIndex {
    pub fn new(target: IndexTarget, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { target, client })
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        Self::new(IndexTarget::from_config(config)?, config.timeout_secs)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/indexes/{}{}",
            self.target.endpoint, self.target.index_name, path
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let request = match &self.target.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        };
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.target.endpoint))?;

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("Index API error {}: {}", status, body_text);
        }
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text)
            .with_context(|| format!("Invalid JSON from index API: {}", body_text))
    }
}

#[async_trait]
impl SearchIndex for MarqoIndex {
    fn name(&self) -> &str {
        &self.target.index_name
    }

    async fn create(&self, settings: &IndexSettings) -> Result<Value> {
        self.send(self.client.post(self.url("")).json(&settings.to_json()))
            .await
    }

    async fn delete(&self) -> Result<Value> {
        self.send(self.client.delete(self.url(""))).await
    }

    async fn stats(&self) -> Result<Value> {
        self.send(self.client.get(self.url("/stats"))).await
    }

    async fn add_documents(&self, documents: &[Value], field: &MultimodalField) -> Result<Value> {
        let body = add_documents_body(documents, field);
        self.send(self.client.post(self.url("/documents")).json(&body))
            .await
    }

    async fn get_document(&self, id: &str) -> Result<Value> {
        self.send(self.client.get(self.url(&format!("/documents/{}", id))))
            .await
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<Value> {
        self.send(
            self.client
                .post(self.url("/documents/delete-batch"))
                .json(ids),
        )
        .await
    }

    async fn search(&self, request: &Value) -> Result<Value> {
        self.send(self.client.post(self.url("/search")).json(request))
            .await
    }
}

/// Outcome of [`upload_documents`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub batches: usize,
    pub documents: usize,
    /// Documents the index reported as failed inside successful batches.
    pub failed: usize,
}

/// Upload documents in batches of `batch_size`, reporting after each batch.
pub async fn upload_documents(
    index: &dyn SearchIndex,
    documents: &[Value],
    field: &MultimodalField,
    batch_size: usize,
    progress: &dyn UploadProgressReporter,
) -> Result<UploadSummary> {
    if batch_size == 0 {
        bail!("batch size must be > 0");
    }

    let total = documents.len();
    let batches = total.div_ceil(batch_size);
    let mut summary = UploadSummary::default();
    progress.report(UploadProgressEvent::Started {
        documents: total,
        batches,
    });

    for batch in documents.chunks(batch_size) {
        let response = index
            .add_documents(batch, field)
            .await
            .with_context(|| format!("Batch {} failed", summary.batches + 1))?;
        let failed = count_failed_items(&response);
        if failed > 0 {
            debug!(batch = summary.batches + 1, failed, "index reported item errors");
        }

        summary.batches += 1;
        summary.documents += batch.len();
        summary.failed += failed;
        progress.report(UploadProgressEvent::BatchSent {
            batch: summary.batches,
            batches,
            sent: summary.documents,
            total,
            failed,
        });
    }

    info!(
        index = index.name(),
        documents = summary.documents,
        batches = summary.batches,
        failed = summary.failed,
        "upload finished"
    );
    Ok(summary)
}

/// Count entries in an add-documents response's `items` that carry an error.
fn count_failed_items(response: &Value) -> usize {
    response
        .get("items")
        .and_then(|items| items.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|item| {
                    item.get("error").is_some()
                        || item
                            .get("status")
                            .and_then(|s| s.as_u64())
                            .is_some_and(|s| s >= 400)
                })
                .count()
        })
        .unwrap_or(0)
}

/// Ids of the hits in a search response.
pub fn hit_ids(response: &Value) -> Vec<String> {
    response
        .get("hits")
        .and_then(|h| h.as_array())
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.get("_id").and_then(|id| id.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Delete every document by repeatedly listing and deleting a page of ids.
///
/// Returns the number of ids deleted. Fails if a page comes back unchanged
/// after its ids were deleted, since the loop would otherwise never end.
pub async fn empty_index(index: &dyn SearchIndex) -> Result<usize> {
    let page_request = json!({ "q": "", "limit": EMPTY_PAGE_SIZE });
    let mut deleted = 0usize;
    let mut previous: Vec<String> = Vec::new();

    loop {
        let ids = hit_ids(&index.search(&page_request).await?);
        if ids.is_empty() {
            break;
        }
        if ids == previous {
            bail!(
                "Index '{}' returned the same {} documents after deleting them",
                index.name(),
                ids.len()
            );
        }
        index.delete_documents(&ids).await?;
        deleted += ids.len();
        debug!(index = index.name(), deleted, "deleted page");
        previous = ids;
    }

    info!(index = index.name(), deleted, "index emptied");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<UploadProgressEvent>>,
    }

    impl UploadProgressReporter for RecordingProgress {
        fn report(&self, event: UploadProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    /// In-memory index recording calls.
    #[derive(Default)]
    struct MemoryIndex {
        docs: Mutex<Vec<String>>,
        batches: Mutex<Vec<usize>>,
        ignore_deletes: bool,
        /// Ids answered with a per-item 400.
        rejected: Vec<&'static str>,
    }

    #[async_trait]
    impl SearchIndex for MemoryIndex {
        fn name(&self) -> &str {
            "memory"
        }

        async fn create(&self, _settings: &IndexSettings) -> Result<Value> {
            Ok(json!({"acknowledged": true}))
        }

        async fn delete(&self) -> Result<Value> {
            self.docs.lock().unwrap().clear();
            Ok(Value::Null)
        }

        async fn stats(&self) -> Result<Value> {
            Ok(json!({"numberOfDocuments": self.docs.lock().unwrap().len()}))
        }

        async fn add_documents(&self, documents: &[Value], _field: &MultimodalField) -> Result<Value> {
            self.batches.lock().unwrap().push(documents.len());
            let mut docs = self.docs.lock().unwrap();
            let mut items = Vec::new();
            for doc in documents {
                let id = doc["_id"].as_str().unwrap_or_default().to_string();
                if self.rejected.contains(&id.as_str()) {
                    items.push(json!({"_id": id, "status": 400, "error": "invalid field"}));
                } else {
                    items.push(json!({"_id": id, "status": 200}));
                    docs.push(id);
                }
            }
            Ok(json!({"errors": items.iter().any(|i| i["status"] == 400), "items": items}))
        }

        async fn get_document(&self, id: &str) -> Result<Value> {
            Ok(json!({"_id": id}))
        }

        async fn delete_documents(&self, ids: &[String]) -> Result<Value> {
            if !self.ignore_deletes {
                self.docs.lock().unwrap().retain(|d| !ids.contains(d));
            }
            Ok(Value::Null)
        }

        async fn search(&self, request: &Value) -> Result<Value> {
            let limit = request["limit"].as_u64().unwrap_or(10) as usize;
            let docs = self.docs.lock().unwrap();
            let hits: Vec<Value> = docs.iter().take(limit).map(|id| json!({"_id": id})).collect();
            Ok(json!({ "hits": hits }))
        }
    }

    fn field() -> MultimodalField {
        MultimodalField::from_config(&IndexConfig::default())
    }

    fn docs(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"_id": format!("{}_0", i)})).collect()
    }

    #[tokio::test]
    async fn upload_splits_into_batches() {
        let index = MemoryIndex::default();
        let summary = upload_documents(&index, &docs(130), &field(), 64, &NoProgress)
            .await
            .unwrap();

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.documents, 130);
        assert_eq!(*index.batches.lock().unwrap(), vec![64, 64, 2]);
    }

    #[tokio::test]
    async fn upload_reports_each_batch_with_its_failures() {
        let index = MemoryIndex {
            rejected: vec!["3_0", "4_0"],
            ..Default::default()
        };
        let progress = RecordingProgress::default();
        let summary = upload_documents(&index, &docs(5), &field(), 2, &progress)
            .await
            .unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(index.docs.lock().unwrap().len(), 3);
        assert_eq!(
            *progress.events.lock().unwrap(),
            vec![
                UploadProgressEvent::Started {
                    documents: 5,
                    batches: 3
                },
                UploadProgressEvent::BatchSent {
                    batch: 1,
                    batches: 3,
                    sent: 2,
                    total: 5,
                    failed: 0
                },
                UploadProgressEvent::BatchSent {
                    batch: 2,
                    batches: 3,
                    sent: 4,
                    total: 5,
                    failed: 1
                },
                UploadProgressEvent::BatchSent {
                    batch: 3,
                    batches: 3,
                    sent: 5,
                    total: 5,
                    failed: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn empty_index_drains_all_pages() {
        let index = MemoryIndex::default();
        upload_documents(&index, &docs(900), &field(), 100, &NoProgress)
            .await
            .unwrap();

        let deleted = empty_index(&index).await.unwrap();
        assert_eq!(deleted, 900);
        assert!(index.docs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_index_stops_when_deletes_do_not_apply() {
        let index = MemoryIndex {
            ignore_deletes: true,
            ..Default::default()
        };
        upload_documents(&index, &docs(3), &field(), 64, &NoProgress)
            .await
            .unwrap();

        assert!(empty_index(&index).await.is_err());
    }

    #[test]
    fn add_documents_body_declares_multimodal_mapping() {
        let body = add_documents_body(&docs(1), &field());
        assert_eq!(body["tensorFields"], json!(["image_title_multimodal"]));
        assert_eq!(body["useExistingTensors"], true);
        let mapping = &body["mappings"]["image_title_multimodal"];
        assert_eq!(mapping["type"], "multimodal_combination");
        assert_eq!(mapping["weights"]["product_name"], 0.1);
        assert_eq!(mapping["weights"]["image_url"], 0.9);
    }

    #[test]
    fn failed_items_counted() {
        let response = json!({"items": [
            {"_id": "a", "status": 200},
            {"_id": "b", "status": 400, "error": "bad"},
            {"_id": "c", "status": 500},
        ]});
        assert_eq!(count_failed_items(&response), 2);
        assert_eq!(count_failed_items(&json!({})), 0);
    }

    #[test]
    fn target_requires_configured_key_variable() {
        let config = IndexConfig {
            api_key_env: Some("SEARCH_SIGNALS_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
            ..IndexConfig::default()
        };
        assert!(IndexTarget::from_config(&config).is_err());

        let target = IndexTarget::from_config(&IndexConfig::default()).unwrap();
        assert!(target.api_key.is_none());
        assert_eq!(target.index_name, "fashion-search");
    }
}
