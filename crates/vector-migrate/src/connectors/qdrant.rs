//! Qdrant connectors over the REST API.
//!
//! [`QdrantSource`] reads a collection with `points/scroll`. Qdrant paginates
//! with an opaque point-id cursor (`next_page_offset`); the connector keeps
//! the cursor of the last page so that cumulative offsets map onto it, and
//! re-walks the collection from the start for any other offset.
//!
//! [`QdrantTarget`] writes with `PUT points?wait=true`, so a returned batch is
//! applied and visible to the verification count.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{QdrantConfig, QdrantTargetConfig};
use crate::connectors::common::{
    create_http_client, handle_http_error, parse_vector_from_json, validate_url,
};
use crate::connectors::{
    CollectionDescriptor, CollectionInfo, Distance, Page, Payload, PointId, Record, ScanOptions,
    SourceConnector, TargetConnector, WriteAck,
};
use crate::error::{Error, Result};

/// Page size used when walking the collection to reach an offset.
const SEEK_PAGE: usize = 1000;

/// Suffix of the marker collection that locks a destination collection.
pub const LOCK_SUFFIX: &str = "__migration_lock";

/// Envelope of every Qdrant response.
#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionInfoResult {
    #[serde(default)]
    points_count: Option<u64>,
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: VectorsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VectorsConfig {
    Single(VectorParams),
    Named(HashMap<String, VectorParams>),
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest {
    vectors: VectorParams,
}

#[derive(Debug, Serialize)]
struct ScrollRequest {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<PointId>,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<ScrolledPoint>,
    #[serde(default)]
    next_page_offset: Option<PointId>,
}

#[derive(Debug, Deserialize)]
struct ScrolledPoint {
    id: PointId,
    #[serde(default)]
    vector: Option<serde_json::Value>,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: &'a [Record],
}

#[derive(Debug, Deserialize)]
struct UpdateResult {
    status: String,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

fn distance_from_qdrant(name: &str) -> Result<Distance> {
    match name {
        "Cosine" => Ok(Distance::Cosine),
        "Dot" => Ok(Distance::Dot),
        "Euclid" => Ok(Distance::Euclidean),
        other => Err(Error::SchemaMismatch(format!(
            "unsupported Qdrant distance '{other}'"
        ))),
    }
}

fn distance_to_qdrant(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "Cosine",
        Distance::Dot => "Dot",
        Distance::Euclidean => "Euclid",
    }
}

/// Thin REST client shared by the source and target connectors.
struct QdrantClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantClient {
    fn new(url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        validate_url(url)?;
        Ok(Self {
            client: create_http_client(Duration::from_secs(timeout_secs)),
            base_url: url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build a request with optional API key header.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.client.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    /// Sends a request and returns the raw response, mapping transport failures.
    async fn send(&self, req: RequestBuilder, context: &str) -> Result<reqwest::Response> {
        req.send()
            .await
            .map_err(|e| Error::from_transport(context, &e))
    }

    /// Turns a non-success response into an error.
    async fn error_from(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        handle_http_error(status, retry_after, &body, "Qdrant")
    }

    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder, context: &str) -> Result<T> {
        let response = self.send(req, context).await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        let envelope: QdrantResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("{context}: failed to parse response: {e}")))?;
        Ok(envelope.result)
    }

    /// Collection descriptor and approximate point count, `None` on 404.
    async fn collection(&self, name: &str) -> Result<Option<(CollectionDescriptor, u64)>> {
        let response = self
            .send(
                self.request(Method::GET, &format!("/collections/{name}")),
                "get collection",
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let envelope: QdrantResponse<CollectionInfoResult> = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("failed to parse collection info: {e}")))?;
        let info = envelope.result;

        let params = match info.config.params.vectors {
            VectorsConfig::Single(params) => params,
            VectorsConfig::Named(mut named) if named.len() == 1 => {
                match named.drain().next() {
                    Some((_, params)) => params,
                    None => return Err(Error::SchemaMismatch("empty vectors config".to_string())),
                }
            }
            VectorsConfig::Named(named) => {
                return Err(Error::SchemaMismatch(format!(
                    "collection '{name}' has {} named vectors, only one is supported",
                    named.len()
                )))
            }
        };

        let descriptor = CollectionDescriptor::new(
            name,
            params.size,
            distance_from_qdrant(&params.distance)?,
        );
        Ok(Some((descriptor, info.points_count.unwrap_or(0))))
    }

    async fn exact_count(&self, name: &str) -> Result<u64> {
        let result: CountResult = self
            .call(
                self.request(Method::POST, &format!("/collections/{name}/points/count"))
                    .json(&serde_json::json!({ "exact": true })),
                "count points",
            )
            .await?;
        Ok(result.count)
    }

    async fn scroll(
        &self,
        name: &str,
        cursor: Option<PointId>,
        limit: usize,
        options: ScanOptions,
    ) -> Result<ScrollResult> {
        let body = ScrollRequest {
            limit,
            offset: cursor,
            with_payload: options.with_payload,
            with_vector: options.with_vector,
        };
        self.call(
            self.request(Method::POST, &format!("/collections/{name}/points/scroll"))
                .json(&body),
            "scroll points",
        )
        .await
    }

    async fn create_collection(&self, name: &str, params: VectorParams) -> Result<reqwest::Response> {
        self.send(
            self.request(Method::PUT, &format!("/collections/{name}"))
                .json(&CreateCollectionRequest { vectors: params }),
            "create collection",
        )
        .await
    }
}

/// Position reached by the last successful scroll.
#[derive(Debug, Clone)]
struct Cursor {
    collection: String,
    position: u64,
    next: Option<PointId>,
}

/// Qdrant collection as a paginated source.
pub struct QdrantSource {
    client: QdrantClient,
    cursor: Mutex<Option<Cursor>>,
}

impl QdrantSource {
    /// Creates a source connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid.
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let client = QdrantClient::new(&config.url, config.api_key.clone(), config.timeout_secs)?;
        Ok(Self {
            client,
            cursor: Mutex::new(None),
        })
    }

    /// Resolves the scroll cursor for `offset`, walking from the start if needed.
    ///
    /// Returns `None` when the collection ends at or before `offset`;
    /// `Some(None)` is the start of the collection.
    async fn cursor_for(&self, collection: &str, offset: u64) -> Result<Option<Option<PointId>>> {
        if offset == 0 {
            return Ok(Some(None));
        }
        let cached = self.cursor.lock().clone();
        if let Some(c) = cached {
            if c.collection == collection && c.position == offset {
                return Ok(c.next.map(Some));
            }
        }

        debug!("Seeking '{}' to offset {}", collection, offset);
        let skip_options = ScanOptions {
            with_vector: false,
            with_payload: false,
        };
        let mut position = 0u64;
        let mut cursor: Option<PointId> = None;
        while position < offset {
            let step = usize::try_from(offset - position)
                .unwrap_or(SEEK_PAGE)
                .min(SEEK_PAGE);
            let result = self
                .client
                .scroll(collection, cursor.clone(), step, skip_options)
                .await?;
            position += result.points.len() as u64;
            match result.next_page_offset {
                Some(next) if !result.points.is_empty() => cursor = Some(next),
                _ => return Ok(None),
            }
        }
        Ok(Some(cursor))
    }
}

#[async_trait]
impl SourceConnector for QdrantSource {
    fn source_type(&self) -> &'static str {
        "qdrant"
    }

    async fn get_collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        let (descriptor, _) = self
            .client
            .collection(collection)
            .await?
            .ok_or_else(|| Error::SourceNotFound(collection.to_string()))?;
        let count = self.client.exact_count(collection).await?;
        info!(
            "Source collection '{}' has {} points ({}D, {})",
            collection, count, descriptor.dimension, descriptor.distance
        );
        Ok(CollectionInfo { descriptor, count })
    }

    async fn scan(
        &self,
        collection: &str,
        offset: u64,
        limit: usize,
        options: ScanOptions,
    ) -> Result<Page> {
        let Some(cursor) = self.cursor_for(collection, offset).await? else {
            return Ok(Page::default());
        };

        let result = self.client.scroll(collection, cursor, limit, options).await?;

        let mut records = Vec::with_capacity(result.points.len());
        for point in result.points {
            let vector = match (&point.vector, options.with_vector) {
                (Some(v), true) => parse_vector_from_json(v, "vector")?,
                (None, true) => {
                    return Err(Error::InvalidRecord(format!(
                        "point {} has no vector",
                        point.id
                    )))
                }
                (_, false) => Vec::new(),
            };
            records.push(Record {
                id: point.id,
                vector,
                payload: point.payload.unwrap_or_default(),
            });
        }

        let has_more = result.next_page_offset.is_some();
        *self.cursor.lock() = Some(Cursor {
            collection: collection.to_string(),
            position: offset + records.len() as u64,
            next: result.next_page_offset,
        });

        Ok(Page::at(offset, records, has_more))
    }
}

/// Qdrant collection as an idempotent destination.
pub struct QdrantTarget {
    client: QdrantClient,
}

impl QdrantTarget {
    /// Creates a target connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid.
    pub fn new(config: QdrantTargetConfig) -> Result<Self> {
        let client = QdrantClient::new(&config.url, config.api_key.clone(), config.timeout_secs)?;
        Ok(Self { client })
    }

    fn lock_name(collection: &str) -> String {
        format!("{collection}{LOCK_SUFFIX}")
    }
}

#[async_trait]
impl TargetConnector for QdrantTarget {
    fn target_type(&self) -> &'static str {
        "qdrant"
    }

    async fn get_or_none(&self, collection: &str) -> Result<Option<CollectionDescriptor>> {
        Ok(self.client.collection(collection).await?.map(|(d, _)| d))
    }

    async fn create(&self, descriptor: &CollectionDescriptor) -> Result<()> {
        let params = VectorParams {
            size: descriptor.dimension,
            distance: distance_to_qdrant(descriptor.distance).to_string(),
        };
        let response = self.client.create_collection(&descriptor.name, params).await?;
        if !response.status().is_success() {
            return Err(QdrantClient::error_from(response).await);
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<WriteAck> {
        let result: UpdateResult = self
            .client
            .call(
                self.client
                    .request(
                        Method::PUT,
                        &format!("/collections/{collection}/points?wait=true"),
                    )
                    .json(&UpsertRequest { points: records }),
                "upsert points",
            )
            .await?;

        let written = if result.status == "completed" {
            records.len()
        } else {
            0
        };
        Ok(WriteAck { written })
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.client.exact_count(collection).await
    }

    async fn acquire_lock(&self, collection: &str, run_id: &str) -> Result<()> {
        let lock = Self::lock_name(collection);
        let params = VectorParams {
            size: 1,
            distance: "Cosine".to_string(),
        };
        let response = self.client.create_collection(&lock, params).await?;
        if response.status().is_success() {
            info!("Acquired destination lock '{}' for run {}", lock, run_id);
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || body.contains("already exists") {
            return Err(Error::LockHeld {
                destination: collection.to_string(),
                release: format!(
                    "delete the marker collection '{lock}' (DELETE /collections/{lock})"
                ),
            });
        }
        Err(handle_http_error(status.as_u16(), None, &body, "Qdrant"))
    }

    async fn release_lock(&self, collection: &str, run_id: &str) -> Result<()> {
        let lock = Self::lock_name(collection);
        let response = self
            .client
            .send(
                self.client
                    .request(Method::DELETE, &format!("/collections/{lock}")),
                "delete lock",
            )
            .await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(QdrantClient::error_from(response).await);
        }
        debug!("Released destination lock '{}' for run {}", lock, run_id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "qdrant_tests.rs"]
mod tests;
