//! Source and target connectors.
//!
//! A migration reads from a [`SourceConnector`] and writes to a
//! [`TargetConnector`]. Both traits are deliberately narrow: the engine only
//! needs paginated reads, schema lookup/creation, idempotent upserts and
//! counts. Retries are applied one layer up, by
//! [`Paginator`](crate::paginator::Paginator) and
//! [`SinkWriter`](crate::sink::SinkWriter).

pub mod common;
pub mod json_export;
pub mod jsonl_file;
pub mod memory;
pub mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::{SourceConfig, TargetConfig};
use crate::error::{Error, Result};

/// Record payload: a JSON object.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Record identifier: unsigned integer or UUID/string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    /// Numeric id.
    Num(u64),
    /// String id (usually a UUID).
    Uuid(String),
}

impl PointId {
    /// Reads an id from a JSON value (number or string).
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_u64().map(Self::Num),
            serde_json::Value::String(s) if !s.is_empty() => Some(Self::Uuid(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Uuid(s) => f.write_str(s),
        }
    }
}

impl From<u64> for PointId {
    fn from(id: u64) -> Self {
        Self::Num(id)
    }
}

impl From<&str> for PointId {
    fn from(id: &str) -> Self {
        Self::Uuid(id.to_string())
    }
}

/// A vector record moved by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier within the collection.
    pub id: PointId,
    /// Embedding vector.
    #[serde(default)]
    pub vector: Vec<f32>,
    /// Metadata/payload.
    #[serde(default)]
    pub payload: Payload,
}

impl Record {
    /// Creates a record.
    #[must_use]
    pub fn new(id: impl Into<PointId>, vector: Vec<f32>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            vector,
            payload,
        }
    }
}

/// Distance metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Cosine similarity (default).
    #[default]
    Cosine,
    /// Dot product.
    #[serde(alias = "dot_product")]
    Dot,
    /// Euclidean distance.
    #[serde(alias = "euclid")]
    Euclidean,
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
            Self::Euclidean => "euclidean",
        })
    }
}

/// Schema of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    /// Collection name.
    pub name: String,
    /// Vector dimension (> 0).
    pub dimension: usize,
    /// Distance metric.
    #[serde(default)]
    pub distance: Distance,
}

impl CollectionDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, dimension: usize, distance: Distance) -> Self {
        Self {
            name: name.into(),
            dimension,
            distance,
        }
    }

    /// Checks that an existing collection can receive records described by `self`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if dimension or metric differ.
    pub fn ensure_compatible(&self, existing: &Self) -> Result<()> {
        if self.dimension != existing.dimension {
            return Err(Error::SchemaMismatch(format!(
                "collection '{}' has dimension {}, expected {}",
                existing.name, existing.dimension, self.dimension
            )));
        }
        if self.distance != existing.distance {
            return Err(Error::SchemaMismatch(format!(
                "collection '{}' uses {} distance, expected {}",
                existing.name, existing.distance, self.distance
            )));
        }
        Ok(())
    }
}

/// Descriptor plus the current record count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Collection schema.
    pub descriptor: CollectionDescriptor,
    /// Number of records currently stored.
    pub count: u64,
}

/// One page of a logical scan.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Records in scan order, at most `limit`.
    pub records: Vec<Record>,
    /// Offset of the next page, `None` when the scan is exhausted.
    pub next_offset: Option<u64>,
}

impl Page {
    /// Builds a page from records read at `offset`, given whether more remain.
    #[must_use]
    pub fn at(offset: u64, records: Vec<Record>, has_more: bool) -> Self {
        let next_offset = (has_more && !records.is_empty()).then(|| offset + records.len() as u64);
        Self {
            records,
            next_offset,
        }
    }

    /// Returns true if this page ends the scan.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next_offset.is_none() || self.records.is_empty()
    }
}

/// What a scan should return alongside ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Include vectors.
    pub with_vector: bool,
    /// Include payloads.
    pub with_payload: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            with_vector: true,
            with_payload: true,
        }
    }
}

/// Acknowledgement of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAck {
    /// Records the destination confirmed as applied.
    pub written: usize,
}

/// Trait for paginated record sources.
///
/// Implement this trait to migrate from a new kind of store.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Get the source type name.
    fn source_type(&self) -> &'static str;

    /// Returns the collection descriptor and record count.
    ///
    /// Returns [`Error::SourceNotFound`] if the collection does not exist.
    async fn get_collection_info(&self, collection: &str) -> Result<CollectionInfo>;

    /// Reads up to `limit` records starting at cumulative `offset`.
    ///
    /// Read-only; safe to call again with the same arguments.
    async fn scan(
        &self,
        collection: &str,
        offset: u64,
        limit: usize,
        options: ScanOptions,
    ) -> Result<Page>;

    /// Close the connection and cleanup resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Trait for idempotent record destinations.
#[async_trait]
pub trait TargetConnector: Send + Sync {
    /// Get the target type name.
    fn target_type(&self) -> &'static str;

    /// Returns the descriptor of `collection`, or `None` if it does not exist.
    async fn get_or_none(&self, collection: &str) -> Result<Option<CollectionDescriptor>>;

    /// Creates a collection matching `descriptor`.
    async fn create(&self, descriptor: &CollectionDescriptor) -> Result<()>;

    /// Inserts or overwrites records by id, returning once they are durable.
    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<WriteAck>;

    /// Exact number of records in `collection`.
    async fn count(&self, collection: &str) -> Result<u64>;

    /// Takes the run-level lock on `collection`.
    ///
    /// The default is a no-op: such targets require the operator not to start
    /// two runs into the same collection.
    async fn acquire_lock(&self, _collection: &str, _run_id: &str) -> Result<()> {
        Ok(())
    }

    /// Releases the lock taken by [`TargetConnector::acquire_lock`].
    async fn release_lock(&self, _collection: &str, _run_id: &str) -> Result<()> {
        Ok(())
    }

    /// Flushes buffered output once all batches are written.
    async fn finish(&self, _collection: &str) -> Result<()> {
        Ok(())
    }
}

/// Creates a source connector from configuration.
pub fn create_source(config: &SourceConfig) -> Result<Arc<dyn SourceConnector>> {
    match config {
        SourceConfig::Qdrant(cfg) => Ok(Arc::new(qdrant::QdrantSource::new(cfg.clone())?)),
        SourceConfig::JsonlFile(cfg) => Ok(Arc::new(jsonl_file::JsonlFileSource::new(cfg.clone()))),
    }
}

/// Creates a target connector from configuration.
pub fn create_target(config: &TargetConfig) -> Result<Arc<dyn TargetConnector>> {
    match config {
        TargetConfig::Qdrant(cfg) => Ok(Arc::new(qdrant::QdrantTarget::new(cfg.clone())?)),
        TargetConfig::JsonFile(cfg) => Ok(Arc::new(json_export::JsonExportTarget::new(cfg.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_untagged_serde() {
        let num: PointId = serde_json::from_str("42").unwrap();
        let uuid: PointId =
            serde_json::from_str("\"5c56c793-69f3-4fbf-87e6-c4bf54c28c26\"").unwrap();

        assert_eq!(num, PointId::Num(42));
        assert!(matches!(uuid, PointId::Uuid(_)));
        assert_eq!(serde_json::to_string(&num).unwrap(), "42");
    }

    #[test]
    fn test_point_id_from_json() {
        assert_eq!(
            PointId::from_json(&serde_json::json!(7)),
            Some(PointId::Num(7))
        );
        assert_eq!(PointId::from_json(&serde_json::json!("")), None);
        assert_eq!(PointId::from_json(&serde_json::json!(-1)), None);
    }

    #[test]
    fn test_record_serialization_defaults() {
        let record: Record = serde_json::from_str(r#"{"id": 1}"#).unwrap();

        assert!(record.vector.is_empty());
        assert!(record.payload.is_empty());
    }

    #[test]
    fn test_distance_aliases() {
        let dot: Distance = serde_json::from_str("\"dot_product\"").unwrap();
        let euclid: Distance = serde_json::from_str("\"euclid\"").unwrap();

        assert_eq!(dot, Distance::Dot);
        assert_eq!(euclid, Distance::Euclidean);
    }

    #[test]
    fn test_descriptor_compatibility() {
        let wanted = CollectionDescriptor::new("docs", 768, Distance::Cosine);

        assert!(wanted.ensure_compatible(&wanted.clone()).is_ok());
        assert!(matches!(
            wanted.ensure_compatible(&CollectionDescriptor::new("docs", 384, Distance::Cosine)),
            Err(Error::SchemaMismatch(_))
        ));
        assert!(matches!(
            wanted.ensure_compatible(&CollectionDescriptor::new("docs", 768, Distance::Dot)),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_page_next_offset() {
        let records = vec![Record::new(1, vec![0.1], Payload::new()); 3];

        assert_eq!(Page::at(10, records.clone(), true).next_offset, Some(13));
        assert_eq!(Page::at(10, records, false).next_offset, None);
        assert!(Page::at(10, Vec::new(), true).is_last());
    }
}
