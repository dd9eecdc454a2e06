//! Schema-aware, retrying batch writer over a [`TargetConnector`].

use std::sync::Arc;
use tracing::{debug, info};

use crate::connectors::{CollectionDescriptor, Record, TargetConnector};
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryConfig};

/// Outcome of [`SinkWriter::ensure_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaAction {
    /// The collection was created.
    Created,
    /// A compatible collection already existed.
    Existing,
}

/// Writes batches into the destination with upsert semantics.
#[derive(Clone)]
pub struct SinkWriter {
    target: Arc<dyn TargetConnector>,
    retry: RetryConfig,
}

impl SinkWriter {
    /// Creates a writer.
    pub fn new(target: Arc<dyn TargetConnector>, retry: RetryConfig) -> Self {
        Self { target, retry }
    }

    /// Target type name.
    #[must_use]
    pub fn target_type(&self) -> &'static str {
        self.target.target_type()
    }

    /// Makes sure the destination collection exists and matches `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if an existing collection differs in
    /// dimension or metric. It is never altered.
    pub async fn ensure_schema(&self, descriptor: &CollectionDescriptor) -> Result<SchemaAction> {
        let existing = with_retry(&self.retry, "get_collection", || {
            self.target.get_or_none(&descriptor.name)
        })
        .await?;

        if let Some(existing) = existing {
            descriptor.ensure_compatible(&existing)?;
            info!("Collection '{}' already exists on target", descriptor.name);
            return Ok(SchemaAction::Existing);
        }

        info!(
            "Creating collection '{}' on target ({}D, {})",
            descriptor.name, descriptor.dimension, descriptor.distance
        );
        with_retry(&self.retry, "create_collection", || {
            self.target.create(descriptor)
        })
        .await?;
        Ok(SchemaAction::Created)
    }

    /// Upserts one batch and waits for acknowledgement.
    ///
    /// Returns the number of records written, always `records.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] if a vector has the wrong dimension,
    /// [`Error::PartialBatchWrite`] if the destination acknowledged fewer
    /// records than sent, or the last transport error once retries are
    /// exhausted.
    pub async fn write_batch(
        &self,
        collection: &str,
        dimension: usize,
        records: &[Record],
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
            return Err(Error::InvalidRecord(format!(
                "record {} has {} dimensions, collection '{}' expects {}",
                bad.id,
                bad.vector.len(),
                collection,
                dimension
            )));
        }

        let ack = with_retry(&self.retry, "upsert", || {
            self.target.upsert(collection, records)
        })
        .await?;

        if ack.written != records.len() {
            return Err(Error::PartialBatchWrite {
                written: ack.written,
                expected: records.len(),
            });
        }
        debug!("Upserted {} records into '{}'", ack.written, collection);
        Ok(ack.written)
    }

    /// Exact record count of `collection`.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted.
    pub async fn count(&self, collection: &str) -> Result<u64> {
        with_retry(&self.retry, "count", || self.target.count(collection)).await
    }

    /// Takes the run-level destination lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockHeld`] if another run owns it.
    pub async fn acquire_lock(&self, collection: &str, run_id: &str) -> Result<()> {
        self.target.acquire_lock(collection, run_id).await
    }

    /// Releases the run-level destination lock.
    ///
    /// # Errors
    ///
    /// Returns the connector error if the lock could not be removed.
    pub async fn release_lock(&self, collection: &str, run_id: &str) -> Result<()> {
        with_retry(&self.retry, "release_lock", || {
            self.target.release_lock(collection, run_id)
        })
        .await
    }

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Returns the connector error if the flush fails.
    pub async fn finish(&self, collection: &str) -> Result<()> {
        self.target.finish(collection).await
    }
}
