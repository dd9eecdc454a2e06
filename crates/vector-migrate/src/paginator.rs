//! Retrying, bounded page reader over a [`SourceConnector`].

use std::sync::Arc;
use tracing::{debug, warn};

use crate::connectors::{CollectionInfo, Page, ScanOptions, SourceConnector};
use crate::error::Result;
use crate::retry::{with_retry, RetryConfig};

/// Default records per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Reads one collection page by page.
///
/// Every call is read-only, so transient failures are retried with the
/// configured backoff before being escalated.
#[derive(Clone)]
pub struct Paginator {
    source: Arc<dyn SourceConnector>,
    collection: String,
    options: ScanOptions,
    retry: RetryConfig,
}

impl Paginator {
    /// Creates a paginator over `collection`.
    pub fn new(
        source: Arc<dyn SourceConnector>,
        collection: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            source,
            collection: collection.into(),
            options: ScanOptions::default(),
            retry,
        }
    }

    /// Source type name.
    #[must_use]
    pub fn source_type(&self) -> &'static str {
        self.source.source_type()
    }

    /// Descriptor and record count of the collection.
    ///
    /// # Errors
    ///
    /// Returns `SourceNotFound` if the collection is absent, or the last error
    /// once retries are exhausted.
    pub async fn describe(&self) -> Result<CollectionInfo> {
        with_retry(&self.retry, "describe", || {
            self.source.get_collection_info(&self.collection)
        })
        .await
    }

    /// Current record count of the collection.
    ///
    /// # Errors
    ///
    /// Same as [`Paginator::describe`].
    pub async fn count(&self) -> Result<u64> {
        Ok(self.describe().await?.count)
    }

    /// Reads up to `limit` records at cumulative `offset`.
    ///
    /// A page longer than `limit` is cut back to `limit` records.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted.
    pub async fn scan(&self, offset: u64, limit: usize) -> Result<Page> {
        debug!(offset, limit, collection = %self.collection, "scan");

        let mut page = with_retry(&self.retry, "scan", || {
            self.source
                .scan(&self.collection, offset, limit, self.options)
        })
        .await?;

        if page.records.len() > limit {
            warn!(
                "Source returned {} records for a page of {}, truncating",
                page.records.len(),
                limit
            );
            page.records.truncate(limit);
            page.next_offset = Some(offset + limit as u64);
        }
        Ok(page)
    }

    /// Releases source resources held between pages.
    ///
    /// # Errors
    ///
    /// Returns the connector error.
    pub async fn close(&self) -> Result<()> {
        self.source.close().await
    }
}
