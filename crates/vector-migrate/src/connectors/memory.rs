//! In-process store implementing both connector traits.
//!
//! Used for rehearsals, tests and benchmarks. Every call is recorded as a
//! [`StoreEvent`], and transient failures or short acknowledgements can be
//! injected to exercise the retry and failure paths.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::connectors::{
    CollectionDescriptor, CollectionInfo, Page, PointId, Record, ScanOptions, SourceConnector,
    TargetConnector, WriteAck,
};
use crate::error::{Error, Result};

/// A call observed by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// `scan` was called.
    Scan {
        /// Collection scanned.
        collection: String,
        /// Requested offset.
        offset: u64,
        /// Requested page size.
        limit: usize,
    },
    /// `create` was called.
    Create {
        /// Created collection.
        collection: String,
        /// Requested dimension.
        dimension: usize,
    },
    /// `upsert` was called.
    Upsert {
        /// Target collection.
        collection: String,
        /// Records in the batch.
        count: usize,
    },
}

/// Call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    /// `scan` calls, including failed attempts.
    pub scans: usize,
    /// `create` calls.
    pub creates: usize,
    /// `upsert` calls, including failed attempts.
    pub upserts: usize,
}

#[derive(Debug)]
struct Collection {
    descriptor: CollectionDescriptor,
    records: Vec<Record>,
    index: HashMap<PointId, usize>,
}

impl Collection {
    fn new(descriptor: CollectionDescriptor) -> Self {
        Self {
            descriptor,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn upsert(&mut self, record: Record) {
        match self.index.get(&record.id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, Collection>,
    events: Vec<StoreEvent>,
    stats: CallStats,
    locks: HashMap<String, String>,
    failing_scans: u32,
    failing_upserts: u32,
    short_acks: u32,
}

/// Thread-safe in-memory vector store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding one collection.
    #[must_use]
    pub fn with_collection(descriptor: CollectionDescriptor, records: Vec<Record>) -> Self {
        let store = Self::new();
        let name = descriptor.name.clone();
        store
            .state
            .lock()
            .collections
            .insert(name.clone(), Collection::new(descriptor));
        store.insert(&name, records);
        store
    }

    /// Writes records directly, bypassing event recording.
    ///
    /// Stands in for another process writing to the same store. Records for
    /// an unknown collection are dropped.
    pub fn insert(&self, collection: &str, records: Vec<Record>) {
        let mut state = self.state.lock();
        if let Some(coll) = state.collections.get_mut(collection) {
            for record in records {
                coll.upsert(record);
            }
        }
    }

    /// Snapshot of the records of `collection`, in insertion order.
    #[must_use]
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.state
            .lock()
            .collections
            .get(collection)
            .map(|c| c.records.clone())
            .unwrap_or_default()
    }

    /// Call counters so far.
    #[must_use]
    pub fn stats(&self) -> CallStats {
        self.state.lock().stats
    }

    /// Calls observed so far.
    #[must_use]
    pub fn events(&self) -> Vec<StoreEvent> {
        self.state.lock().events.clone()
    }

    /// Makes the next `n` scans fail with a transient error.
    pub fn fail_next_scans(&self, n: u32) {
        self.state.lock().failing_scans = n;
    }

    /// Makes the next `n` upserts fail with a transient error.
    pub fn fail_next_upserts(&self, n: u32) {
        self.state.lock().failing_upserts = n;
    }

    /// Makes the next `n` upserts apply and acknowledge one record fewer than sent.
    pub fn short_ack_next_upserts(&self, n: u32) {
        self.state.lock().short_acks = n;
    }
}

#[async_trait]
impl SourceConnector for MemoryStore {
    fn source_type(&self) -> &'static str {
        "memory"
    }

    async fn get_collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        let state = self.state.lock();
        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| Error::SourceNotFound(collection.to_string()))?;
        Ok(CollectionInfo {
            descriptor: coll.descriptor.clone(),
            count: coll.records.len() as u64,
        })
    }

    async fn scan(
        &self,
        collection: &str,
        offset: u64,
        limit: usize,
        options: ScanOptions,
    ) -> Result<Page> {
        let mut state = self.state.lock();
        state.stats.scans += 1;
        state.events.push(StoreEvent::Scan {
            collection: collection.to_string(),
            offset,
            limit,
        });
        if state.failing_scans > 0 {
            state.failing_scans -= 1;
            return Err(Error::TransientNetwork("injected scan failure".to_string()));
        }

        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| Error::SourceNotFound(collection.to_string()))?;
        let len = coll.records.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(limit).min(len);

        let records = coll.records[start..end]
            .iter()
            .map(|r| Record {
                id: r.id.clone(),
                vector: if options.with_vector {
                    r.vector.clone()
                } else {
                    Vec::new()
                },
                payload: if options.with_payload {
                    r.payload.clone()
                } else {
                    Default::default()
                },
            })
            .collect();

        Ok(Page::at(offset, records, end < len))
    }
}

#[async_trait]
impl TargetConnector for MemoryStore {
    fn target_type(&self) -> &'static str {
        "memory"
    }

    async fn get_or_none(&self, collection: &str) -> Result<Option<CollectionDescriptor>> {
        Ok(self
            .state
            .lock()
            .collections
            .get(collection)
            .map(|c| c.descriptor.clone()))
    }

    async fn create(&self, descriptor: &CollectionDescriptor) -> Result<()> {
        let mut state = self.state.lock();
        state.stats.creates += 1;
        state.events.push(StoreEvent::Create {
            collection: descriptor.name.clone(),
            dimension: descriptor.dimension,
        });
        if state.collections.contains_key(&descriptor.name) {
            return Err(Error::Http(format!(
                "collection '{}' already exists",
                descriptor.name
            )));
        }
        state
            .collections
            .insert(descriptor.name.clone(), Collection::new(descriptor.clone()));
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<WriteAck> {
        let mut state = self.state.lock();
        state.stats.upserts += 1;
        state.events.push(StoreEvent::Upsert {
            collection: collection.to_string(),
            count: records.len(),
        });
        if state.failing_upserts > 0 {
            state.failing_upserts -= 1;
            return Err(Error::TransientNetwork(
                "injected upsert failure".to_string(),
            ));
        }

        let keep = if state.short_acks > 0 {
            state.short_acks -= 1;
            records.len().saturating_sub(1)
        } else {
            records.len()
        };

        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| Error::Http(format!("collection '{collection}' not found")))?;
        for record in &records[..keep] {
            coll.upsert(record.clone());
        }
        Ok(WriteAck { written: keep })
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.state
            .lock()
            .collections
            .get(collection)
            .map(|c| c.records.len() as u64)
            .ok_or_else(|| Error::Http(format!("collection '{collection}' not found")))
    }

    async fn acquire_lock(&self, collection: &str, run_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        match state.locks.get(collection) {
            Some(holder) if holder != run_id => Err(Error::LockHeld {
                destination: collection.to_string(),
                release: format!("release the lock held by run '{holder}'"),
            }),
            _ => {
                state
                    .locks
                    .insert(collection.to_string(), run_id.to_string());
                Ok(())
            }
        }
    }

    async fn release_lock(&self, collection: &str, run_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.locks.get(collection).is_some_and(|h| h == run_id) {
            state.locks.remove(collection);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{Distance, Payload};

    fn desc() -> CollectionDescriptor {
        CollectionDescriptor::new("docs", 1, Distance::Cosine)
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let store = MemoryStore::with_collection(desc(), Vec::new());
        let v1 = Record::new(1, vec![0.1], Payload::new());
        let v2 = Record::new(1, vec![0.9], Payload::new());

        store.upsert("docs", &[v1]).await.unwrap();
        store.upsert("docs", &[v2]).await.unwrap();

        let records = store.records("docs");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vector, vec![0.9]);
    }

    #[tokio::test]
    async fn test_scan_without_vectors() {
        let store =
            MemoryStore::with_collection(desc(), vec![Record::new(1, vec![0.1], Payload::new())]);
        let options = ScanOptions {
            with_vector: false,
            with_payload: true,
        };

        let page = store.scan("docs", 0, 10, options).await.unwrap();

        assert!(page.records[0].vector.is_empty());
        assert!(page.next_offset.is_none());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let store = MemoryStore::with_collection(desc(), Vec::new());

        store.acquire_lock("docs", "run-a").await.unwrap();
        assert!(matches!(
            store.acquire_lock("docs", "run-b").await,
            Err(Error::LockHeld { .. })
        ));
        store.release_lock("docs", "run-a").await.unwrap();
        assert!(store.acquire_lock("docs", "run-b").await.is_ok());
    }
}
