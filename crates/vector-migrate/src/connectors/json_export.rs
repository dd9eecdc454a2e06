//! JSON export target.
//!
//! Writes one collection to a single JSON document:
//!
//! ```json
//! {
//!   "metadata": {"collection": "incidents", "exported_at": "...", "total_points": 2,
//!                "dimension": 3, "distance": "cosine"},
//!   "points": [{"id": 1, "vector": [0.1, 0.2, 0.3], "payload": {}}]
//! }
//! ```
//!
//! Records are buffered by id and the document is replaced atomically when
//! the run finishes. An existing export is loaded first, so replaying a run
//! upserts into it instead of duplicating points.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::connectors::{
    CollectionDescriptor, Distance, PointId, Record, TargetConnector, WriteAck,
};
use crate::error::{Error, Result};

/// Configuration for a JSON export destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonExportConfig {
    /// Output file.
    pub path: PathBuf,
    /// Collection name recorded in the export (defaults to the source collection).
    #[serde(default)]
    pub collection: Option<String>,
    /// Pretty-print the document.
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_pretty() -> bool {
    true
}

impl JsonExportConfig {
    /// Creates a config writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            collection: None,
            pretty: true,
        }
    }
}

/// Header of an export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Collection name.
    pub collection: String,
    /// RFC 3339 timestamp of the write.
    pub exported_at: String,
    /// Number of points in the document.
    pub total_points: u64,
    /// Vector dimension.
    pub dimension: usize,
    /// Distance metric.
    #[serde(default)]
    pub distance: Distance,
}

/// A complete export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Header.
    pub metadata: ExportMetadata,
    /// Exported records.
    pub points: Vec<Record>,
}

impl ExportDocument {
    /// Reads an export document from disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened, or a JSON error if
    /// it is not an export document.
    pub fn read(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[derive(Debug, Default)]
struct ExportState {
    loaded: bool,
    descriptor: Option<CollectionDescriptor>,
    points: Vec<Record>,
    index: HashMap<PointId, usize>,
}

impl ExportState {
    fn upsert(&mut self, record: Record) {
        match self.index.get(&record.id) {
            Some(&pos) => self.points[pos] = record,
            None => {
                self.index.insert(record.id.clone(), self.points.len());
                self.points.push(record);
            }
        }
    }

    fn collection(&self, name: &str) -> Option<&CollectionDescriptor> {
        self.descriptor.as_ref().filter(|d| d.name == name)
    }
}

/// JSON file as a migration destination.
pub struct JsonExportTarget {
    config: JsonExportConfig,
    state: Mutex<ExportState>,
}

impl JsonExportTarget {
    /// Creates a target connector. Nothing is read until first use.
    #[must_use]
    pub fn new(config: JsonExportConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ExportState::default()),
        }
    }

    /// Output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self.config.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Locks the state, loading a previous export on first access.
    fn state(&self) -> Result<MutexGuard<'_, ExportState>> {
        let mut state = self.state.lock();
        if state.loaded {
            return Ok(state);
        }
        state.loaded = true;

        match ExportDocument::read(&self.config.path) {
            Ok(doc) => {
                debug!(
                    "Loaded {} existing points from {}",
                    doc.points.len(),
                    self.config.path.display()
                );
                state.descriptor = Some(CollectionDescriptor::new(
                    doc.metadata.collection,
                    doc.metadata.dimension,
                    doc.metadata.distance,
                ));
                for record in doc.points {
                    state.upsert(record);
                }
            }
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                state.loaded = false;
                return Err(e);
            }
        }
        Ok(state)
    }

    fn write_document(&self, doc: &ExportDocument) -> Result<()> {
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.sibling(".tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            if self.config.pretty {
                serde_json::to_writer_pretty(&mut writer, doc)?;
            } else {
                serde_json::to_writer(&mut writer, doc)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.config.path)?;
        Ok(())
    }
}

#[async_trait]
impl TargetConnector for JsonExportTarget {
    fn target_type(&self) -> &'static str {
        "json_file"
    }

    async fn get_or_none(&self, collection: &str) -> Result<Option<CollectionDescriptor>> {
        Ok(self.state()?.collection(collection).cloned())
    }

    async fn create(&self, descriptor: &CollectionDescriptor) -> Result<()> {
        let mut state = self.state()?;
        if let Some(existing) = &state.descriptor {
            return Err(Error::Http(format!(
                "{} already holds collection '{}'",
                self.config.path.display(),
                existing.name
            )));
        }
        state.descriptor = Some(descriptor.clone());
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<WriteAck> {
        let mut state = self.state()?;
        if state.collection(collection).is_none() {
            return Err(Error::Http(format!(
                "collection '{collection}' not found in {}",
                self.config.path.display()
            )));
        }
        for record in records {
            state.upsert(record.clone());
        }
        Ok(WriteAck {
            written: records.len(),
        })
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let state = self.state()?;
        match state.collection(collection) {
            Some(_) => Ok(state.points.len() as u64),
            None => Err(Error::Http(format!(
                "collection '{collection}' not found in {}",
                self.config.path.display()
            ))),
        }
    }

    async fn acquire_lock(&self, collection: &str, run_id: &str) -> Result<()> {
        let lock = self.sibling(".lock");
        if let Some(parent) = lock.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(mut file) => {
                file.write_all(run_id.as_bytes())?;
                info!("Acquired export lock {} for run {}", lock.display(), run_id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::LockHeld {
                destination: collection.to_string(),
                release: format!("remove the lock file {}", lock.display()),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_lock(&self, _collection: &str, run_id: &str) -> Result<()> {
        let lock = self.sibling(".lock");
        match fs::read_to_string(&lock) {
            Ok(holder) if holder == run_id => {
                fs::remove_file(&lock)?;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn finish(&self, collection: &str) -> Result<()> {
        let state = self.state()?;
        let Some(descriptor) = state.collection(collection) else {
            return Ok(());
        };

        let doc = ExportDocument {
            metadata: ExportMetadata {
                collection: descriptor.name.clone(),
                exported_at: Utc::now().to_rfc3339(),
                total_points: state.points.len() as u64,
                dimension: descriptor.dimension,
                distance: descriptor.distance,
            },
            points: state.points.clone(),
        };
        self.write_document(&doc)?;
        info!(
            "Exported {} points to {}",
            doc.metadata.total_points,
            self.config.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "json_export_tests.rs"]
mod tests;
