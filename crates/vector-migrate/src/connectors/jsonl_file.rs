//! JSON Lines file connector for embedding dumps.
//!
//! Each non-empty line is one record. Pages are streamed from a buffered
//! reader kept between calls, so a sequential scan reads the file once.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::connectors::common::parse_vector_from_json;
use crate::connectors::{
    CollectionDescriptor, CollectionInfo, Distance, Page, Payload, PointId, Record, ScanOptions,
    SourceConnector,
};
use crate::error::{Error, Result};

/// Configuration for a JSONL source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlFileConfig {
    /// Path to the `.jsonl` file.
    pub path: PathBuf,
    /// Logical collection name (defaults to the file stem).
    #[serde(default)]
    pub collection: Option<String>,
    /// Field holding the record id. Lines without a usable id get their
    /// line position as id.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Field holding the embedding.
    #[serde(default = "default_vector_field")]
    pub vector_field: String,
    /// Object field to use as payload instead of the remaining top-level fields.
    #[serde(default)]
    pub payload_field: Option<String>,
    /// Vector dimension. Inferred from the first line when omitted.
    #[serde(default)]
    pub dimension: Option<usize>,
    /// Distance metric to declare for the collection.
    #[serde(default)]
    pub distance: Distance,
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_vector_field() -> String {
    "embedding".to_string()
}

impl JsonlFileConfig {
    /// Creates a config with default field names.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            collection: None,
            id_field: default_id_field(),
            vector_field: default_vector_field(),
            payload_field: None,
            dimension: None,
            distance: Distance::default(),
        }
    }

    /// Collection name exposed by the source.
    #[must_use]
    pub fn collection_name(&self) -> String {
        self.collection.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("jsonl_import")
                .to_string()
        })
    }
}

/// Open reader positioned after `position` records.
struct ReadCursor {
    lines: std::io::Lines<BufReader<File>>,
    position: u64,
    /// Record read ahead to learn whether the scan has more pages.
    pending: Option<String>,
}

impl ReadCursor {
    fn next_record_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        for line in self.lines.by_ref() {
            let line = line?;
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }
}

/// JSONL file as a paginated source.
pub struct JsonlFileSource {
    config: JsonlFileConfig,
    cursor: Mutex<Option<ReadCursor>>,
}

impl JsonlFileSource {
    /// Creates a source connector. The file is opened lazily.
    #[must_use]
    pub fn new(config: JsonlFileConfig) -> Self {
        Self {
            config,
            cursor: Mutex::new(None),
        }
    }

    fn open(&self) -> Result<BufReader<File>> {
        match File::open(&self.config.path) {
            Ok(file) => Ok(BufReader::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::SourceNotFound(
                self.config.path.display().to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn check_collection(&self, collection: &str) -> Result<()> {
        if collection == self.config.collection_name() {
            Ok(())
        } else {
            Err(Error::SourceNotFound(format!(
                "collection '{}' in {}",
                collection,
                self.config.path.display()
            )))
        }
    }

    /// Opens a fresh cursor and skips `offset` records.
    fn seek(&self, offset: u64) -> Result<ReadCursor> {
        debug!("Seeking {} to record {}", self.config.path.display(), offset);
        let mut cursor = ReadCursor {
            lines: self.open()?.lines(),
            position: 0,
            pending: None,
        };
        while cursor.position < offset {
            if cursor.next_record_line()?.is_none() {
                break;
            }
            cursor.position += 1;
        }
        Ok(cursor)
    }

    fn parse_line(&self, line: &str, position: u64, options: ScanOptions) -> Result<Record> {
        let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
            Error::InvalidRecord(format!("record {position}: invalid JSON: {e}"))
        })?;
        let serde_json::Value::Object(mut object) = value else {
            return Err(Error::InvalidRecord(format!(
                "record {position}: line is not a JSON object"
            )));
        };

        let id = object
            .get(&self.config.id_field)
            .and_then(PointId::from_json)
            .unwrap_or(PointId::Num(position));

        let vector = if options.with_vector {
            let raw = object.get(&self.config.vector_field).ok_or_else(|| {
                Error::InvalidRecord(format!(
                    "record {position}: missing field '{}'",
                    self.config.vector_field
                ))
            })?;
            parse_vector_from_json(raw, &self.config.vector_field)?
        } else {
            Vec::new()
        };

        let payload = if !options.with_payload {
            Payload::new()
        } else if let Some(field) = &self.config.payload_field {
            match object.remove(field) {
                Some(serde_json::Value::Object(map)) => map,
                Some(_) => {
                    return Err(Error::InvalidRecord(format!(
                        "record {position}: payload field '{field}' is not an object"
                    )))
                }
                None => Payload::new(),
            }
        } else {
            object.remove(&self.config.id_field);
            object.remove(&self.config.vector_field);
            object
        };

        Ok(Record {
            id,
            vector,
            payload,
        })
    }

    fn count_records(&self) -> Result<u64> {
        let mut count = 0u64;
        for line in self.open()?.lines() {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn infer_dimension(&self) -> Result<Option<usize>> {
        if let Some(dimension) = self.config.dimension {
            return Ok(Some(dimension));
        }
        let mut cursor = self.seek(0)?;
        match cursor.next_record_line()? {
            Some(line) => {
                let record = self.parse_line(&line, 0, ScanOptions::default())?;
                Ok(Some(record.vector.len()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SourceConnector for JsonlFileSource {
    fn source_type(&self) -> &'static str {
        "jsonl_file"
    }

    async fn get_collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        self.check_collection(collection)?;
        let count = self.count_records()?;
        let dimension = self.infer_dimension()?.filter(|d| *d > 0).ok_or_else(|| {
            Error::Config(format!(
                "cannot infer the vector dimension of {}, set 'dimension'",
                self.config.path.display()
            ))
        })?;

        info!(
            "Source file {} holds {} records ({}D)",
            self.config.path.display(),
            count,
            dimension
        );
        Ok(CollectionInfo {
            descriptor: CollectionDescriptor::new(collection, dimension, self.config.distance),
            count,
        })
    }

    async fn scan(
        &self,
        collection: &str,
        offset: u64,
        limit: usize,
        options: ScanOptions,
    ) -> Result<Page> {
        self.check_collection(collection)?;

        let mut guard = self.cursor.lock();
        let mut cursor = match guard.take() {
            Some(c) if c.position == offset => c,
            _ => self.seek(offset)?,
        };
        if cursor.position < offset {
            return Ok(Page::default());
        }

        let mut records = Vec::with_capacity(limit);
        while records.len() < limit {
            let Some(line) = cursor.next_record_line()? else {
                break;
            };
            records.push(self.parse_line(&line, cursor.position, options)?);
            cursor.position += 1;
        }

        cursor.pending = cursor.next_record_line()?;
        let has_more = cursor.pending.is_some();
        *guard = Some(cursor);

        Ok(Page::at(offset, records, has_more))
    }

    async fn close(&self) -> Result<()> {
        *self.cursor.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "jsonl_file_tests.rs"]
mod tests;
