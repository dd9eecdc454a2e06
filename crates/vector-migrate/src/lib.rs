// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # vector-migrate
//!
//! `vector-migrate` is a CLI tool and library that copies collections of
//! vector records (id, embedding, payload) from a paginated source store into
//! a destination store or sink, reporting progress and verifying the result.
//!
//! ## Supported Connectors
//!
//! | Connector | Source | Destination | Notes |
//! |-----------|--------|-------------|-------|
//! | Qdrant | ✅ | ✅ | REST API, `wait=true` upserts |
//! | JSONL file | ✅ | | Embedding dumps, streamed page by page |
//! | JSON export | | ✅ | One `{metadata, points}` document |
//! | Memory | ✅ | ✅ | In-process, for tests and rehearsals |
//!
//! ## Guarantees
//!
//! - Writes are idempotent upserts: a failed run is restarted from the
//!   beginning without duplicating records.
//! - A batch is either fully acknowledged or the run fails.
//! - The destination record count is compared with the source count at the
//!   end; a difference is reported but does not fail the run.
//!
//! ## Quick Start
//!
//! ```bash
//! vector-migrate init --source qdrant --output migration.yaml
//! vector-migrate run --config migration.yaml
//!
//! # Dry run (scan and transform only)
//! vector-migrate run --config migration.yaml --dry-run
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   type: qdrant
//!   url: http://localhost:6333
//!   collection: incidents
//!
//! destination:
//!   type: qdrant
//!   url: https://xyz.cloud.qdrant.io
//!   api_key: your-key
//!
//! options:
//!   batch_size: 100
//!   workers: 2
//! ```
//!
//! ## Library Use
//!
//! ```no_run
//! use std::sync::Arc;
//! use vector_migrate::connectors::memory::MemoryStore;
//! use vector_migrate::{MigrationPlan, Pipeline};
//!
//! # async fn demo(source: MemoryStore) {
//! let target = MemoryStore::new();
//! let pipeline = Pipeline::new(Arc::new(source), Arc::new(target), MigrationPlan::new("docs"));
//! match pipeline.run().await {
//!     Ok(result) => println!("{} records copied", result.migrated_count),
//!     Err(failure) => eprintln!("{failure}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connectors;
pub mod error;
pub mod paginator;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod retry;
pub mod sink;
pub mod transform;

pub use config::{MigrationConfig, MigrationOptions, SourceConfig, TargetConfig};
pub use connectors::{
    CollectionDescriptor, CollectionInfo, Distance, Page, PointId, Record, SourceConnector,
    TargetConnector,
};
pub use error::{Error, ErrorKind, Result};
pub use paginator::Paginator;
pub use pipeline::{
    MigrationFailure, MigrationPhase, MigrationPlan, MigrationResult, MigrationState, Pipeline,
};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use sink::SinkWriter;
pub use transform::Transformer;
