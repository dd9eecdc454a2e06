//! Migration pipeline orchestration.
//!
//! A run moves through [`MigrationPhase`]s: the source is described, the
//! destination is locked and its schema ensured, pages are scanned
//! sequentially and handed to a bounded pool of writer tasks, and finally the
//! destination count is compared with the source count captured at start.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MigrationConfig;
use crate::connectors::{
    create_source, create_target, CollectionDescriptor, Distance, Record, SourceConnector,
    TargetConnector,
};
use crate::error::{Error, Result};
use crate::paginator::{Paginator, DEFAULT_PAGE_SIZE};
use crate::progress::ProgressReporter;
use crate::retry::RetryConfig;
use crate::sink::{SchemaAction, SinkWriter};
use crate::transform::{TransformConfig, Transformer};

/// Everything a run needs besides its connectors.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Collection read from the source.
    pub source_collection: String,
    /// Collection written on the destination.
    pub target_collection: String,
    /// Records per page.
    pub batch_size: usize,
    /// Concurrent writer tasks.
    pub workers: usize,
    /// Batches scanned ahead of the writers.
    pub max_in_flight: usize,
    /// Maximum number of records to move.
    pub limit: Option<u64>,
    /// Scan and transform without writing.
    pub dry_run: bool,
    /// Destination dimension; the source dimension when `None`.
    pub dimension: Option<usize>,
    /// Destination metric; the source metric when `None`.
    pub distance: Option<Distance>,
    /// Retry policy for source and destination calls.
    pub retry: RetryConfig,
    /// Record transformation rules.
    pub transform: TransformConfig,
}

impl MigrationPlan {
    /// Plan copying `collection` to a collection of the same name with
    /// default settings.
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        let collection = collection.into();
        Self {
            source_collection: collection.clone(),
            target_collection: collection,
            batch_size: DEFAULT_PAGE_SIZE,
            workers: 2,
            max_in_flight: 2,
            limit: None,
            dry_run: false,
            dimension: None,
            distance: None,
            retry: RetryConfig::default(),
            transform: TransformConfig::default(),
        }
    }
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Resolving descriptors, lock and schema.
    Init,
    /// Fetching the next page.
    Scanning,
    /// Transforming and writing batches.
    Transferring,
    /// Comparing counts.
    Verifying,
    /// Finished, possibly with a count mismatch.
    Succeeded,
    /// Stopped by a fatal error.
    Failed,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "INIT",
            Self::Scanning => "SCANNING",
            Self::Transferring => "TRANSFERRING",
            Self::Verifying => "VERIFYING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        })
    }
}

/// Mutable counters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationState {
    /// Offset below which every record has been acknowledged by the
    /// destination.
    pub offset: u64,
    /// Records read from the source so far, including batches still being
    /// written.
    pub scanned_offset: u64,
    /// Records acknowledged by the destination.
    pub migrated_count: u64,
    /// Records expected, captured at start.
    pub total_count: u64,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
}

impl MigrationState {
    fn new() -> Self {
        Self {
            offset: 0,
            scanned_offset: 0,
            migrated_count: 0,
            total_count: 0,
            started_at: Utc::now(),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationResult {
    /// Destination collection.
    pub collection: String,
    /// Records expected from the source.
    pub source_count: u64,
    /// Records counted on the destination after the transfer.
    pub target_count: u64,
    /// Records written during this run.
    pub migrated_count: u64,
    /// Batches transferred.
    pub batches: u64,
    /// Run duration in seconds.
    pub duration_seconds: f64,
    /// Vector dimension.
    pub dimension: usize,
    /// Source and destination counts differ.
    pub mismatch: bool,
    /// Nothing was written.
    pub dry_run: bool,
}

impl MigrationResult {
    /// Records written per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_seconds > 0.0 {
            self.migrated_count as f64 / self.duration_seconds
        } else {
            0.0
        }
    }
}

/// A run that ended in [`MigrationPhase::Failed`].
#[derive(Debug, thiserror::Error)]
#[error(
    "migration failed during {phase} at offset {} ({} of {} records written): {error}",
    .state.offset,
    .state.migrated_count,
    .state.total_count
)]
pub struct MigrationFailure {
    /// Cause of the failure.
    pub error: Error,
    /// Phase the run was in.
    pub phase: MigrationPhase,
    /// Counters at the time of failure.
    pub state: MigrationState,
}

struct RunContext {
    phase: MigrationPhase,
    state: MigrationState,
    locked: Option<String>,
    batches: u64,
    /// Acknowledged batches past `state.offset`, keyed by start offset.
    landed: BTreeMap<u64, u64>,
}

impl RunContext {
    fn enter(&mut self, phase: MigrationPhase) {
        if self.phase != phase {
            debug!("Migration phase {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Records an acknowledged batch and advances `state.offset` over every
    /// contiguous acknowledged span.
    fn acknowledge(&mut self, span: Range<u64>) {
        self.landed.insert(span.start, span.end);
        while let Some(end) = self.landed.remove(&self.state.offset) {
            self.state.offset = end;
        }
    }
}

/// Migration pipeline.
pub struct Pipeline {
    paginator: Paginator,
    sink: SinkWriter,
    transformer: Arc<Transformer>,
    plan: MigrationPlan,
    cancel: CancellationToken,
    show_progress: bool,
    run_id: String,
}

impl Pipeline {
    /// Creates a pipeline over injected connectors.
    pub fn new(
        source: Arc<dyn SourceConnector>,
        target: Arc<dyn TargetConnector>,
        plan: MigrationPlan,
    ) -> Self {
        Self {
            paginator: Paginator::new(source, plan.source_collection.clone(), plan.retry.clone()),
            sink: SinkWriter::new(target, plan.retry.clone()),
            transformer: Arc::new(Transformer::new(plan.transform.clone())),
            plan,
            cancel: CancellationToken::new(),
            show_progress: false,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Creates a pipeline from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a connector
    /// cannot be created.
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        config.validate()?;
        let source = create_source(&config.source)?;
        let target = create_target(&config.destination)?;
        Ok(Self::new(source, target, config.plan()))
    }

    /// Stops the run between batches once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Shows a terminal progress bar.
    #[must_use]
    pub fn with_progress(mut self, visible: bool) -> Self {
        self.show_progress = visible;
        self
    }

    /// Identifier of this run, used as the destination lock owner.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The plan being executed.
    #[must_use]
    pub fn plan(&self) -> &MigrationPlan {
        &self.plan
    }

    /// Runs the migration to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`MigrationFailure`] carrying the error, the phase and the
    /// counters reached. The destination lock is released either way.
    pub async fn run(&self) -> std::result::Result<MigrationResult, MigrationFailure> {
        info!(
            "Starting migration: {} '{}' -> {} '{}' (run {})",
            self.paginator.source_type(),
            self.plan.source_collection,
            self.sink.target_type(),
            self.plan.target_collection,
            self.run_id
        );

        let mut ctx = RunContext {
            phase: MigrationPhase::Init,
            state: MigrationState::new(),
            locked: None,
            batches: 0,
            landed: BTreeMap::new(),
        };
        let outcome = self.execute(&mut ctx).await;

        if let Some(collection) = ctx.locked.take() {
            if let Err(e) = self.sink.release_lock(&collection, &self.run_id).await {
                warn!("Failed to release lock on '{}': {}", collection, e);
            }
        }
        if let Err(e) = self.paginator.close().await {
            debug!("Source close failed: {}", e);
        }

        match outcome {
            Ok(result) => Ok(result),
            Err(error) => {
                let phase = ctx.phase;
                ctx.enter(MigrationPhase::Failed);
                error!(
                    "Migration failed during {} ({}): {} | last offset {}, {}/{} written",
                    phase,
                    error.kind(),
                    error,
                    ctx.state.offset,
                    ctx.state.migrated_count,
                    ctx.state.total_count
                );
                Err(MigrationFailure {
                    error,
                    phase,
                    state: ctx.state,
                })
            }
        }
    }

    async fn execute(&self, ctx: &mut RunContext) -> Result<MigrationResult> {
        let started = Instant::now();

        let info = self.paginator.describe().await?;
        let source_count = info.count;
        let total = self
            .plan
            .limit
            .map_or(source_count, |limit| limit.min(source_count));
        ctx.state.total_count = total;

        let descriptor = self.target_descriptor(&info.descriptor)?;
        if self.plan.dry_run {
            info!("Dry run mode - not writing to destination");
        } else {
            self.sink
                .acquire_lock(&descriptor.name, &self.run_id)
                .await?;
            ctx.locked = Some(descriptor.name.clone());
            if self.sink.ensure_schema(&descriptor).await? == SchemaAction::Created {
                debug!("Destination collection '{}' created", descriptor.name);
            }
        }

        let progress = ProgressReporter::new(total, self.show_progress);
        if total == 0 {
            info!("Source collection is empty, nothing to transfer");
            progress.record(0, 0);
        } else if let Err(e) = self.transfer(ctx, &descriptor, &progress).await {
            progress.abandon("Migration failed");
            return Err(e);
        }
        progress.finish("Transfer complete");

        ctx.enter(MigrationPhase::Verifying);
        let target_count = if self.plan.dry_run {
            ctx.state.migrated_count
        } else {
            self.sink.finish(&descriptor.name).await?;
            self.sink.count(&descriptor.name).await?
        };

        let mismatch = target_count != total;
        if mismatch {
            warn!(
                "Count mismatch: source {} vs target {} in '{}'",
                total, target_count, descriptor.name
            );
        } else {
            info!("Verification passed: {} points in '{}'", target_count, descriptor.name);
        }

        ctx.enter(MigrationPhase::Succeeded);
        let result = MigrationResult {
            collection: descriptor.name,
            source_count: total,
            target_count,
            migrated_count: ctx.state.migrated_count,
            batches: ctx.batches,
            duration_seconds: started.elapsed().as_secs_f64(),
            dimension: descriptor.dimension,
            mismatch,
            dry_run: self.plan.dry_run,
        };
        info!(
            "Migration complete: {} migrated in {} batches, {:.2}s ({:.0} pts/sec)",
            result.migrated_count,
            result.batches,
            result.duration_seconds,
            result.throughput()
        );
        Ok(result)
    }

    /// Destination descriptor, filling unset fields from the source.
    fn target_descriptor(&self, source: &CollectionDescriptor) -> Result<CollectionDescriptor> {
        let dimension = self.plan.dimension.unwrap_or(source.dimension);
        if dimension != source.dimension {
            return Err(Error::SchemaMismatch(format!(
                "source '{}' has dimension {}, destination is configured for {}",
                source.name, source.dimension, dimension
            )));
        }
        Ok(CollectionDescriptor::new(
            self.plan.target_collection.clone(),
            dimension,
            self.plan.distance.unwrap_or(source.distance),
        ))
    }

    /// Scans and writes until the source is exhausted, then waits for every
    /// in-flight batch, successful or not.
    async fn transfer(
        &self,
        ctx: &mut RunContext,
        descriptor: &CollectionDescriptor,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let mut writers = JoinSet::new();
        let pumped = self.pump(&mut writers, ctx, descriptor, progress).await;
        let drained = Self::drain(&mut writers, ctx, progress).await;
        pumped?;
        drained
    }

    async fn pump(
        &self,
        writers: &mut JoinSet<Result<(Range<u64>, usize)>>,
        ctx: &mut RunContext,
        descriptor: &CollectionDescriptor,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let slots = Arc::new(Semaphore::new(self.plan.workers.max(1)));
        let max_in_flight = self.plan.max_in_flight.max(1);
        let batch_size = self.plan.batch_size.max(1);

        loop {
            ctx.enter(MigrationPhase::Scanning);
            if self.cancel.is_cancelled() {
                info!("Cancellation requested at offset {}", ctx.state.scanned_offset);
                return Err(Error::Cancelled);
            }
            let remaining = ctx.state.total_count.saturating_sub(ctx.state.scanned_offset);
            if remaining == 0 {
                break;
            }

            while writers.len() >= max_in_flight {
                if let Some(joined) = writers.join_next().await {
                    Self::absorb(joined, ctx, progress)?;
                }
            }

            let limit = usize::try_from(remaining).map_or(batch_size, |r| r.min(batch_size));
            let start = ctx.state.scanned_offset;
            let page = self.paginator.scan(start, limit).await?;
            if page.records.is_empty() {
                debug!("Empty page at offset {}, treating as exhausted", start);
                break;
            }

            ctx.enter(MigrationPhase::Transferring);
            let exhausted = page.next_offset.is_none();
            let span = start..start + page.records.len() as u64;
            ctx.state.scanned_offset = span.end;
            ctx.batches += 1;
            writers.spawn(Self::write_task(
                self.sink.clone(),
                Arc::clone(&self.transformer),
                Arc::clone(&slots),
                descriptor.clone(),
                span,
                page.records,
                self.plan.dry_run,
            ));

            while let Some(joined) = writers.try_join_next() {
                Self::absorb(joined, ctx, progress)?;
            }
            if exhausted {
                break;
            }
        }
        Ok(())
    }

    async fn write_task(
        sink: SinkWriter,
        transformer: Arc<Transformer>,
        slots: Arc<Semaphore>,
        descriptor: CollectionDescriptor,
        span: Range<u64>,
        records: Vec<Record>,
        dry_run: bool,
    ) -> Result<(Range<u64>, usize)> {
        let _permit = slots
            .acquire_owned()
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))?;
        let batch = transformer.transform_batch(records);
        if dry_run {
            return Ok((span, batch.len()));
        }
        let written = sink
            .write_batch(&descriptor.name, descriptor.dimension, &batch)
            .await?;
        Ok((span, written))
    }

    /// Waits for every outstanding writer, returning the first error.
    async fn drain(
        writers: &mut JoinSet<Result<(Range<u64>, usize)>>,
        ctx: &mut RunContext,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let mut first_error = None;
        while let Some(joined) = writers.join_next().await {
            if let Err(e) = Self::absorb(joined, ctx, progress) {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    debug!("Additional writer failure: {}", e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn absorb(
        joined: std::result::Result<Result<(Range<u64>, usize)>, tokio::task::JoinError>,
        ctx: &mut RunContext,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let (span, written) = joined.map_err(|e| Error::TaskJoin(e.to_string()))??;
        ctx.state.migrated_count += written as u64;
        ctx.acknowledge(span);
        progress.record(ctx.state.migrated_count, ctx.state.total_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::memory::MemoryStore;
    use crate::connectors::{Payload, Record};

    fn seeded(n: u64) -> MemoryStore {
        let records = (0..n)
            .map(|i| Record::new(i, vec![i as f32, 1.0], Payload::new()))
            .collect();
        MemoryStore::with_collection(CollectionDescriptor::new("docs", 2, Distance::Cosine), records)
    }

    fn plan() -> MigrationPlan {
        let mut plan = MigrationPlan::new("docs");
        plan.batch_size = 3;
        plan.retry = RetryConfig::fast(2);
        plan
    }

    #[test]
    fn test_migration_result_throughput() {
        let result = MigrationResult {
            collection: "docs".to_string(),
            source_count: 1000,
            target_count: 1000,
            migrated_count: 1000,
            batches: 10,
            duration_seconds: 2.0,
            dimension: 4,
            mismatch: false,
            dry_run: false,
        };
        assert!((result.throughput() - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(MigrationPhase::Transferring.to_string(), "TRANSFERRING");
        assert_eq!(MigrationPhase::Failed.to_string(), "FAILED");
    }

    #[test]
    fn test_offset_advances_only_over_contiguous_acknowledged_batches() {
        let mut ctx = RunContext {
            phase: MigrationPhase::Transferring,
            state: MigrationState::new(),
            locked: None,
            batches: 3,
            landed: BTreeMap::new(),
        };

        ctx.acknowledge(10..15);
        assert_eq!(ctx.state.offset, 0);
        ctx.acknowledge(0..5);
        assert_eq!(ctx.state.offset, 5);
        ctx.acknowledge(5..10);
        assert_eq!(ctx.state.offset, 15);
        assert!(ctx.landed.is_empty());
    }

    #[tokio::test]
    async fn test_run_copies_all_records() {
        let source = seeded(10);
        let target = MemoryStore::new();
        let pipeline = Pipeline::new(Arc::new(source), Arc::new(target.clone()), plan());

        let result = pipeline.run().await.unwrap();

        assert_eq!(result.source_count, 10);
        assert_eq!(result.target_count, 10);
        assert_eq!(result.batches, 4);
        assert!(!result.mismatch);
        assert_eq!(target.records("docs").len(), 10);
    }

    #[tokio::test]
    async fn test_dimension_override_mismatch_fails_at_init() {
        let mut plan = plan();
        plan.dimension = Some(3);
        let pipeline = Pipeline::new(Arc::new(seeded(2)), Arc::new(MemoryStore::new()), plan);

        let failure = pipeline.run().await.unwrap_err();

        assert_eq!(failure.phase, MigrationPhase::Init);
        assert!(matches!(failure.error, Error::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn test_failure_display_carries_offset() {
        let source = seeded(6);
        let target = MemoryStore::new();
        target.fail_next_upserts(100);
        let pipeline = Pipeline::new(Arc::new(source), Arc::new(target), plan());

        let failure = pipeline.run().await.unwrap_err();
        let message = failure.to_string();

        assert!(message.contains("offset"));
        assert!(message.contains("MIG-004"));
    }
}
