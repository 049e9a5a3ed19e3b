//! Batch ingestion pipeline.
//!
//! A batch is normalized, grouped by partition, merged into the affected
//! partitions (read current blob, last-write-wins merge, atomic overwrite),
//! and only after every partition write succeeds is the project's search
//! index updated. A failed partition write aborts the batch before the index
//! is touched, so the index never references rows that were not durably
//! written; the caller retries the whole batch, which is safe because
//! re-ingestion of the same identities is idempotent.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::IngestConfig;
use crate::error::{LocusError, Result};
use crate::index::SearchIndex;
use crate::ingest::normalize::{normalize_record, RawRecord};
use crate::metrics::{INDEX_BUILD_DURATION, INGEST_DURATION, INGEST_RECORDS_TOTAL};
use crate::project::ProjectManager;
use crate::storage::partition::{read_partition, write_partition};
use crate::storage::{LocusStore, PartitionBlob};
use crate::types::{PartitionKey, VariantRecord};

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Records normalized and written.
    pub ingested: usize,
    /// Records skipped as malformed.
    pub skipped: usize,
    /// Distinct partitions rewritten.
    pub partitions_written: usize,
    /// Total variants in the project after this batch.
    pub total_variants: u64,
}

/// Ingest one batch of raw records into a project.
///
/// Batches for the same project are serialized by the project's ingest lock;
/// partition writes within a batch run concurrently up to the configured
/// limit.
#[instrument(skip_all, fields(project = project_id, batch = raw_records.len()))]
pub async fn ingest_batch(
    store: &LocusStore,
    projects: &ProjectManager,
    config: &IngestConfig,
    project_id: &str,
    raw_records: Vec<RawRecord>,
) -> Result<IngestReport> {
    projects.ensure_exists(project_id).await?;

    if raw_records.is_empty() {
        return Err(LocusError::Validation("empty batch".to_string()));
    }
    if raw_records.len() > config.max_batch_size {
        return Err(LocusError::Validation(format!(
            "batch size {} exceeds maximum of {}",
            raw_records.len(),
            config.max_batch_size
        )));
    }

    let start = Instant::now();
    let lock = projects.ingest_lock(project_id);
    let _guard = lock.lock().await;

    // Normalize with per-record isolation.
    let ingested_at = Utc::now();
    let mut records: Vec<VariantRecord> = Vec::with_capacity(raw_records.len());
    let mut skipped = 0usize;
    for raw in raw_records {
        match normalize_record(project_id, raw, ingested_at) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!(project = project_id, error = %e, "skipping malformed record");
            }
        }
    }
    INGEST_RECORDS_TOTAL
        .with_label_values(&[project_id, "skipped"])
        .inc_by(skipped as u64);
    // Malformed records never abort the batch; a batch with nothing left
    // to write still reports its counts.
    if records.is_empty() {
        warn!(project = project_id, skipped, "batch contained no well-formed records");
        return Ok(IngestReport {
            ingested: 0,
            skipped,
            partitions_written: 0,
            total_variants: projects.get(project_id).await?.variant_count,
        });
    }

    // Group by partition. Within one batch the month is uniform, so a record
    // lands in exactly one partition per chromosome.
    let mut by_partition: HashMap<PartitionKey, Vec<VariantRecord>> = HashMap::new();
    for record in &records {
        by_partition
            .entry(PartitionKey::for_record(record))
            .or_default()
            .push(record.clone());
    }
    let partitions_written = by_partition.len();

    // Merge and rewrite every affected partition before the index sees
    // anything from this batch.
    stream::iter(by_partition.into_iter().map(|(key, batch)| async move {
        let existing = read_partition(store, &key).await?;
        let merged = PartitionBlob::merge(existing, batch);
        write_partition(store, &key, &merged).await
    }))
    .buffer_unordered(config.max_concurrent_partition_writes.max(1))
    .try_collect::<Vec<()>>()
    .await?;

    // Partitions are durable; fold the batch into the index.
    let index_start = Instant::now();
    let mut index = SearchIndex::load(store, project_id).await?;
    index.upsert(&records);
    index.save(store, project_id).await?;
    INDEX_BUILD_DURATION
        .with_label_values(&[project_id])
        .observe(index_start.elapsed().as_secs_f64());

    let total_variants = index.len() as u64;
    projects
        .update_variant_count(project_id, total_variants)
        .await?;

    INGEST_RECORDS_TOTAL
        .with_label_values(&[project_id, "ingested"])
        .inc_by(records.len() as u64);
    INGEST_DURATION
        .with_label_values(&[project_id])
        .observe(start.elapsed().as_secs_f64());

    info!(
        project = project_id,
        ingested = records.len(),
        skipped,
        partitions_written,
        total_variants,
        "ingested batch"
    );

    Ok(IngestReport {
        ingested: records.len(),
        skipped,
        partitions_written,
        total_variants,
    })
}
