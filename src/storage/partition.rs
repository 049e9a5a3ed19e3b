//! Partitioned columnar storage for variant records.
//!
//! One partition per (project, chromosome, calendar month), stored as a
//! single blob and always rewritten whole, so a partition overwrite is
//! atomic at the object level. Serialization format:
//!
//! ```text
//! [4 bytes: "LPRT"] [1 byte: version] [8 bytes: xxh3 of payload, LE] [JSON rows]
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{LocusError, Result};
use crate::storage::LocusStore;
use crate::types::{PartitionKey, VariantRecord};

/// Magic bytes for partition blobs.
const PARTITION_MAGIC: &[u8; 4] = b"LPRT";
/// Current version of the partition format.
const PARTITION_VERSION: u8 = 1;

/// The full content of one partition: rows sorted by coordinate, unique by
/// variant identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionBlob {
    pub rows: Vec<VariantRecord>,
}

impl PartitionBlob {
    /// Build a partition's content from a batch of rows, deduplicating by
    /// variant identity (last write wins) and sorting by coordinate so the
    /// serialized content is deterministic for identical inputs.
    pub fn from_rows(rows: Vec<VariantRecord>) -> Self {
        let mut by_id: std::collections::HashMap<String, VariantRecord> = std::collections::HashMap::new();
        for row in rows {
            by_id.insert(row.variant_id.clone(), row);
        }
        let mut rows: Vec<VariantRecord> = by_id.into_values().collect();
        rows.sort_by_key(|r| r.sort_key());
        Self { rows }
    }

    /// Merge existing partition content with a new batch: new rows overwrite
    /// existing ones of the same identity, everything else survives.
    pub fn merge(existing: Vec<VariantRecord>, incoming: Vec<VariantRecord>) -> Self {
        let mut all = existing;
        all.extend(incoming);
        Self::from_rows(all)
    }

    /// Serialize to bytes with magic + version + checksum header.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let json = serde_json::to_vec(&self.rows)?;
        let checksum = xxh3_64(&json);
        let mut buf = Vec::with_capacity(13 + json.len());
        buf.extend_from_slice(PARTITION_MAGIC);
        buf.push(PARTITION_VERSION);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.extend_from_slice(&json);
        Ok(Bytes::from(buf))
    }

    /// Deserialize from bytes, validating magic, version, and checksum.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 13 {
            return Err(LocusError::Index("partition data too short".to_string()));
        }
        if &data[0..4] != PARTITION_MAGIC {
            return Err(LocusError::Index(format!(
                "invalid partition magic: expected LPRT, got {:?}",
                &data[0..4]
            )));
        }
        let version = data[4];
        if version != PARTITION_VERSION {
            return Err(LocusError::Index(format!(
                "unsupported partition version: {version}"
            )));
        }
        let expected = u64::from_le_bytes(
            data[5..13]
                .try_into()
                .map_err(|_| LocusError::Index("partition header truncated".to_string()))?,
        );
        let payload = &data[13..];
        let actual = xxh3_64(payload);
        if actual != expected {
            return Err(LocusError::ChecksumMismatch { expected, actual });
        }
        let rows: Vec<VariantRecord> = serde_json::from_slice(payload)?;
        Ok(Self { rows })
    }
}

/// Write one partition's full content atomically. The previous content is
/// replaced in a single object put; a failure leaves the prior blob intact.
#[instrument(skip(store, blob), fields(partition = %key.object_key(), rows = blob.rows.len()))]
pub async fn write_partition(
    store: &LocusStore,
    key: &PartitionKey,
    blob: &PartitionBlob,
) -> Result<()> {
    let object_key = key.object_key();
    let data = blob.to_bytes()?;
    store
        .put(&object_key, data)
        .await
        .map_err(|e| LocusError::PartitionWriteFailure {
            partition: object_key.clone(),
            reason: e.to_string(),
        })?;
    debug!("wrote partition");
    Ok(())
}

/// Read one partition's rows. A missing partition reads as empty.
pub async fn read_partition(store: &LocusStore, key: &PartitionKey) -> Result<Vec<VariantRecord>> {
    match store.get(&key.object_key()).await {
        Ok(data) => Ok(PartitionBlob::from_bytes(&data)?.rows),
        Err(LocusError::NotFound { .. }) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// List the partition blob keys for a project, optionally narrowed to one
/// chromosome, in deterministic (lexical) order.
pub async fn list_partition_keys(
    store: &LocusStore,
    project_id: &str,
    chrom: Option<&str>,
) -> Result<Vec<String>> {
    let prefix = match chrom {
        Some(c) => format!("{project_id}/{c}"),
        None => project_id.to_string(),
    };
    let mut keys: Vec<String> = store
        .list_prefix(&prefix)
        .await?
        .into_iter()
        .filter(|k| k.ends_with("/part.bin"))
        .collect();
    keys.sort();
    Ok(keys)
}
