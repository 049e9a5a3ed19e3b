//! Variant detail lookup and streaming export.
//!
//! Both paths read full-fidelity rows from the columnar partitions, never
//! the index. Exports compile the filter to its predicate form and stream
//! matching rows partition by partition through a bounded channel, so a
//! slow consumer applies backpressure and a dropped response body cancels
//! the producer. The total match count still comes from the index, and the
//! two paths agree because predicate and postings share one projection.

use std::collections::HashSet;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::QueryConfig;
use crate::error::{LocusError, Result};
use crate::fields::{field_names, project_fields};
use crate::filter::{compile, matches_fields, FilterGroup, IndexQuery};
use crate::index::SearchIndex;
use crate::metrics::{ACTIVE_EXPORTS, EXPORTS_TOTAL, EXPORT_ROWS_TOTAL, GaugeGuard};
use crate::project::ProjectManager;
use crate::storage::partition::{list_partition_keys, read_partition};
use crate::storage::LocusStore;
use crate::types::{chrom_rank, PartitionKey, VariantId, VariantRecord, VariantSummary};

/// How many rows are buffered into one streamed chunk.
const EXPORT_CHUNK_ROWS: usize = 256;
/// Bounded channel depth between the producer task and the response body.
const EXPORT_CHANNEL_CAPACITY: usize = 64;

/// Fetch one variant's full record from the columnar store.
///
/// The chromosome is recovered from the variant id, narrowing the scan to
/// that chromosome's partitions across all months.
#[instrument(skip(store, projects), fields(project = project_id, variant = variant_id))]
pub async fn get_variant(
    store: &LocusStore,
    projects: &ProjectManager,
    project_id: &str,
    variant_id: &str,
) -> Result<VariantRecord> {
    projects.ensure_exists(project_id).await?;

    let wanted: VariantId = variant_id.to_lowercase();
    let chrom = wanted
        .split(':')
        .next()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            LocusError::Validation(format!("malformed variant id '{variant_id}'"))
        })?
        .to_uppercase();

    // Newest month first: a re-ingested identity lands in the ingestion
    // month's partition, and that version supersedes any older one.
    let keys = list_partition_keys(store, project_id, Some(&chrom)).await?;
    for key in keys.iter().rev() {
        let partition_key = parse_partition_key(key, project_id)?;
        let rows = read_partition(store, &partition_key).await?;
        if let Some(record) = rows.into_iter().find(|r| r.variant_id == wanted) {
            return Ok(record);
        }
    }

    Err(LocusError::VariantNotFound {
        project: project_id.to_string(),
        variant_id: wanted,
    })
}

fn parse_partition_key(object_key: &str, project_id: &str) -> Result<PartitionKey> {
    let rest = object_key
        .strip_prefix(project_id)
        .and_then(|r| r.strip_prefix('/'))
        .and_then(|r| r.strip_suffix("/part.bin"))
        .ok_or_else(|| LocusError::Index(format!("unexpected partition key '{object_key}'")))?;
    let (chrom, year_month) = rest
        .split_once('/')
        .ok_or_else(|| LocusError::Index(format!("unexpected partition key '{object_key}'")))?;
    Ok(PartitionKey {
        project_id: project_id.to_string(),
        chrom: chrom.to_string(),
        year_month: year_month.to_string(),
    })
}

/// Output format for an export.
///
/// `json` and the uppercase spellings are accepted on the wire for
/// compatibility with older clients; JSON output is always NDJSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    #[serde(alias = "CSV")]
    Csv,
    #[serde(alias = "json", alias = "JSON", alias = "NDJSON")]
    Ndjson,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Ndjson => "application/x-ndjson",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Ndjson => "ndjson",
        }
    }

    fn as_str(&self) -> &'static str {
        self.extension()
    }
}

/// An export request: a filter plus an output format.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    pub project_id: String,
    #[serde(default)]
    pub filter: Option<FilterGroup>,
    #[serde(default)]
    pub format: ExportFormat,
}

/// Audit trail entry written for every export, before the first row streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportAudit {
    pub export_id: String,
    pub project_id: String,
    pub format: ExportFormat,
    /// Exact match count the export will stream.
    pub total: u64,
    pub requested_at: DateTime<Utc>,
}

impl ExportAudit {
    pub fn audit_key(export_id: &str) -> String {
        format!("audit/exports/{export_id}.json")
    }
}

/// A running export: its id, its row count, and the body stream.
pub struct ExportStream {
    pub export_id: String,
    pub total: u64,
    pub format: ExportFormat,
    pub stream: std::pin::Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
}

/// Start an export: compile the filter, count matches, record the audit
/// entry, and hand back a chunked byte stream.
#[instrument(skip_all, fields(project = request.project_id, format = request.format.as_str()))]
pub async fn start_export(
    store: &LocusStore,
    projects: &ProjectManager,
    config: &QueryConfig,
    request: ExportRequest,
) -> Result<ExportStream> {
    projects.ensure_exists(&request.project_id).await?;

    // Total match count comes from the index; the rows themselves come from
    // the columnar scan below. The two agree because both evaluate the same
    // compiled filter over the same field projection.
    let query = compile(request.filter.as_ref(), config.max_filter_depth)?;
    let index = SearchIndex::load(store, &request.project_id).await?;
    let total = index.evaluate(&query).len();

    let export_id = Uuid::new_v4().to_string();
    let audit = ExportAudit {
        export_id: export_id.clone(),
        project_id: request.project_id.clone(),
        format: request.format,
        total,
        requested_at: Utc::now(),
    };
    store
        .put(
            &ExportAudit::audit_key(&export_id),
            Bytes::from(serde_json::to_vec_pretty(&audit)?),
        )
        .await?;

    EXPORTS_TOTAL
        .with_label_values(&[&request.project_id, request.format.as_str()])
        .inc();
    info!(export_id = %export_id, total, "starting export");

    let (tx, rx) = mpsc::channel::<Result<Bytes>>(EXPORT_CHANNEL_CAPACITY);
    let task_store = store.clone();
    let project_id = request.project_id.clone();
    let format = request.format;
    let id_for_task = export_id.clone();

    tokio::spawn(async move {
        ACTIVE_EXPORTS.inc();
        let _gauge = GaugeGuard(&ACTIVE_EXPORTS);
        let start = Instant::now();
        match scan_matching(&task_store, &project_id, &query, format, &tx).await {
            Ok(Some(rows_sent)) => {
                EXPORT_ROWS_TOTAL
                    .with_label_values(&[&project_id])
                    .inc_by(rows_sent);
                debug!(
                    export_id = %id_for_task,
                    rows_sent,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "export complete"
                );
            }
            Ok(None) => {
                warn!(export_id = %id_for_task, "export cancelled by consumer");
            }
            Err(e) => {
                warn!(export_id = %id_for_task, error = %e, "export failed mid-stream");
                let _ = tx.send(Err(e)).await;
            }
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    Ok(ExportStream {
        export_id,
        total,
        format: request.format,
        stream: Box::pin(stream),
    })
}

/// Scan the project's partitions and send serialized matching rows through
/// the channel. Returns the number of rows emitted, or `None` if the
/// consumer dropped the receiving end.
///
/// Partitions are visited chromosome by chromosome in genomic order; within
/// one chromosome, newest month first, so the first occurrence of an
/// identity is its current version and older copies are skipped.
async fn scan_matching(
    store: &LocusStore,
    project_id: &str,
    query: &IndexQuery,
    format: ExportFormat,
    tx: &mpsc::Sender<Result<Bytes>>,
) -> Result<Option<u64>> {
    let mut keys = list_partition_keys(store, project_id, None)
        .await?
        .iter()
        .map(|k| parse_partition_key(k, project_id))
        .collect::<Result<Vec<PartitionKey>>>()?;
    keys.sort_by(|a, b| {
        (chrom_rank(&a.chrom), &a.chrom)
            .cmp(&(chrom_rank(&b.chrom), &b.chrom))
            .then_with(|| b.year_month.cmp(&a.year_month))
    });

    let mut buf = String::new();
    if format == ExportFormat::Csv {
        buf.push_str(&field_names().join(","));
        buf.push('\n');
    }

    let mut rows_sent = 0u64;
    let mut current_chrom: Option<String> = None;
    // Identities never span chromosomes, so the dedup set resets per chrom.
    let mut seen: HashSet<VariantId> = HashSet::new();

    for key in keys {
        if current_chrom.as_deref() != Some(key.chrom.as_str()) {
            seen.clear();
            current_chrom = Some(key.chrom.clone());
        }
        for record in read_partition(store, &key).await? {
            if !seen.insert(record.variant_id.clone()) {
                continue;
            }
            let fields = project_fields(&record);
            if !matches_fields(query, &fields) {
                continue;
            }
            match format {
                ExportFormat::Csv => {
                    let row: Vec<String> = field_names()
                        .iter()
                        .map(|name| {
                            fields
                                .get(*name)
                                .map(|v| csv_escape(&v.render()))
                                .unwrap_or_default()
                        })
                        .collect();
                    buf.push_str(&row.join(","));
                    buf.push('\n');
                }
                ExportFormat::Ndjson => {
                    let summary = VariantSummary {
                        variant_id: record.variant_id.clone(),
                        chrom: record.chrom.clone(),
                        pos: record.pos,
                        ref_allele: record.ref_allele.clone(),
                        alt_allele: record.alt_allele.clone(),
                        fields,
                    };
                    buf.push_str(&serde_json::to_string(&summary)?);
                    buf.push('\n');
                }
            }
            rows_sent += 1;

            if rows_sent % EXPORT_CHUNK_ROWS as u64 == 0
                && tx
                    .send(Ok(Bytes::from(std::mem::take(&mut buf))))
                    .await
                    .is_err()
            {
                return Ok(None);
            }
        }
    }

    if !buf.is_empty() && tx.send(Ok(Bytes::from(buf))).await.is_err() {
        return Ok(None);
    }
    Ok(Some(rows_sent))
}

/// Minimal CSV quoting: values containing a comma, quote, or newline are
/// quoted with embedded quotes doubled.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageBackend, StorageConfig};
    use crate::storage::partition::write_partition;
    use crate::storage::PartitionBlob;
    use crate::types::variant_id;

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_parse_partition_key() {
        let key = parse_partition_key("demo/X/2026_08/part.bin", "demo").unwrap();
        assert_eq!(key.chrom, "X");
        assert_eq!(key.year_month, "2026_08");
        assert!(parse_partition_key("other/X/2026_08/part.bin", "demo").is_err());
    }

    #[test]
    fn test_format_content_types() {
        assert!(ExportFormat::Csv.content_type().starts_with("text/csv"));
        assert_eq!(ExportFormat::Ndjson.content_type(), "application/x-ndjson");
    }

    #[test]
    fn test_format_accepts_legacy_spellings() {
        let parse = |s: &str| serde_json::from_value::<ExportFormat>(serde_json::json!(s));
        assert_eq!(parse("csv").unwrap(), ExportFormat::Csv);
        assert_eq!(parse("CSV").unwrap(), ExportFormat::Csv);
        assert_eq!(parse("ndjson").unwrap(), ExportFormat::Ndjson);
        assert_eq!(parse("json").unwrap(), ExportFormat::Ndjson);
        assert_eq!(parse("JSON").unwrap(), ExportFormat::Ndjson);
        assert!(parse("parquet").is_err());
    }

    #[test]
    fn test_audit_key() {
        assert_eq!(
            ExportAudit::audit_key("abc-123"),
            "audit/exports/abc-123.json"
        );
    }

    fn make_record(pos: u64) -> VariantRecord {
        VariantRecord {
            project_id: "demo".into(),
            variant_id: variant_id("1", pos, "A", "T"),
            chrom: "1".into(),
            pos,
            ref_allele: "A".into(),
            alt_allele: "T".into(),
            rsid: None,
            qual: None,
            filters: None,
            csq: vec![],
            clinvar: None,
            population: None,
            year_month: "2026_08".into(),
        }
    }

    #[tokio::test]
    async fn test_scan_stops_when_receiver_is_gone() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Local,
            bucket: tmp.path().to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        let store = LocusStore::from_config(&config).unwrap();

        // More rows than one chunk, so a send happens mid-scan.
        let rows: Vec<VariantRecord> = (1..=EXPORT_CHUNK_ROWS as u64 + 50)
            .map(make_record)
            .collect();
        let key = PartitionKey {
            project_id: "demo".into(),
            chrom: "1".into(),
            year_month: "2026_08".into(),
        };
        write_partition(&store, &key, &PartitionBlob::from_rows(rows))
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sent = scan_matching(&store, "demo", &IndexQuery::All, ExportFormat::Csv, &tx)
            .await
            .unwrap();
        assert_eq!(sent, None);
    }
}
