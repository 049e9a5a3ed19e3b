use std::sync::Arc;

use chrono::Utc;

use locus::config::{Config, StorageBackend};
use locus::ingest::{ingest_batch, IngestReport, RawConsequence, RawRecord};
use locus::project::ProjectManager;
use locus::storage::LocusStore;
use locus::types::{ClinvarInfo, PopulationInfo};

/// Test harness backed by a local object store under a fresh temp directory.
/// Each harness is fully isolated; the directory is removed on drop.
pub struct TestHarness {
    pub store: LocusStore,
    pub projects: Arc<ProjectManager>,
    pub config: Config,
    _tmp: tempfile::TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");

        let mut config = Config::default();
        config.storage.backend = StorageBackend::Local;
        config.storage.bucket = tmp.path().join("storage").to_string_lossy().to_string();

        let store = LocusStore::from_config(&config.storage)
            .expect("failed to create store from config");
        let projects = Arc::new(ProjectManager::new(store.clone()));

        Self {
            store,
            projects,
            config,
            _tmp: tmp,
        }
    }

    /// Create a project and ingest a batch into it.
    pub async fn seed(&self, project_id: &str, records: Vec<RawRecord>) -> IngestReport {
        self.projects
            .create(project_id, None)
            .await
            .expect("failed to create project");
        self.ingest(project_id, records).await
    }

    pub async fn ingest(&self, project_id: &str, records: Vec<RawRecord>) -> IngestReport {
        ingest_batch(
            &self.store,
            &self.projects,
            &self.config.ingest,
            project_id,
            records,
        )
        .await
        .expect("ingestion failed")
    }

    /// The partition month stamped onto records ingested right now.
    pub fn current_year_month(&self) -> String {
        Utc::now().format("%Y_%m").to_string()
    }
}

/// A raw record with the given coordinates and no annotations.
pub fn raw_variant(chrom: &str, pos: u64, ref_allele: &str, alt_allele: &str) -> RawRecord {
    RawRecord {
        chrom: Some(chrom.to_string()),
        pos: Some(pos),
        ref_allele: Some(ref_allele.to_string()),
        alt_allele: Some(alt_allele.to_string()),
        ..RawRecord::default()
    }
}

/// A raw record annotated the way VEP-style pipelines emit them.
pub fn raw_annotated(
    chrom: &str,
    pos: u64,
    symbol: &str,
    consequence: &str,
    impact: &str,
    clinsig: Option<&str>,
    gnomad_af: Option<f64>,
) -> RawRecord {
    RawRecord {
        filters: Some("PASS".to_string()),
        csq: vec![RawConsequence {
            symbol: Some(symbol.to_string()),
            consequence: Some(consequence.to_string()),
            impact: Some(impact.to_string()),
            transcript: None,
        }],
        clinvar: clinsig.map(|c| ClinvarInfo {
            clinsig: Some(c.to_string()),
            review_status: None,
        }),
        population: gnomad_af.map(|af| PopulationInfo {
            gnomad_af: Some(af),
            gnomad_popmax_af: None,
            gnomad_popmax_pop: None,
        }),
        ..raw_variant(chrom, pos, "A", "T")
    }
}
