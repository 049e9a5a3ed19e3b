//! Per-project search index.
//!
//! The index holds one document per variant, sorted by genomic coordinate,
//! plus roaring-bitmap postings for keyword fields and dense columns for
//! numeric fields. Documents carry exactly the whitelisted field projection,
//! so a summary page is served from the index alone.
//!
//! Serialization format:
//!
//! ```text
//! [4 bytes: "LIDX"] [1 byte: version] [8 bytes: xxh3 of payload, LE] [JSON]
//! ```

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{LocusError, Result};
use crate::fields::project_fields;
use crate::filter::IndexQuery;
use crate::storage::LocusStore;
use crate::types::{chrom_rank, FieldValue, SortKey, VariantRecord, VariantSummary};

const INDEX_MAGIC: &[u8; 4] = b"LIDX";
const INDEX_VERSION: u8 = 1;

/// Storage key for a project's index blob.
pub fn index_key(project_id: &str) -> String {
    format!("variants-{project_id}/index.bin")
}

/// One indexed variant: coordinates plus the whitelisted field projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDoc {
    pub variant_id: String,
    pub chrom: String,
    pub pos: u64,
    #[serde(rename = "ref")]
    pub ref_allele: String,
    #[serde(rename = "alt")]
    pub alt_allele: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl IndexDoc {
    /// Project a record into its index document. The field map here is the
    /// single source of truth for both postings and predicate evaluation.
    pub fn from_record(record: &VariantRecord) -> Self {
        Self {
            variant_id: record.variant_id.clone(),
            chrom: record.chrom.clone(),
            pos: record.pos,
            ref_allele: record.ref_allele.clone(),
            alt_allele: record.alt_allele.clone(),
            fields: project_fields(record),
        }
    }

    pub fn sort_key(&self) -> SortKey {
        SortKey {
            chrom_rank: chrom_rank(&self.chrom),
            chrom: self.chrom.clone(),
            pos: self.pos,
            ref_allele: self.ref_allele.clone(),
            alt_allele: self.alt_allele.clone(),
        }
    }

    pub fn to_summary(&self) -> VariantSummary {
        VariantSummary {
            variant_id: self.variant_id.clone(),
            chrom: self.chrom.clone(),
            pos: self.pos,
            ref_allele: self.ref_allele.clone(),
            alt_allele: self.alt_allele.clone(),
            fields: self.fields.clone(),
        }
    }
}

/// The full search index for one project.
///
/// Doc ids are positions in `docs`, which is kept sorted by coordinate so
/// that bitmap iteration order IS result order and pagination needs no
/// per-query sort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchIndex {
    docs: Vec<IndexDoc>,
    /// field -> term -> docs containing that term.
    postings: BTreeMap<String, BTreeMap<String, RoaringBitmap>>,
    /// field -> docs where the field is present at all.
    present: BTreeMap<String, RoaringBitmap>,
    /// field -> dense numeric column, aligned with `docs`.
    numeric: BTreeMap<String, Vec<Option<f64>>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from documents, sorting and indexing them.
    pub fn build(mut docs: Vec<IndexDoc>) -> Self {
        docs.sort_by_key(|d| d.sort_key());
        let mut index = Self {
            docs,
            ..Self::default()
        };
        index.rebuild_postings();
        index
    }

    /// Merge a batch of records into the index: documents with an existing
    /// variant identity are replaced, new ones are added, and everything is
    /// re-sorted and re-indexed.
    pub fn upsert(&mut self, records: &[VariantRecord]) {
        let mut by_id: HashMap<String, IndexDoc> = self
            .docs
            .drain(..)
            .map(|d| (d.variant_id.clone(), d))
            .collect();
        for record in records {
            let doc = IndexDoc::from_record(record);
            by_id.insert(doc.variant_id.clone(), doc);
        }
        let mut docs: Vec<IndexDoc> = by_id.into_values().collect();
        docs.sort_by_key(|d| d.sort_key());
        self.docs = docs;
        self.rebuild_postings();
    }

    fn rebuild_postings(&mut self) {
        self.postings.clear();
        self.present.clear();
        self.numeric.clear();

        for (id, doc) in self.docs.iter().enumerate() {
            let id = id as u32;
            for (field, value) in &doc.fields {
                self.present.entry(field.clone()).or_default().insert(id);
                match value {
                    FieldValue::Keyword(term) => {
                        self.postings
                            .entry(field.clone())
                            .or_default()
                            .entry(term.clone())
                            .or_default()
                            .insert(id);
                    }
                    FieldValue::KeywordList(terms) => {
                        let field_postings = self.postings.entry(field.clone()).or_default();
                        for term in terms {
                            field_postings.entry(term.clone()).or_default().insert(id);
                        }
                    }
                    FieldValue::Number(n) => {
                        let column = self.numeric.entry(field.clone()).or_insert_with(Vec::new);
                        if column.len() < self.docs.len() {
                            column.resize(self.docs.len(), None);
                        }
                        column[id as usize] = Some(*n);
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn doc(&self, id: u32) -> Option<&IndexDoc> {
        self.docs.get(id as usize)
    }

    pub fn docs(&self) -> &[IndexDoc] {
        &self.docs
    }

    /// Term postings for one field, if any document carries it.
    pub fn postings_for(&self, field: &str) -> Option<&BTreeMap<String, RoaringBitmap>> {
        self.postings.get(field)
    }

    fn all_docs(&self) -> RoaringBitmap {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert_range(0..self.docs.len() as u32);
        bitmap
    }

    /// Evaluate a compiled query to the set of matching doc ids.
    ///
    /// Iteration order of the result bitmap is doc-id order, which is
    /// coordinate order by construction.
    pub fn evaluate(&self, query: &IndexQuery) -> RoaringBitmap {
        match query {
            IndexQuery::All => self.all_docs(),
            IndexQuery::Term { field, value } => self
                .postings
                .get(field)
                .and_then(|terms| terms.get(value))
                .cloned()
                .unwrap_or_default(),
            IndexQuery::In { field, values } => {
                let mut result = RoaringBitmap::new();
                if let Some(terms) = self.postings.get(field) {
                    for value in values {
                        if let Some(bitmap) = terms.get(value) {
                            result |= bitmap;
                        }
                    }
                }
                result
            }
            IndexQuery::Range { field, bounds } => {
                let mut result = RoaringBitmap::new();
                if let Some(column) = self.numeric.get(field) {
                    for (id, value) in column.iter().enumerate() {
                        if let Some(n) = value {
                            if bounds.contains(*n) {
                                result.insert(id as u32);
                            }
                        }
                    }
                }
                result
            }
            IndexQuery::Exists { field } => {
                self.present.get(field).cloned().unwrap_or_default()
            }
            IndexQuery::And(children) => {
                let mut result = self.all_docs();
                for child in children {
                    result &= self.evaluate(child);
                    if result.is_empty() {
                        break;
                    }
                }
                result
            }
            IndexQuery::Or(children) => {
                let mut result = RoaringBitmap::new();
                for child in children {
                    result |= self.evaluate(child);
                }
                result
            }
        }
    }

    /// Serialize with magic + version + checksum header.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let json = serde_json::to_vec(self)?;
        let checksum = xxh3_64(&json);
        let mut buf = Vec::with_capacity(13 + json.len());
        buf.extend_from_slice(INDEX_MAGIC);
        buf.push(INDEX_VERSION);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.extend_from_slice(&json);
        Ok(Bytes::from(buf))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 13 {
            return Err(LocusError::Index("index data too short".to_string()));
        }
        if &data[0..4] != INDEX_MAGIC {
            return Err(LocusError::Index(format!(
                "invalid index magic: expected LIDX, got {:?}",
                &data[0..4]
            )));
        }
        let version = data[4];
        if version != INDEX_VERSION {
            return Err(LocusError::Index(format!(
                "unsupported index version: {version}"
            )));
        }
        let expected = u64::from_le_bytes(
            data[5..13]
                .try_into()
                .map_err(|_| LocusError::Index("index header truncated".to_string()))?,
        );
        let payload = &data[13..];
        let actual = xxh3_64(payload);
        if actual != expected {
            return Err(LocusError::ChecksumMismatch { expected, actual });
        }
        Ok(serde_json::from_slice(payload)?)
    }

    /// Load a project's index from storage. A project with no index yet
    /// reads as empty.
    #[instrument(skip(store))]
    pub async fn load(store: &LocusStore, project_id: &str) -> Result<Self> {
        match store.get(&index_key(project_id)).await {
            Ok(data) => {
                let index = Self::from_bytes(&data)?;
                debug!(docs = index.len(), "loaded index");
                Ok(index)
            }
            Err(LocusError::NotFound { .. }) => Ok(Self::new()),
            Err(e) => Err(e),
        }
    }

    /// Persist this index as the project's index blob (whole-object put).
    #[instrument(skip(self, store), fields(docs = self.len()))]
    pub async fn save(&self, store: &LocusStore, project_id: &str) -> Result<()> {
        let data = self.to_bytes()?;
        store.put(&index_key(project_id), data).await?;
        debug!("saved index");
        Ok(())
    }
}
