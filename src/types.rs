use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A unique identifier for a variant within a project: `{chrom}:{pos}:{ref}>{alt}`,
/// lowercased.
pub type VariantId = String;

/// Compute the canonical variant identifier from its coordinates and alleles.
pub fn variant_id(chrom: &str, pos: u64, ref_allele: &str, alt_allele: &str) -> VariantId {
    format!("{chrom}:{pos}:{ref_allele}>{alt_allele}").to_lowercase()
}

/// A value that one whitelisted field can hold on a variant record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A single keyword value.
    Keyword(String),
    /// A numeric value.
    Number(f64),
    /// A multi-valued keyword field (one entry per consequence annotation).
    KeywordList(Vec<String>),
}

impl FieldValue {
    /// Whether this value equals (or, for lists, contains) the given keyword.
    pub fn matches_keyword(&self, needle: &str) -> bool {
        match self {
            FieldValue::Keyword(s) => s == needle,
            FieldValue::KeywordList(list) => list.iter().any(|s| s == needle),
            FieldValue::Number(_) => false,
        }
    }

    /// Numeric view of this value, if it is numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Render this value for CSV export. List values are joined with `|`.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Keyword(s) => s.clone(),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            FieldValue::KeywordList(list) => list.join("|"),
        }
    }
}

/// One predicted functional effect of a variant on a gene/transcript.
///
/// Order within a record is ingestion order and is preserved for display,
/// but filtering treats the annotations as a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consequence {
    /// Affected gene symbol, e.g. `BRCA1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Consequence type, e.g. `missense_variant`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequence: Option<String>,
    /// Predicted impact class, e.g. `MODERATE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    /// Transcript identifier, e.g. `ENST00000357654`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// Optional clinical-significance metadata attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinvarInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinsig: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_status: Option<String>,
}

/// Optional population allele-frequency metadata attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnomad_af: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnomad_popmax_af: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnomad_popmax_pop: Option<String>,
}

/// A normalized, immutable variant record.
///
/// Identity is (project_id, chrom, pos, ref, alt); re-ingestion of the same
/// identity overwrites (last-write-wins per partition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub project_id: String,
    pub variant_id: VariantId,
    pub chrom: String,
    pub pos: u64,
    #[serde(rename = "ref")]
    pub ref_allele: String,
    #[serde(rename = "alt")]
    pub alt_allele: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qual: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<String>,
    /// Flattened consequence annotations, ingestion order.
    #[serde(default)]
    pub csq: Vec<Consequence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinvar: Option<ClinvarInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<PopulationInfo>,
    /// Calendar month this record was ingested under, `YYYY_MM`.
    pub year_month: String,
}

impl VariantRecord {
    /// Stable sort key: genomic coordinate order with deterministic tie-breaks.
    pub fn sort_key(&self) -> SortKey {
        SortKey {
            chrom_rank: chrom_rank(&self.chrom),
            chrom: self.chrom.clone(),
            pos: self.pos,
            ref_allele: self.ref_allele.clone(),
            alt_allele: self.alt_allele.clone(),
        }
    }
}

/// Ordering key for deterministic result pagination: chromosomes in genomic
/// order (1..22, X, Y, MT, then everything else lexicographically), then
/// position, then alleles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    pub chrom_rank: u32,
    pub chrom: String,
    pub pos: u64,
    pub ref_allele: String,
    pub alt_allele: String,
}

/// Rank chromosomes in conventional genomic order. Unrecognized contigs sort
/// after the canonical set, by name.
pub fn chrom_rank(chrom: &str) -> u32 {
    let c = chrom.trim_start_matches("chr");
    match c {
        "X" | "x" => 23,
        "Y" | "y" => 24,
        "MT" | "M" | "mt" | "m" => 25,
        _ => match c.parse::<u32>() {
            Ok(n) if (1..=22).contains(&n) => n,
            _ => u32::MAX,
        },
    }
}

/// The partition a record belongs to: one per (project, chromosome, month).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub project_id: String,
    pub chrom: String,
    pub year_month: String,
}

impl PartitionKey {
    pub fn for_record(record: &VariantRecord) -> Self {
        Self {
            project_id: record.project_id.clone(),
            chrom: record.chrom.clone(),
            year_month: record.year_month.clone(),
        }
    }

    /// Storage key for this partition's blob:
    /// `{project_id}/{chrom}/{year_month}/part.bin`.
    pub fn object_key(&self) -> String {
        format!(
            "{}/{}/{}/part.bin",
            self.project_id, self.chrom, self.year_month
        )
    }
}

/// Summary of one variant returned in a query result page. Built entirely
/// from the index document, never from the columnar store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSummary {
    pub variant_id: VariantId,
    pub chrom: String,
    pub pos: u64,
    #[serde(rename = "ref")]
    pub ref_allele: String,
    #[serde(rename = "alt")]
    pub alt_allele: String,
    /// Indexed field values, keyed by whitelisted field name.
    pub fields: BTreeMap<String, FieldValue>,
}
