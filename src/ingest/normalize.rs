//! Normalization of raw annotated records into [`VariantRecord`]s.
//!
//! Each record is validated independently: one malformed record is skipped
//! (with a reason) without failing the batch.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{LocusError, Result};
use crate::types::{variant_id, ClinvarInfo, Consequence, PopulationInfo, VariantRecord};

/// One incoming annotated record, as submitted to the ingestion endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub chrom: Option<String>,
    #[serde(default)]
    pub pos: Option<u64>,
    #[serde(default, rename = "ref")]
    pub ref_allele: Option<String>,
    #[serde(default, rename = "alt")]
    pub alt_allele: Option<String>,
    #[serde(default)]
    pub rsid: Option<String>,
    #[serde(default)]
    pub qual: Option<f64>,
    #[serde(default)]
    pub filters: Option<String>,
    #[serde(default)]
    pub csq: Vec<RawConsequence>,
    #[serde(default)]
    pub clinvar: Option<ClinvarInfo>,
    #[serde(default)]
    pub population: Option<PopulationInfo>,
}

/// One incoming consequence annotation. All fields optional; an annotation
/// with nothing in it is dropped during normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConsequence {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub consequence: Option<String>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| LocusError::MalformedRecord(format!("missing {field}")))
}

/// Normalize one raw record into an immutable [`VariantRecord`].
///
/// The partition month is taken from the ingestion time, not from the record.
pub fn normalize_record(
    project_id: &str,
    raw: RawRecord,
    ingested_at: DateTime<Utc>,
) -> Result<VariantRecord> {
    let chrom = required(raw.chrom, "chrom")?;
    // Canonical chromosome form: no `chr` prefix, uppercase. The variant id
    // lowercases everything, so detail lookups can recover the storage form.
    let chrom = chrom.trim_start_matches("chr").to_uppercase();
    let pos = raw
        .pos
        .filter(|p| *p > 0)
        .ok_or_else(|| LocusError::MalformedRecord("missing or non-positive pos".to_string()))?;
    let ref_allele = required(raw.ref_allele, "ref")?.to_uppercase();
    let alt_allele = required(raw.alt_allele, "alt")?.to_uppercase();

    if !is_allele(&ref_allele) {
        return Err(LocusError::MalformedRecord(format!(
            "invalid ref allele '{ref_allele}'"
        )));
    }
    if !is_allele(&alt_allele) {
        return Err(LocusError::MalformedRecord(format!(
            "invalid alt allele '{alt_allele}'"
        )));
    }

    // Annotations with no usable content are dropped; the record survives.
    let csq: Vec<Consequence> = raw
        .csq
        .into_iter()
        .filter_map(|c| {
            let csq = Consequence {
                symbol: non_empty(c.symbol),
                consequence: non_empty(c.consequence),
                impact: non_empty(c.impact),
                transcript: non_empty(c.transcript),
            };
            (csq.symbol.is_some()
                || csq.consequence.is_some()
                || csq.impact.is_some()
                || csq.transcript.is_some())
            .then_some(csq)
        })
        .collect();

    Ok(VariantRecord {
        variant_id: variant_id(&chrom, pos, &ref_allele, &alt_allele),
        project_id: project_id.to_string(),
        chrom,
        pos,
        ref_allele,
        alt_allele,
        rsid: non_empty(raw.rsid),
        qual: raw.qual,
        filters: non_empty(raw.filters),
        csq,
        clinvar: raw.clinvar,
        population: raw.population,
        year_month: ingested_at.format("%Y_%m").to_string(),
    })
}

/// Alleles are VCF-style sequences, plus `*` for spanning deletions.
fn is_allele(s: &str) -> bool {
    s == "*" || s.chars().all(|c| matches!(c, 'A' | 'C' | 'G' | 'T' | 'N'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).unwrap()
    }

    fn raw(chrom: &str, pos: u64, r: &str, a: &str) -> RawRecord {
        RawRecord {
            chrom: Some(chrom.into()),
            pos: Some(pos),
            ref_allele: Some(r.into()),
            alt_allele: Some(a.into()),
            ..RawRecord::default()
        }
    }

    #[test]
    fn test_normalize_basic() {
        let record = normalize_record("demo", raw("1", 100, "A", "T"), at()).unwrap();
        assert_eq!(record.variant_id, "1:100:a>t");
        assert_eq!(record.year_month, "2026_08");
        assert_eq!(record.project_id, "demo");
    }

    #[test]
    fn test_normalize_strips_chr_prefix_and_uppercases_alleles() {
        let record = normalize_record("demo", raw("chrX", 5, "gc", "g"), at()).unwrap();
        assert_eq!(record.chrom, "X");
        assert_eq!(record.ref_allele, "GC");
        assert_eq!(record.variant_id, "x:5:gc>g");
    }

    #[test]
    fn test_normalize_missing_chrom() {
        let mut r = raw("1", 100, "A", "T");
        r.chrom = None;
        assert!(matches!(
            normalize_record("demo", r, at()),
            Err(LocusError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_normalize_zero_pos() {
        let r = raw("1", 0, "A", "T");
        assert!(normalize_record("demo", r, at()).is_err());
    }

    #[test]
    fn test_normalize_rejects_garbage_allele() {
        let r = raw("1", 100, "A!", "T");
        assert!(normalize_record("demo", r, at()).is_err());
    }

    #[test]
    fn test_normalize_drops_empty_csq_blocks() {
        let mut r = raw("1", 100, "A", "T");
        r.csq = vec![
            RawConsequence::default(),
            RawConsequence {
                symbol: Some("BRCA1".into()),
                ..RawConsequence::default()
            },
            RawConsequence {
                symbol: Some("   ".into()),
                ..RawConsequence::default()
            },
        ];
        let record = normalize_record("demo", r, at()).unwrap();
        assert_eq!(record.csq.len(), 1);
        assert_eq!(record.csq[0].symbol.as_deref(), Some("BRCA1"));
    }

    #[test]
    fn test_normalize_blank_optionals_become_none() {
        let mut r = raw("1", 100, "A", "T");
        r.rsid = Some("  ".into());
        r.filters = Some("PASS".into());
        let record = normalize_record("demo", r, at()).unwrap();
        assert_eq!(record.rsid, None);
        assert_eq!(record.filters.as_deref(), Some("PASS"));
    }

    #[test]
    fn test_spanning_deletion_allele() {
        let record = normalize_record("demo", raw("1", 100, "A", "*"), at()).unwrap();
        assert_eq!(record.alt_allele, "*");
    }
}
