//! Static whitelist of indexable fields.
//!
//! Which fields are filterable/facetable is an explicit configuration table,
//! not discovered from data, so filter validation stays deterministic. The
//! same projection (`project_fields`) feeds both the index builder and the
//! columnar predicate, which is what keeps the two query paths consistent.

use std::collections::BTreeMap;

use crate::types::{FieldValue, VariantRecord};

/// Type of a whitelisted field, determining which clause operators apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Exact-match keyword field; may hold multiple values per record.
    Keyword,
    /// Numeric field; supports range operators.
    Numeric,
}

/// One entry in the indexable-field whitelist.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Whether this field may appear in a facet request.
    pub facetable: bool,
}

/// All fields that may appear in a filter clause. Mirrors the search index
/// mapping: core coordinates, consequence annotation fields, and the
/// project-scoped clinvar/population metadata.
pub const FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "variant_id",
        kind: FieldKind::Keyword,
        facetable: false,
    },
    FieldSpec {
        name: "chrom",
        kind: FieldKind::Keyword,
        facetable: true,
    },
    FieldSpec {
        name: "pos",
        kind: FieldKind::Numeric,
        facetable: false,
    },
    FieldSpec {
        name: "ref",
        kind: FieldKind::Keyword,
        facetable: false,
    },
    FieldSpec {
        name: "alt",
        kind: FieldKind::Keyword,
        facetable: false,
    },
    FieldSpec {
        name: "rsid",
        kind: FieldKind::Keyword,
        facetable: false,
    },
    FieldSpec {
        name: "qual",
        kind: FieldKind::Numeric,
        facetable: false,
    },
    FieldSpec {
        name: "filters",
        kind: FieldKind::Keyword,
        facetable: true,
    },
    FieldSpec {
        name: "csq.symbol",
        kind: FieldKind::Keyword,
        facetable: true,
    },
    FieldSpec {
        name: "csq.consequence",
        kind: FieldKind::Keyword,
        facetable: true,
    },
    FieldSpec {
        name: "csq.impact",
        kind: FieldKind::Keyword,
        facetable: true,
    },
    FieldSpec {
        name: "csq.transcript",
        kind: FieldKind::Keyword,
        facetable: false,
    },
    FieldSpec {
        name: "clinvar.clinsig",
        kind: FieldKind::Keyword,
        facetable: true,
    },
    FieldSpec {
        name: "clinvar.review_status",
        kind: FieldKind::Keyword,
        facetable: false,
    },
    FieldSpec {
        name: "population.gnomad_af",
        kind: FieldKind::Numeric,
        facetable: false,
    },
    FieldSpec {
        name: "population.gnomad_popmax_af",
        kind: FieldKind::Numeric,
        facetable: false,
    },
    FieldSpec {
        name: "population.gnomad_popmax_pop",
        kind: FieldKind::Keyword,
        facetable: true,
    },
];

/// Look up a field spec by name.
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.name == name)
}

/// Names of all whitelisted fields, in declaration order. Used as the CSV
/// export header.
pub fn field_names() -> Vec<&'static str> {
    FIELDS.iter().map(|f| f.name).collect()
}

/// Project a record onto its whitelisted, field-addressable values.
///
/// Absent fields are omitted from the map entirely (an `exists` clause on
/// them evaluates false). Consequence annotation fields collect one entry
/// per annotation that carries the attribute, preserving ingestion order.
pub fn project_fields(record: &VariantRecord) -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();

    fields.insert(
        "variant_id".to_string(),
        FieldValue::Keyword(record.variant_id.clone()),
    );
    fields.insert(
        "chrom".to_string(),
        FieldValue::Keyword(record.chrom.clone()),
    );
    fields.insert("pos".to_string(), FieldValue::Number(record.pos as f64));
    fields.insert(
        "ref".to_string(),
        FieldValue::Keyword(record.ref_allele.clone()),
    );
    fields.insert(
        "alt".to_string(),
        FieldValue::Keyword(record.alt_allele.clone()),
    );
    if let Some(ref rsid) = record.rsid {
        fields.insert("rsid".to_string(), FieldValue::Keyword(rsid.clone()));
    }
    if let Some(qual) = record.qual {
        fields.insert("qual".to_string(), FieldValue::Number(qual));
    }
    if let Some(ref filters) = record.filters {
        fields.insert("filters".to_string(), FieldValue::Keyword(filters.clone()));
    }

    insert_csq_field(&mut fields, "csq.symbol", record, |c| c.symbol.as_ref());
    insert_csq_field(&mut fields, "csq.consequence", record, |c| {
        c.consequence.as_ref()
    });
    insert_csq_field(&mut fields, "csq.impact", record, |c| c.impact.as_ref());
    insert_csq_field(&mut fields, "csq.transcript", record, |c| {
        c.transcript.as_ref()
    });

    if let Some(ref clinvar) = record.clinvar {
        if let Some(ref clinsig) = clinvar.clinsig {
            fields.insert(
                "clinvar.clinsig".to_string(),
                FieldValue::Keyword(clinsig.clone()),
            );
        }
        if let Some(ref status) = clinvar.review_status {
            fields.insert(
                "clinvar.review_status".to_string(),
                FieldValue::Keyword(status.clone()),
            );
        }
    }
    if let Some(ref pop) = record.population {
        if let Some(af) = pop.gnomad_af {
            fields.insert("population.gnomad_af".to_string(), FieldValue::Number(af));
        }
        if let Some(af) = pop.gnomad_popmax_af {
            fields.insert(
                "population.gnomad_popmax_af".to_string(),
                FieldValue::Number(af),
            );
        }
        if let Some(ref p) = pop.gnomad_popmax_pop {
            fields.insert(
                "population.gnomad_popmax_pop".to_string(),
                FieldValue::Keyword(p.clone()),
            );
        }
    }

    fields
}

fn insert_csq_field<F>(
    fields: &mut BTreeMap<String, FieldValue>,
    name: &str,
    record: &VariantRecord,
    extract: F,
) where
    F: Fn(&crate::types::Consequence) -> Option<&String>,
{
    let values: Vec<String> = record.csq.iter().filter_map(|c| extract(c).cloned()).collect();
    if !values.is_empty() {
        fields.insert(name.to_string(), FieldValue::KeywordList(values));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{variant_id, ClinvarInfo, Consequence, PopulationInfo};

    fn make_record() -> VariantRecord {
        VariantRecord {
            project_id: "demo".into(),
            variant_id: variant_id("1", 100, "A", "T"),
            chrom: "1".into(),
            pos: 100,
            ref_allele: "A".into(),
            alt_allele: "T".into(),
            rsid: None,
            qual: Some(42.5),
            filters: Some("PASS".into()),
            csq: vec![
                Consequence {
                    symbol: Some("BRCA1".into()),
                    consequence: Some("missense_variant".into()),
                    impact: Some("MODERATE".into()),
                    transcript: Some("ENST1".into()),
                },
                Consequence {
                    symbol: Some("BRCA1".into()),
                    consequence: Some("intron_variant".into()),
                    impact: None,
                    transcript: Some("ENST2".into()),
                },
            ],
            clinvar: Some(ClinvarInfo {
                clinsig: Some("pathogenic".into()),
                review_status: None,
            }),
            population: Some(PopulationInfo {
                gnomad_af: Some(0.001),
                gnomad_popmax_af: None,
                gnomad_popmax_pop: None,
            }),
            year_month: "2026_08".into(),
        }
    }

    #[test]
    fn test_field_spec_lookup() {
        assert!(field_spec("csq.symbol").is_some());
        assert!(field_spec("nonexistent").is_none());
        assert_eq!(field_spec("pos").unwrap().kind, FieldKind::Numeric);
    }

    #[test]
    fn test_facetable_fields() {
        assert!(field_spec("csq.impact").unwrap().facetable);
        assert!(!field_spec("csq.transcript").unwrap().facetable);
        assert!(!field_spec("pos").unwrap().facetable);
    }

    #[test]
    fn test_project_fields_core() {
        let fields = project_fields(&make_record());
        assert_eq!(
            fields.get("chrom"),
            Some(&FieldValue::Keyword("1".to_string()))
        );
        assert_eq!(fields.get("pos"), Some(&FieldValue::Number(100.0)));
        assert_eq!(fields.get("qual"), Some(&FieldValue::Number(42.5)));
    }

    #[test]
    fn test_project_fields_csq_multivalued() {
        let fields = project_fields(&make_record());
        match fields.get("csq.consequence") {
            Some(FieldValue::KeywordList(list)) => {
                assert_eq!(list, &["missense_variant", "intron_variant"]);
            }
            other => panic!("expected KeywordList, got {other:?}"),
        }
        // Only one annotation carries an impact, but it still projects as a list.
        match fields.get("csq.impact") {
            Some(FieldValue::KeywordList(list)) => assert_eq!(list, &["MODERATE"]),
            other => panic!("expected KeywordList, got {other:?}"),
        }
    }

    #[test]
    fn test_project_fields_absent_omitted() {
        let mut record = make_record();
        record.rsid = None;
        record.clinvar = None;
        let fields = project_fields(&record);
        assert!(!fields.contains_key("rsid"));
        assert!(!fields.contains_key("clinvar.clinsig"));
    }

    #[test]
    fn test_every_projected_field_is_whitelisted() {
        let fields = project_fields(&make_record());
        for name in fields.keys() {
            assert!(field_spec(name).is_some(), "field {name} not whitelisted");
        }
    }
}
