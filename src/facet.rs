//! Facet counting over filtered result sets.
//!
//! Facet counts come straight from bitmap algebra: for each requested field,
//! every term's posting list is intersected with the filter's match set.
//! Multi-valued fields count a variant once per distinct term it carries, so
//! per-field counts may exceed the match total.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::QueryConfig;
use crate::error::{LocusError, Result};
use crate::fields::field_spec;
use crate::filter::{compile, FilterGroup};
use crate::index::SearchIndex;
use crate::metrics::FACET_QUERIES_TOTAL;
use crate::project::ProjectManager;
use crate::storage::LocusStore;

/// A facet request: count term frequencies for some fields, within the
/// subset matching an optional filter.
#[derive(Debug, Clone, Deserialize)]
pub struct FacetRequest {
    pub project_id: String,
    #[serde(default)]
    pub filter: Option<FilterGroup>,
    pub fields: Vec<String>,
    /// Cap on distinct values returned per field; clamped to the configured
    /// maximum.
    #[serde(default)]
    pub max_values: Option<usize>,
}

/// One term and how many matching variants carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetValue {
    pub value: String,
    pub count: u64,
}

/// Facet counts keyed by field name.
#[derive(Debug, Clone, Serialize)]
pub struct FacetResponse {
    /// Total variants matching the filter (the facet scope).
    pub total: u64,
    pub facets: BTreeMap<String, Vec<FacetValue>>,
}

/// Compute facet counts for one project.
#[instrument(skip_all, fields(project = request.project_id))]
pub async fn compute_facets(
    store: &LocusStore,
    projects: &ProjectManager,
    config: &QueryConfig,
    request: &FacetRequest,
) -> Result<FacetResponse> {
    projects.ensure_exists(&request.project_id).await?;

    if request.fields.is_empty() {
        return Err(LocusError::Validation(
            "no facet fields requested".to_string(),
        ));
    }
    for field in &request.fields {
        match field_spec(field) {
            None => {
                return Err(LocusError::Validation(format!(
                    "unknown facet field '{field}'"
                )))
            }
            Some(spec) if !spec.facetable => {
                return Err(LocusError::Validation(format!(
                    "field '{field}' is not facetable"
                )))
            }
            Some(_) => {}
        }
    }

    let start = Instant::now();
    let max_values = request
        .max_values
        .unwrap_or(config.max_facet_values)
        .clamp(1, config.max_facet_values);

    let query = compile(request.filter.as_ref(), config.max_filter_depth)?;
    let index = SearchIndex::load(store, &request.project_id).await?;
    let scope = index.evaluate(&query);

    let mut facets = BTreeMap::new();
    for field in &request.fields {
        let mut values: Vec<FacetValue> = index
            .postings_for(field)
            .map(|terms| {
                terms
                    .iter()
                    .filter_map(|(term, posting)| {
                        let count = posting.intersection_len(&scope);
                        (count > 0).then(|| FacetValue {
                            value: term.clone(),
                            count,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Highest counts first; ties break on the value so identical requests
        // produce identical output.
        values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        values.truncate(max_values);
        facets.insert(field.clone(), values);
    }

    FACET_QUERIES_TOTAL
        .with_label_values(&[&request.project_id])
        .inc();
    debug!(
        scope = scope.len(),
        fields = request.fields.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "computed facets"
    );

    Ok(FacetResponse {
        total: scope.len(),
        facets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facet_value_ordering() {
        let mut values = vec![
            FacetValue {
                value: "missense_variant".into(),
                count: 3,
            },
            FacetValue {
                value: "stop_gained".into(),
                count: 7,
            },
            FacetValue {
                value: "intron_variant".into(),
                count: 3,
            },
        ];
        values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        let ordered: Vec<&str> = values.iter().map(|v| v.value.as_str()).collect();
        assert_eq!(
            ordered,
            vec!["stop_gained", "intron_variant", "missense_variant"]
        );
    }
}
