//! Filter query execution.
//!
//! A request's filter tree is compiled once, evaluated against the project's
//! search index, and paginated in coordinate order. Result order is doc-id
//! order in the index, which is coordinate order by construction, so pages
//! are stable across identical requests.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::QueryConfig;
use crate::error::{LocusError, Result};
use crate::filter::{compile, FilterGroup};
use crate::index::SearchIndex;
use crate::metrics::{QUERIES_TOTAL, QUERY_DURATION};
use crate::project::ProjectManager;
use crate::storage::LocusStore;
use crate::types::VariantSummary;

/// Pagination parameters for a filter query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    /// Requested page size; clamped to the configured bounds.
    #[serde(default)]
    pub size: Option<usize>,
    /// Opaque continuation cursor from a previous page.
    #[serde(default)]
    pub cursor: Option<String>,
}

/// A filter query against one project.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub project_id: String,
    #[serde(default)]
    pub filter: Option<FilterGroup>,
    #[serde(default)]
    pub page: PageRequest,
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResultPage {
    /// Exact number of variants matching the filter.
    pub total: u64,
    pub items: Vec<VariantSummary>,
    /// Cursor for the next page; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Clamp a requested page size into `1..=max`, defaulting when absent.
pub fn clamp_page_size(requested: Option<usize>, config: &QueryConfig) -> usize {
    requested
        .unwrap_or(config.default_page_size)
        .clamp(1, config.max_page_size)
}

fn decode_cursor(cursor: Option<&str>) -> Result<u64> {
    match cursor {
        None => Ok(0),
        Some(c) => c.parse::<u64>().map_err(|_| {
            LocusError::Validation(format!("invalid continuation cursor '{c}'"))
        }),
    }
}

/// Execute a filter query and return one result page.
#[instrument(skip_all, fields(project = request.project_id))]
pub async fn execute_query(
    store: &LocusStore,
    projects: &ProjectManager,
    config: &QueryConfig,
    request: &QueryRequest,
) -> Result<QueryResultPage> {
    projects.ensure_exists(&request.project_id).await?;
    let start = Instant::now();

    let query = compile(request.filter.as_ref(), config.max_filter_depth)?;
    let index = SearchIndex::load(store, &request.project_id).await?;
    let matches = index.evaluate(&query);
    let total = matches.len();

    let size = clamp_page_size(request.page.size, config);
    let offset = decode_cursor(request.page.cursor.as_deref())?;

    let items: Vec<VariantSummary> = matches
        .iter()
        .skip(offset as usize)
        .take(size)
        .filter_map(|id| index.doc(id))
        .map(|doc| doc.to_summary())
        .collect();

    let consumed = offset + items.len() as u64;
    let next_cursor = (consumed < total).then(|| consumed.to_string());

    QUERIES_TOTAL
        .with_label_values(&[&request.project_id])
        .inc();
    QUERY_DURATION
        .with_label_values(&[&request.project_id])
        .observe(start.elapsed().as_secs_f64());
    debug!(total, returned = items.len(), offset, "executed query");

    Ok(QueryResultPage {
        total,
        items,
        next_cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QueryConfig {
        QueryConfig {
            default_page_size: 50,
            max_page_size: 200,
            max_filter_depth: 8,
            max_facet_values: 100,
        }
    }

    #[test]
    fn test_clamp_page_size() {
        let cfg = config();
        assert_eq!(clamp_page_size(None, &cfg), 50);
        assert_eq!(clamp_page_size(Some(0), &cfg), 1);
        assert_eq!(clamp_page_size(Some(25), &cfg), 25);
        assert_eq!(clamp_page_size(Some(5000), &cfg), 200);
    }

    #[test]
    fn test_decode_cursor() {
        assert_eq!(decode_cursor(None).unwrap(), 0);
        assert_eq!(decode_cursor(Some("150")).unwrap(), 150);
        assert!(decode_cursor(Some("not-a-cursor")).is_err());
    }
}
