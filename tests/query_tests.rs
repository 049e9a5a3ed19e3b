mod common;

use common::harness::{raw_annotated, raw_variant, TestHarness};
use locus::error::LocusError;
use locus::filter::FilterGroup;
use locus::query::{execute_query, PageRequest, QueryRequest};
use serde_json::json;

fn filter_from(value: serde_json::Value) -> FilterGroup {
    serde_json::from_value(value).expect("bad filter literal")
}

fn request(project: &str, filter: Option<FilterGroup>) -> QueryRequest {
    QueryRequest {
        project_id: project.to_string(),
        filter,
        page: PageRequest::default(),
    }
}

async fn seeded_harness() -> TestHarness {
    let h = TestHarness::new().await;
    h.seed(
        "demo",
        vec![
            raw_annotated("1", 100, "BRCA1", "missense_variant", "MODERATE", Some("Pathogenic"), Some(0.0001)),
            raw_annotated("1", 250, "BRCA1", "synonymous_variant", "LOW", None, Some(0.2)),
            raw_annotated("2", 50, "TP53", "stop_gained", "HIGH", Some("Pathogenic"), Some(0.00005)),
            raw_annotated("17", 41_244_000, "BRCA1", "stop_gained", "HIGH", Some("Likely_pathogenic"), None),
            raw_variant("X", 5000, "GC", "G"),
        ],
    )
    .await;
    h
}

#[tokio::test]
async fn test_no_filter_matches_everything_in_coordinate_order() {
    let h = seeded_harness().await;
    let page = execute_query(&h.store, &h.projects, &h.config.query, &request("demo", None))
        .await
        .unwrap();

    assert_eq!(page.total, 5);
    assert!(page.next_cursor.is_none());
    let coords: Vec<(String, u64)> = page
        .items
        .iter()
        .map(|s| (s.chrom.clone(), s.pos))
        .collect();
    assert_eq!(
        coords,
        vec![
            ("1".into(), 100),
            ("1".into(), 250),
            ("2".into(), 50),
            ("17".into(), 41_244_000),
            ("X".into(), 5000),
        ]
    );
}

#[tokio::test]
async fn test_term_filter() {
    let h = seeded_harness().await;
    let filter = filter_from(json!({
        "op": "AND",
        "clauses": [{"field": "csq.symbol", "op": "term", "value": "BRCA1"}]
    }));
    let page = execute_query(
        &h.store,
        &h.projects,
        &h.config.query,
        &request("demo", Some(filter)),
    )
    .await
    .unwrap();
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn test_nested_boolean_filter() {
    let h = seeded_harness().await;
    // Pathogenic-or-likely, restricted to high-impact stop gains.
    let filter = filter_from(json!({
        "op": "AND",
        "clauses": [{"field": "csq.impact", "op": "term", "value": "HIGH"}],
        "groups": [{
            "op": "OR",
            "clauses": [
                {"field": "clinvar.clinsig", "op": "term", "value": "Pathogenic"},
                {"field": "clinvar.clinsig", "op": "term", "value": "Likely_pathogenic"}
            ]
        }]
    }));
    let page = execute_query(
        &h.store,
        &h.projects,
        &h.config.query,
        &request("demo", Some(filter)),
    )
    .await
    .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].chrom, "2");
    assert_eq!(page.items[1].chrom, "17");
}

#[tokio::test]
async fn test_range_filter_excludes_records_missing_the_field() {
    let h = seeded_harness().await;
    let filter = filter_from(json!({
        "op": "AND",
        "clauses": [{"field": "population.gnomad_af", "op": "range", "value": {"lt": 0.001}}]
    }));
    let page = execute_query(
        &h.store,
        &h.projects,
        &h.config.query,
        &request("demo", Some(filter)),
    )
    .await
    .unwrap();
    // The chr17 and chrX records carry no gnomad_af and must not match.
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn test_in_and_shorthand_comparison() {
    let h = seeded_harness().await;
    let filter = filter_from(json!({
        "op": "AND",
        "clauses": [
            {"field": "csq.consequence", "op": "in", "value": ["stop_gained", "missense_variant"]},
            {"field": "pos", "op": "lt", "value": 1000}
        ]
    }));
    let page = execute_query(
        &h.store,
        &h.projects,
        &h.config.query,
        &request("demo", Some(filter)),
    )
    .await
    .unwrap();
    assert_eq!(page.total, 2); // 1:100 missense, 2:50 stop_gained
}

#[tokio::test]
async fn test_exists_filter() {
    let h = seeded_harness().await;
    let filter = filter_from(json!({
        "op": "AND",
        "clauses": [{"field": "clinvar.clinsig", "op": "exists"}]
    }));
    let page = execute_query(
        &h.store,
        &h.projects,
        &h.config.query,
        &request("demo", Some(filter)),
    )
    .await
    .unwrap();
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn test_pagination_walks_the_full_result_set_once() {
    let h = TestHarness::new().await;
    let batch: Vec<_> = (1..=25)
        .map(|i| raw_variant("1", i * 10, "A", "T"))
        .collect();
    h.seed("demo", batch).await;

    let mut cursor: Option<String> = None;
    let mut seen = Vec::new();
    loop {
        let req = QueryRequest {
            project_id: "demo".into(),
            filter: None,
            page: PageRequest {
                size: Some(7),
                cursor: cursor.clone(),
            },
        };
        let page = execute_query(&h.store, &h.projects, &h.config.query, &req)
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        seen.extend(page.items.iter().map(|s| s.pos));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let expected: Vec<u64> = (1..=25).map(|i| i * 10).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_page_size_is_clamped() {
    let h = seeded_harness().await;
    let req = QueryRequest {
        project_id: "demo".into(),
        filter: None,
        page: PageRequest {
            size: Some(100_000),
            cursor: None,
        },
    };
    let page = execute_query(&h.store, &h.projects, &h.config.query, &req)
        .await
        .unwrap();
    // Well under the clamp here, but the request must not error.
    assert_eq!(page.items.len(), 5);
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let h = TestHarness::new().await;
    let result =
        execute_query(&h.store, &h.projects, &h.config.query, &request("nope", None)).await;
    assert!(matches!(result, Err(LocusError::ProjectNotFound { .. })));
}

#[tokio::test]
async fn test_unknown_field_is_invalid_filter() {
    let h = seeded_harness().await;
    let filter = filter_from(json!({
        "op": "AND",
        "clauses": [{"field": "bogus.field", "op": "term", "value": "x"}]
    }));
    let result = execute_query(
        &h.store,
        &h.projects,
        &h.config.query,
        &request("demo", Some(filter)),
    )
    .await;
    assert!(matches!(result, Err(LocusError::InvalidFilter { .. })));
}

#[tokio::test]
async fn test_filter_depth_limit() {
    let h = seeded_harness().await;
    // Build a chain deeper than the configured maximum.
    let mut node = json!({"op": "AND", "clauses": [], "groups": []});
    for _ in 0..(h.config.query.max_filter_depth + 1) {
        node = json!({"op": "AND", "clauses": [], "groups": [node]});
    }
    let filter = filter_from(node);
    let result = execute_query(
        &h.store,
        &h.projects,
        &h.config.query,
        &request("demo", Some(filter)),
    )
    .await;
    assert!(matches!(result, Err(LocusError::FilterTooComplex { .. })));
}

#[tokio::test]
async fn test_empty_project_queries_cleanly() {
    let h = TestHarness::new().await;
    h.projects.create("empty", None).await.unwrap();
    let page = execute_query(&h.store, &h.projects, &h.config.query, &request("empty", None))
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert!(page.items.is_empty());
    assert!(page.next_cursor.is_none());
}
