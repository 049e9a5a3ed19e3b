mod common;

use common::harness::{raw_annotated, raw_variant, TestHarness};
use futures::StreamExt;
use locus::error::LocusError;
use locus::export::{get_variant, start_export, ExportAudit, ExportFormat, ExportRequest};
use locus::fields::field_names;
use serde_json::json;

async fn seeded_harness() -> TestHarness {
    let h = TestHarness::new().await;
    h.seed(
        "demo",
        vec![
            raw_annotated("1", 100, "BRCA1", "missense_variant", "MODERATE", Some("Pathogenic"), Some(0.0001)),
            raw_annotated("2", 50, "TP53", "stop_gained", "HIGH", None, None),
            raw_variant("X", 5000, "GC", "G"),
        ],
    )
    .await;
    h
}

async fn collect_body(
    mut stream: std::pin::Pin<Box<dyn futures::Stream<Item = locus::error::Result<bytes::Bytes>> + Send>>,
) -> String {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.expect("stream error"));
    }
    String::from_utf8(out).expect("non-utf8 export")
}

#[tokio::test]
async fn test_csv_export_header_and_rows() {
    let h = seeded_harness().await;
    let export = start_export(
        &h.store,
        &h.projects,
        &h.config.query,
        ExportRequest {
            project_id: "demo".into(),
            filter: None,
            format: ExportFormat::Csv,
        },
    )
    .await
    .unwrap();

    assert_eq!(export.total, 3);
    let body = collect_body(export.stream).await;
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 4); // header + 3 rows
    assert_eq!(lines[0], field_names().join(","));
    // Rows stream in coordinate order.
    assert!(lines[1].starts_with("1:100:a>t,1,100,A,T"));
    assert!(lines[2].starts_with("2:50:a>t,2,50,A,T"));
    assert!(lines[3].starts_with("x:5000:gc>g,X,5000,GC,G"));
}

#[tokio::test]
async fn test_ndjson_export_lines_parse() {
    let h = seeded_harness().await;
    let export = start_export(
        &h.store,
        &h.projects,
        &h.config.query,
        ExportRequest {
            project_id: "demo".into(),
            filter: None,
            format: ExportFormat::Ndjson,
        },
    )
    .await
    .unwrap();

    let body = collect_body(export.stream).await;
    let parsed: Vec<serde_json::Value> = body
        .lines()
        .map(|l| serde_json::from_str(l).expect("bad NDJSON line"))
        .collect();
    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed[0]["variant_id"], "1:100:a>t");
    assert_eq!(parsed[0]["fields"]["csq.symbol"][0], "BRCA1");
}

#[tokio::test]
async fn test_filtered_export_matches_query_count() {
    let h = seeded_harness().await;
    let filter = serde_json::from_value(json!({
        "op": "AND",
        "clauses": [{"field": "csq.symbol", "op": "term", "value": "BRCA1"}]
    }))
    .unwrap();

    let export = start_export(
        &h.store,
        &h.projects,
        &h.config.query,
        ExportRequest {
            project_id: "demo".into(),
            filter: Some(filter),
            format: ExportFormat::Csv,
        },
    )
    .await
    .unwrap();

    assert_eq!(export.total, 1);
    let body = collect_body(export.stream).await;
    assert_eq!(body.lines().count(), 2); // header + 1 row
}

#[tokio::test]
async fn test_export_writes_audit_object() {
    let h = seeded_harness().await;
    let export = start_export(
        &h.store,
        &h.projects,
        &h.config.query,
        ExportRequest {
            project_id: "demo".into(),
            filter: None,
            format: ExportFormat::Ndjson,
        },
    )
    .await
    .unwrap();

    let data = h
        .store
        .get(&ExportAudit::audit_key(&export.export_id))
        .await
        .unwrap();
    let audit: ExportAudit = serde_json::from_slice(&data).unwrap();
    assert_eq!(audit.project_id, "demo");
    assert_eq!(audit.format, ExportFormat::Ndjson);
    assert_eq!(audit.total, 3);
}

#[tokio::test]
async fn test_export_unknown_project() {
    let h = TestHarness::new().await;
    let result = start_export(
        &h.store,
        &h.projects,
        &h.config.query,
        ExportRequest {
            project_id: "nope".into(),
            filter: None,
            format: ExportFormat::Csv,
        },
    )
    .await;
    assert!(matches!(result, Err(LocusError::ProjectNotFound { .. })));
}

#[tokio::test]
async fn test_dropped_stream_stops_the_producer() {
    let h = TestHarness::new().await;
    // More than one chunk's worth of rows so the stream has several sends.
    let records: Vec<_> = (0..300).map(|i| raw_variant("1", 100 + i, "A", "T")).collect();
    h.seed("demo", records).await;

    let export = start_export(
        &h.store,
        &h.projects,
        &h.config.query,
        ExportRequest {
            project_id: "demo".into(),
            filter: None,
            format: ExportFormat::Csv,
        },
    )
    .await
    .unwrap();
    assert_eq!(export.total, 300);

    let mut stream = export.stream;
    let first = stream.next().await.expect("no first chunk").unwrap();
    assert!(!first.is_empty());
    drop(stream);

    // The producer task must wind down once the consumer is gone.
    let mut waited_ms = 0u64;
    while locus::metrics::ACTIVE_EXPORTS.get() > 0 {
        assert!(waited_ms < 5_000, "export producer did not terminate");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        waited_ms += 10;
    }
}

#[tokio::test]
async fn test_variant_detail_returns_full_record() {
    let h = seeded_harness().await;
    let record = get_variant(&h.store, &h.projects, "demo", "1:100:a>t")
        .await
        .unwrap();
    assert_eq!(record.pos, 100);
    assert_eq!(record.csq[0].symbol.as_deref(), Some("BRCA1"));
    assert_eq!(
        record.population.as_ref().and_then(|p| p.gnomad_af),
        Some(0.0001)
    );
}

#[tokio::test]
async fn test_variant_detail_is_case_insensitive() {
    let h = seeded_harness().await;
    let record = get_variant(&h.store, &h.projects, "demo", "X:5000:GC>G")
        .await
        .unwrap();
    assert_eq!(record.chrom, "X");
    assert_eq!(record.variant_id, "x:5000:gc>g");
}

#[tokio::test]
async fn test_variant_detail_not_found() {
    let h = seeded_harness().await;
    let result = get_variant(&h.store, &h.projects, "demo", "9:999:a>c").await;
    assert!(matches!(result, Err(LocusError::VariantNotFound { .. })));
}
