use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};

lazy_static::lazy_static! {
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "locus_http_requests_total", "Total HTTP requests", &["method", "path", "status"]
    ).unwrap();
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "locus_query_duration_seconds", "Filter query duration", &["project"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();
    pub static ref QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "locus_queries_total", "Total filter queries", &["project"]
    ).unwrap();
    pub static ref FACET_QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "locus_facet_queries_total", "Total facet queries", &["project"]
    ).unwrap();
    pub static ref INGEST_DURATION: HistogramVec = register_histogram_vec!(
        "locus_ingest_duration_seconds", "Ingestion batch duration", &["project"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();
    pub static ref INGEST_RECORDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "locus_ingest_records_total", "Records processed by ingestion", &["project", "outcome"]
    ).unwrap();
    pub static ref INDEX_BUILD_DURATION: HistogramVec = register_histogram_vec!(
        "locus_index_build_duration_seconds", "Index rebuild duration", &["project"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();
    pub static ref STORE_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "locus_store_operation_duration_seconds", "Object store operation latency",
        &["operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();
    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "locus_store_errors_total", "Object store operation errors", &["operation"]
    ).unwrap();
    pub static ref EXPORTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "locus_exports_total", "Export jobs started", &["project", "format"]
    ).unwrap();
    pub static ref EXPORT_ROWS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "locus_export_rows_total", "Rows written by exports", &["project"]
    ).unwrap();
    pub static ref ACTIVE_EXPORTS: IntGauge = register_int_gauge!(
        "locus_active_exports", "Number of in-flight export streams"
    ).unwrap();
}

/// RAII guard that decrements an IntGauge on drop.
pub struct GaugeGuard(pub &'static IntGauge);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

pub fn init() {
    lazy_static::initialize(&HTTP_REQUESTS_TOTAL);
    lazy_static::initialize(&QUERY_DURATION);
    lazy_static::initialize(&QUERIES_TOTAL);
    lazy_static::initialize(&FACET_QUERIES_TOTAL);
    lazy_static::initialize(&INGEST_DURATION);
    lazy_static::initialize(&INGEST_RECORDS_TOTAL);
    lazy_static::initialize(&INDEX_BUILD_DURATION);
    lazy_static::initialize(&STORE_OPERATION_DURATION);
    lazy_static::initialize(&STORE_ERRORS_TOTAL);
    lazy_static::initialize(&EXPORTS_TOTAL);
    lazy_static::initialize(&EXPORT_ROWS_TOTAL);
    lazy_static::initialize(&ACTIVE_EXPORTS);
}
