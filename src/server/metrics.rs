use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Workdesk metrics
const PREFIX: &str = "workdesk";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Backup Metrics
    pub static ref BACKUP_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_backup_runs_total"), "Total backup runs by outcome"),
        &["outcome"]
    ).expect("Failed to create backup_runs_total metric");

    pub static ref BACKUP_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_backup_duration_seconds"),
            "Backup pipeline duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
        &["outcome"]
    ).expect("Failed to create backup_duration_seconds metric");

    pub static ref BACKUP_RUNNING: Gauge = Gauge::new(
        format!("{PREFIX}_backup_running"),
        "1 while a backup run is in progress"
    ).expect("Failed to create backup_running metric");

    pub static ref BACKUP_COLLECTION_RECORDS: GaugeVec = GaugeVec::new(
        Opts::new(
            format!("{PREFIX}_backup_collection_records"),
            "Records exported per collection by the last run"
        ),
        &["collection"]
    ).expect("Failed to create backup_collection_records metric");

    pub static ref RETENTION_DELETED_FILES_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_retention_deleted_files_total"),
        "Backup files removed by retention"
    ).expect("Failed to create retention_deleted_files_total metric");

    pub static ref NOTIFICATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_notifications_total"), "Backup notifications by outcome"),
        &["outcome"]
    ).expect("Failed to create notifications_total metric");

    pub static ref SCHEDULER_REGISTERED: Gauge = Gauge::new(
        format!("{PREFIX}_backup_scheduler_registered"),
        "1 while the daily backup trigger is registered"
    ).expect("Failed to create backup_scheduler_registered metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_COLLECTION_RECORDS.clone()));
    let _ = REGISTRY.register(Box::new(RETENTION_DELETED_FILES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SCHEDULER_REGISTERED.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a finished backup run, `outcome` is "success" or "failed"
pub fn record_backup_run(outcome: &str, duration: Duration) {
    BACKUP_RUNS_TOTAL.with_label_values(&[outcome]).inc();
    BACKUP_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

pub fn set_backup_running(running: bool) {
    BACKUP_RUNNING.set(if running { 1.0 } else { 0.0 });
}

pub fn set_collection_records(collection: &str, count: usize) {
    BACKUP_COLLECTION_RECORDS
        .with_label_values(&[collection])
        .set(count as f64);
}

pub fn record_retention_deletions(count: usize) {
    RETENTION_DELETED_FILES_TOTAL.inc_by(count as u64);
}

pub fn record_notification(outcome: &str) {
    NOTIFICATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_scheduler_registered(registered: bool) {
    SCHEDULER_REGISTERED.set(if registered { 1.0 } else { 0.0 });
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // RSS is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
