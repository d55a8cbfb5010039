//! Prometheus metrics for the worker.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    Ok(())
}

/// Metric names as constants for consistency.
pub mod names {
    // Job metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "storyreel_jobs_submitted_total";
    pub const JOBS_FINISHED_TOTAL: &str = "storyreel_jobs_finished_total";
    pub const JOBS_RUNNING: &str = "storyreel_jobs_running";

    // Stage metrics
    pub const STAGE_DURATION_SECONDS: &str = "storyreel_stage_duration_seconds";

    // Collaborator metrics
    pub const ASSET_ATTEMPTS_TOTAL: &str = "storyreel_asset_attempts_total";
    pub const ASSET_RETRIES_TOTAL: &str = "storyreel_asset_retries_total";
    pub const ASSETS_REUSED_TOTAL: &str = "storyreel_assets_reused_total";

    // Consistency metrics
    pub const CONSISTENCY_CORRECTIONS_TOTAL: &str = "storyreel_consistency_corrections_total";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

/// Record a job reaching a terminal state. `category` is set for failures.
pub fn record_job_finished(status: &str, category: Option<&str>) {
    let labels = [
        ("status", status.to_string()),
        ("category", category.unwrap_or("none").to_string()),
    ];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
}

pub fn set_jobs_running(count: usize) {
    gauge!(names::JOBS_RUNNING).set(count as f64);
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a finished collaborator call and how many attempts it took.
pub fn record_asset_attempts(kind: &str, attempts: u32) {
    let labels = [("kind", kind.to_string())];
    counter!(names::ASSET_ATTEMPTS_TOTAL, &labels).increment(attempts as u64);
    if attempts > 1 {
        counter!(names::ASSET_RETRIES_TOTAL, &labels).increment((attempts - 1) as u64);
    }
}

pub fn record_assets_reused(kind: &str, count: usize) {
    let labels = [("kind", kind.to_string())];
    counter!(names::ASSETS_REUSED_TOTAL, &labels).increment(count as u64);
}

pub fn record_consistency_correction(rule: &str) {
    let labels = [("rule", rule.to_string())];
    counter!(names::CONSISTENCY_CORRECTIONS_TOTAL, &labels).increment(1);
}
