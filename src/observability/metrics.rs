//! Metric catalog for the discovery pipeline.
//!
//! One enum holds every metric name so stages never pass magic strings;
//! small per-stage helper modules wrap the `metrics` macros.

use std::fmt;

use crate::error::{PipelineError, Result};

/// Every metric the pipeline records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Discovery
    DiscoveryQueriesOk,
    DiscoveryQueriesError,
    DiscoveryUrlsFound,
    DiscoveryDuration,

    // Domain filter
    FilterUrlsKept,
    FilterUrlsDropped,

    // Extraction
    ExtractPagesProcessed,
    ExtractPagesDropped,
    ExtractEventsFound,
    ExtractDuration,

    // Validation
    ValidateAccepted,
    ValidateExpired,
    ValidateRejected,

    // Yield control
    YieldDomainsAccepted,
    YieldDomainsRejected,
    YieldEventsAccepted,

    // Curation
    CurateBatchesOk,
    CurateBatchesFallback,
    CurateDuration,

    // Persistence
    PersistCreated,
    PersistUpdated,
    PersistDuplicate,
    PersistSkipped,
    PersistErrors,

    // Whole-run
    RunsCompleted,
    RunDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::DiscoveryQueriesOk => "cartelera_discovery_queries_ok_total",
            MetricName::DiscoveryQueriesError => "cartelera_discovery_queries_error_total",
            MetricName::DiscoveryUrlsFound => "cartelera_discovery_urls_found_total",
            MetricName::DiscoveryDuration => "cartelera_discovery_duration_seconds",

            MetricName::FilterUrlsKept => "cartelera_filter_urls_kept_total",
            MetricName::FilterUrlsDropped => "cartelera_filter_urls_dropped_total",

            MetricName::ExtractPagesProcessed => "cartelera_extract_pages_processed_total",
            MetricName::ExtractPagesDropped => "cartelera_extract_pages_dropped_total",
            MetricName::ExtractEventsFound => "cartelera_extract_events_found_total",
            MetricName::ExtractDuration => "cartelera_extract_duration_seconds",

            MetricName::ValidateAccepted => "cartelera_validate_accepted_total",
            MetricName::ValidateExpired => "cartelera_validate_expired_total",
            MetricName::ValidateRejected => "cartelera_validate_rejected_total",

            MetricName::YieldDomainsAccepted => "cartelera_yield_domains_accepted_total",
            MetricName::YieldDomainsRejected => "cartelera_yield_domains_rejected_total",
            MetricName::YieldEventsAccepted => "cartelera_yield_events_accepted_total",

            MetricName::CurateBatchesOk => "cartelera_curate_batches_ok_total",
            MetricName::CurateBatchesFallback => "cartelera_curate_batches_fallback_total",
            MetricName::CurateDuration => "cartelera_curate_duration_seconds",

            MetricName::PersistCreated => "cartelera_persist_created_total",
            MetricName::PersistUpdated => "cartelera_persist_updated_total",
            MetricName::PersistDuplicate => "cartelera_persist_duplicate_total",
            MetricName::PersistSkipped => "cartelera_persist_skipped_total",
            MetricName::PersistErrors => "cartelera_persist_errors_total",

            MetricName::RunsCompleted => "cartelera_runs_completed_total",
            MetricName::RunDuration => "cartelera_run_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Install the Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| PipelineError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
    Ok(())
}

pub mod discovery {
    use super::MetricName;

    pub fn query_ok() {
        ::metrics::counter!(MetricName::DiscoveryQueriesOk.as_str()).increment(1);
    }

    pub fn query_error() {
        ::metrics::counter!(MetricName::DiscoveryQueriesError.as_str()).increment(1);
    }

    pub fn urls_found(count: u64) {
        ::metrics::counter!(MetricName::DiscoveryUrlsFound.as_str()).increment(count);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::DiscoveryDuration.as_str()).record(secs);
    }
}

pub mod filter {
    use super::MetricName;

    pub fn kept(count: u64) {
        ::metrics::counter!(MetricName::FilterUrlsKept.as_str()).increment(count);
    }

    pub fn dropped(count: u64) {
        ::metrics::counter!(MetricName::FilterUrlsDropped.as_str()).increment(count);
    }
}

pub mod extract {
    use super::MetricName;

    pub fn page_processed() {
        ::metrics::counter!(MetricName::ExtractPagesProcessed.as_str()).increment(1);
    }

    pub fn page_dropped(reason: &str) {
        ::metrics::counter!(MetricName::ExtractPagesDropped.as_str(), "reason" => reason.to_string())
            .increment(1);
    }

    pub fn events_found(count: u64) {
        ::metrics::counter!(MetricName::ExtractEventsFound.as_str()).increment(count);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::ExtractDuration.as_str()).record(secs);
    }
}

pub mod validate {
    use super::MetricName;

    pub fn accepted(count: u64) {
        ::metrics::counter!(MetricName::ValidateAccepted.as_str()).increment(count);
    }

    pub fn expired(count: u64) {
        ::metrics::counter!(MetricName::ValidateExpired.as_str()).increment(count);
    }

    pub fn rejected(count: u64) {
        ::metrics::counter!(MetricName::ValidateRejected.as_str()).increment(count);
    }
}

pub mod yield_control {
    use super::MetricName;

    pub fn domain_accepted() {
        ::metrics::counter!(MetricName::YieldDomainsAccepted.as_str()).increment(1);
    }

    pub fn domain_rejected() {
        ::metrics::counter!(MetricName::YieldDomainsRejected.as_str()).increment(1);
    }

    pub fn events_accepted(count: u64) {
        ::metrics::counter!(MetricName::YieldEventsAccepted.as_str()).increment(count);
    }
}

pub mod curate {
    use super::MetricName;

    pub fn batch_ok() {
        ::metrics::counter!(MetricName::CurateBatchesOk.as_str()).increment(1);
    }

    pub fn batch_fallback() {
        ::metrics::counter!(MetricName::CurateBatchesFallback.as_str()).increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::CurateDuration.as_str()).record(secs);
    }
}

pub mod persist {
    use super::MetricName;

    pub fn created() {
        ::metrics::counter!(MetricName::PersistCreated.as_str()).increment(1);
    }

    pub fn updated() {
        ::metrics::counter!(MetricName::PersistUpdated.as_str()).increment(1);
    }

    pub fn duplicate() {
        ::metrics::counter!(MetricName::PersistDuplicate.as_str()).increment(1);
    }

    pub fn skipped() {
        ::metrics::counter!(MetricName::PersistSkipped.as_str()).increment(1);
    }

    pub fn error() {
        ::metrics::counter!(MetricName::PersistErrors.as_str()).increment(1);
    }
}

pub mod run {
    use super::MetricName;

    pub fn completed(status: &str) {
        ::metrics::counter!(MetricName::RunsCompleted.as_str(), "status" => status.to_string())
            .increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_follow_prometheus_conventions() {
        let names = [
            MetricName::DiscoveryQueriesOk,
            MetricName::ExtractDuration,
            MetricName::PersistCreated,
            MetricName::RunsCompleted,
        ];
        for name in names {
            let s = name.as_str();
            assert!(s.starts_with("cartelera_"));
            assert!(s.ends_with("_total") || s.ends_with("_seconds"));
            assert_eq!(s, name.to_string());
        }
    }
}
