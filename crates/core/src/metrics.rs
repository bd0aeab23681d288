//! Prometheus metrics for the pipeline.

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts};

/// Job executions by type and outcome
/// ("completed", "completed_with_failure", "retryable_error", "terminal_error").
pub static JOB_EXECUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("shelfarr_job_executions_total", "Total job executions"),
        &["job_type", "outcome"],
    )
    .unwrap()
});

/// Requests reaching a terminal-for-automation state
/// ("downloaded", "completed", "warn", "failed", "cancelled").
pub static REQUEST_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("shelfarr_request_outcomes_total", "Request outcomes"),
        &["status"],
    )
    .unwrap()
});

/// Register all metrics with a registry (e.g. for a scrape endpoint).
pub fn register_all(registry: &prometheus::Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(JOB_EXECUTIONS.clone()))?;
    registry.register(Box::new(REQUEST_OUTCOMES.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register() {
        let registry = prometheus::Registry::new();
        register_all(&registry).unwrap();

        JOB_EXECUTIONS
            .with_label_values(&["search_indexers", "completed"])
            .inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "shelfarr_job_executions_total"));
    }
}
