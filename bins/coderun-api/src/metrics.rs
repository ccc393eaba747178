// Prometheus metrics for the coderun API

use coderun_common::Language;
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

lazy_static! {
    // Global registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Executions finished (counter with language and outcome labels)
    pub static ref EXECUTIONS: CounterVec = CounterVec::new(
        Opts::new("coderun_executions_total", "Total number of finished executions"),
        &["language", "outcome"]
    )
    .expect("metric can be created");

    // Execution time histogram (in milliseconds)
    pub static ref EXECUTION_TIME: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "coderun_execution_time_ms",
            "Execution time in milliseconds"
        )
        .buckets(vec![100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0]),
        &["language"]
    )
    .expect("metric can be created");

    // Requests rejected before execution
    pub static ref REJECTED: CounterVec = CounterVec::new(
        Opts::new("coderun_requests_rejected_total", "Total requests rejected by validation"),
        &["reason"]
    )
    .expect("metric can be created");
}

/// Register every collector with the global registry
pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(EXECUTIONS.clone()))?;
    REGISTRY.register(Box::new(EXECUTION_TIME.clone()))?;
    REGISTRY.register(Box::new(REJECTED.clone()))?;
    Ok(())
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Record a finished execution, labelled with the canonical language id
pub fn record_execution(language: Language, outcome: &str, execution_time_ms: f64) {
    EXECUTIONS.with_label_values(&[language.id(), outcome]).inc();
    EXECUTION_TIME
        .with_label_values(&[language.id()])
        .observe(execution_time_ms);
}

/// Record a request rejected before execution
pub fn record_rejected(reason: &str) {
    REJECTED.with_label_values(&[reason]).inc();
}
