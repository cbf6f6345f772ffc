//! Prometheus metrics for the points ledger.
//!
//! All metrics follow the naming convention: `ledger_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: monotonically increasing (e.g. operations_total)
//! - **Histogram**: distribution of values (e.g. operation_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{exponential_buckets, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Metrics registry owned by the ledger
    pub static ref REGISTRY: Registry = Registry::new();

    /// Ledger operations by outcome
    pub static ref LEDGER_OPERATIONS: CounterVec = CounterVec::new(
        Opts::new("ledger_operations_total", "Ledger operations by name and outcome"),
        &["operation", "outcome"]  // outcome: ok or an error kind
    ).expect("metric creation failed");

    /// Points credited or debited, by currency
    pub static ref POINTS_MOVED: CounterVec = CounterVec::new(
        Opts::new("ledger_points_moved_total", "Points moved by currency and direction"),
        &["currency", "direction"]  // direction: credit/debit
    ).expect("metric creation failed");

    /// RP burned, by destination
    pub static ref RP_BURNED: CounterVec = CounterVec::new(
        Opts::new("ledger_rp_burned_total", "Reward points burned by destination"),
        &["destination"]  // destination: tbc/sh
    ).expect("metric creation failed");

    /// Time spent inside a ledger operation
    pub static ref OPERATION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "ledger_operation_duration_seconds",
            "Time spent executing ledger operations"
        ).buckets(exponential_buckets(0.00001, 2.0, 16).expect("bucket layout is valid")),
        &["operation"]
    ).expect("metric creation failed");
}

/// Register all ledger collectors with [`REGISTRY`].
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(LEDGER_OPERATIONS.clone()),
        Box::new(POINTS_MOVED.clone()),
        Box::new(RP_BURNED.clone()),
        Box::new(OPERATION_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Count one finished operation.
pub fn record_operation(operation: &str, outcome: &str) {
    LEDGER_OPERATIONS
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Count points credited (`credit = true`) or debited.
pub fn record_points(currency: &str, credit: bool, amount: u64) {
    let direction = if credit { "credit" } else { "debit" };
    POINTS_MOVED
        .with_label_values(&[currency, direction])
        .inc_by(amount as f64);
}

/// Count RP burned into `destination`.
pub fn record_rp_burn(destination: &str, amount: u64) {
    RP_BURNED
        .with_label_values(&[destination])
        .inc_by(amount as f64);
}

/// Timer guard observing [`OPERATION_DURATION`] on drop.
pub struct OperationTimer {
    operation: &'static str,
    start: std::time::Instant,
}

impl OperationTimer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        OPERATION_DURATION
            .with_label_values(&[self.operation])
            .observe(self.start.elapsed().as_secs_f64());
    }
}
