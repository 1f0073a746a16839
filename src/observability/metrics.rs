use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the payment ledger.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_admission_created(&self, currency: &str) {
        counter!("ledger_admissions_total", "result" => "created", "currency" => currency.to_string()).increment(1);
    }

    pub fn record_admission_duplicate(&self) {
        counter!("ledger_admissions_total", "result" => "duplicate").increment(1);
    }

    pub fn record_payment_settled(&self, currency: &str) {
        counter!("ledger_payments_settled_total", "currency" => currency.to_string()).increment(1);
    }

    pub fn record_payment_failed(&self, reason: &str) {
        counter!("ledger_payments_failed_total", "reason" => reason.to_string()).increment(1);
    }

    pub fn record_settlement_latency(&self, duration_ms: f64) {
        histogram!("ledger_settlement_duration_ms").record(duration_ms);
    }

    pub fn record_outbox_published(&self, event_type: &str) {
        counter!("outbox_events_published_total", "event_type" => event_type.to_string()).increment(1);
    }

    pub fn record_outbox_failure(&self, event_type: &str) {
        counter!("outbox_delivery_failures_total", "event_type" => event_type.to_string()).increment(1);
    }

    pub fn record_outbox_dead_letter(&self, event_type: &str) {
        counter!("outbox_dead_letter_total", "event_type" => event_type.to_string()).increment(1);
    }

    pub fn set_outbox_backlog(&self, count: i64) {
        gauge!("outbox_unpublished_events").set(count as f64);
    }

    pub fn record_consumer_processed(&self, consumer_group: &str, result: &str) {
        counter!("consumer_events_total", "group" => consumer_group.to_string(), "result" => result.to_string()).increment(1);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }

    pub fn record_cache_operation(&self, operation: &str, success: bool) {
        counter!("idempotency_cache_operations_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("ledger_admissions_total", Unit::Count, "Payment admissions by result");
    describe_counter!("ledger_payments_settled_total", Unit::Count, "Payments settled");
    describe_counter!("ledger_payments_failed_total", Unit::Count, "Payments failed");
    describe_histogram!("ledger_settlement_duration_ms", Unit::Milliseconds, "Settlement latency in milliseconds");

    describe_counter!("outbox_events_published_total", Unit::Count, "Outbox events delivered to the log");
    describe_counter!("outbox_delivery_failures_total", Unit::Count, "Outbox delivery failures");
    describe_counter!("outbox_dead_letter_total", Unit::Count, "Outbox events past max retries");
    describe_gauge!("outbox_unpublished_events", Unit::Count, "Unpublished outbox backlog");

    describe_counter!("consumer_events_total", Unit::Count, "Consumer processing outcomes");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");

    describe_counter!("idempotency_cache_operations_total", Unit::Count, "Idempotency cache operations");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
