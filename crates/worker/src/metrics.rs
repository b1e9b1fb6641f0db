//! Prometheus metrics for the judge worker.

use std::sync::LazyLock;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// End-to-end submission handling duration.
pub static HANDLE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new("judge_worker_handle_duration_seconds", "Time spent handling one submission")
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]);
    HistogramVec::new(opts, &["language"]).expect("failed to create histogram")
});

/// Verdict counter by submission-level error code.
pub static SUBMISSIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new("judge_worker_submissions_total", "Total submissions handled, by error code");
    IntCounterVec::new(opts, &["error_code"]).expect("failed to create counter")
});

pub static DELIVERIES_REQUEUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("judge_worker_deliveries_requeued_total", "Total deliveries requeued after a transient failure")
        .expect("failed to create counter")
});

pub static ACTIVE_SUBMISSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("judge_worker_active_submissions", "Submissions currently being handled")
        .expect("failed to create gauge")
});

/// Numeric encoding of the consumer state machine: Connecting=0, Consuming=1,
/// Paused=2, Draining=3, Closed=4.
pub static CONSUMER_STATE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("judge_worker_state", "Adaptive Consumer state machine position").expect("failed to create gauge")
});

/// 1 while the consumer is paused due to host-health thresholds, else 0.
pub static PAUSED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("judge_worker_paused", "Whether the consumer is currently paused for host health")
        .expect("failed to create gauge")
});

pub fn init_metrics() {
    REGISTRY.register(Box::new(HANDLE_DURATION.clone())).expect("failed to register metric");
    REGISTRY.register(Box::new(SUBMISSIONS_TOTAL.clone())).expect("failed to register metric");
    REGISTRY.register(Box::new(DELIVERIES_REQUEUED.clone())).expect("failed to register metric");
    REGISTRY.register(Box::new(ACTIVE_SUBMISSIONS.clone())).expect("failed to register metric");
    REGISTRY.register(Box::new(CONSUMER_STATE.clone())).expect("failed to register metric");
    REGISTRY.register(Box::new(PAUSED.clone())).expect("failed to register metric");
}

pub fn record_submission(error_code: &str, duration_secs: f64, language: &str) {
    SUBMISSIONS_TOTAL.with_label_values(&[error_code]).inc();
    HANDLE_DURATION.with_label_values(&[language]).observe(duration_secs);
}

/// HTTP server exposing `/metrics` and `/health`.
pub struct MetricsServer;

impl MetricsServer {
    pub async fn run(port: u16) -> anyhow::Result<()> {
        use axum::{routing::get, Router};
        use std::net::SocketAddr;

        init_metrics();

        let app = Router::new()
            .route("/metrics", get(Self::metrics_handler))
            .route("/health", get(|| async { "OK" }));

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        tracing::info!("metrics server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    async fn metrics_handler() -> String {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}
