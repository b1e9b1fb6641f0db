mod config;
mod consumer;
mod health;
mod metrics;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

use config::Config;
use consumer::AdaptiveConsumer;
use health::HealthSampler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "judge_worker=info".into()))
        .init();

    let config = Config::from_env();
    tracing::info!(queue = %config.submission_queue, adaptive_mode = config.adaptive_mode, "starting judge worker");

    let shutdown = Arc::new(AtomicBool::new(false));
    let (health_sampler, health_reading) = HealthSampler::new();

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::MetricsServer::run(metrics_port).await {
            tracing::error!(error = %e, "metrics server exited");
        }
    });

    if config.adaptive_mode {
        tokio::spawn(health_sampler.run());
    }

    tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

    let consumer = AdaptiveConsumer::new(config, shutdown, health_reading);
    consumer.run().await?;

    tracing::info!("judge worker shut down cleanly");
    Ok(())
}

/// Flip the shared shutdown flag on SIGINT or SIGTERM (spec §4.3
/// "Draining").
async fn wait_for_shutdown_signal(shutdown: Arc<AtomicBool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl_c");
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    shutdown.store(true, Ordering::SeqCst);
}
