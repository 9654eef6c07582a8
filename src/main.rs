use anyhow::Result;
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use vpsmonit::*;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let broadcaster = broadcaster::Broadcaster::new(app_config.broadcast.subscriber_buffer);

    let metric_source: Arc<dyn source::MetricSource> = Arc::new(source::SysinfoSource::new());
    let aggregator = Arc::new(aggregator::Aggregator::new(
        metric_source,
        broadcaster.clone(),
        Duration::from_millis(app_config.aggregator.source_timeout_ms()),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let aggregator_handle = aggregator::spawn(
        aggregator,
        aggregator::AggregatorConfig {
            tick_interval_ms: app_config.aggregator.tick_interval_ms,
            stats_log_interval_secs: app_config.monitoring.stats_log_interval_secs,
        },
        shutdown_rx,
    );

    let app = routes::app(broadcaster, app_config.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Real-time API listening on http://{}/realtime", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = aggregator_handle.await;
        }
    }

    Ok(())
}
