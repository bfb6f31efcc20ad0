use anyhow::Result;
use pulsemon_agent::config::{AgentConfig, TransportKind};
use pulsemon_agent::pool::WorkerPool;
use pulsemon_agent::reporter::{GrpcTransport, HttpTransport, MetricsReporter, Reporter};
use pulsemon_agent::task::SendMetricsTask;
use pulsemon_collector::runtime::RuntimeCollector;
use pulsemon_collector::{Collector, MetricsCollection};
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::quit()),
        ) {
            (Ok(mut term), Ok(mut quit)) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = quit.recv() => {}
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn build_reporter(
    config: &AgentConfig,
    collection: Arc<MetricsCollection>,
) -> Result<Arc<dyn Reporter>> {
    let reporter: Arc<dyn Reporter> = match config.transport {
        TransportKind::Http => Arc::new(MetricsReporter::new(
            collection,
            HttpTransport::new(config.http_mode, config.key.clone())?,
        )),
        TransportKind::Grpc => Arc::new(MetricsReporter::new(collection, GrpcTransport::new())),
    };
    Ok(reporter)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulsemon=info".parse()?))
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => AgentConfig::load(&path)?,
        None => AgentConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;

    tracing::info!(
        server = %config.server_address,
        transport = ?config.transport,
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        rate_limit = config.rate_limit,
        signed = config.key.is_some(),
        "pulsemon-agent starting"
    );

    let collection = Arc::new(MetricsCollection::new());
    let collector = RuntimeCollector::new();
    let reporter = build_reporter(&config, collection.clone())?;

    let token = CancellationToken::new();
    let pool = WorkerPool::new(config.rate_limit)?;
    pool.run(token.clone())?;

    let mut poll_tick = interval(Duration::from_secs(config.poll_interval_secs));
    let mut report_tick = interval(Duration::from_secs(config.report_interval_secs));
    report_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first report so at least one poll lands first.
    report_tick.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                if let Err(e) = collector.collect(&collection) {
                    tracing::warn!(collector = collector.name(), error = %e, "Collection failed");
                }
            }
            _ = report_tick.tick() => {
                let task = SendMetricsTask::new(
                    reporter.clone(),
                    collection.clone(),
                    config.server_address.clone(),
                );
                if let Err(e) = pool.add_task(Box::new(task)) {
                    tracing::warn!(error = %e, "Could not schedule report");
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down gracefully");
                break;
            }
        }
    }

    token.cancel();
    pool.wait().await;
    tracing::info!("In-flight reports finished");
    Ok(())
}
