use anyhow::Result;
use pulsemon_common::proto::metrics_service_server::MetricsServiceServer;
use pulsemon_server::config::ServerConfig;
use pulsemon_server::state::AppState;
use pulsemon_server::{app, grpc};
use std::net::SocketAddr;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server as TonicServer;
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

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulsemon=info".parse()?))
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };
    config.apply_env()?;

    tracing::info!(
        http = %config.http_address,
        grpc = ?config.grpc_address,
        store_path = ?config.storage.store_path,
        store_interval_secs = config.storage.store_interval_secs,
        restore = config.storage.restore,
        db = ?config.redacted_dsn(),
        signed = config.key.is_some(),
        "pulsemon-server starting"
    );

    let storage = pulsemon_storage::open(&config.storage).await?;
    let state = AppState::new(storage.clone(), config.clone());
    let token = CancellationToken::new();

    // gRPC server
    let grpc_handle = match &config.grpc_address {
        Some(addr) => {
            let grpc_addr: SocketAddr = addr.parse()?;
            let service = MetricsServiceServer::new(grpc::MetricsServiceImpl::new(state.clone()));
            let shutdown = token.clone();
            tracing::info!(grpc = %grpc_addr, "gRPC server listening");
            Some(tokio::spawn(async move {
                TonicServer::builder()
                    .add_service(service)
                    .serve_with_shutdown(grpc_addr, async move { shutdown.cancelled().await })
                    .await
            }))
        }
        None => None,
    };

    // HTTP server
    let http_listener = tokio::net::TcpListener::bind(&config.http_address).await?;
    tracing::info!(http = %http_listener.local_addr()?, "HTTP server listening");
    let http_shutdown = token.clone();
    let mut http_handle = tokio::spawn(async move {
        axum::serve(http_listener, app::build_http_app(state))
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await
    });

    let http_result = tokio::select! {
        result = &mut http_handle => Some(result),
        _ = shutdown_signal() => {
            tracing::info!("Shutting down gracefully");
            None
        }
    };

    token.cancel();
    // In-flight HTTP requests finish before storage is closed.
    let http_result = match http_result {
        Some(result) => result,
        None => http_handle.await,
    };
    match http_result {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server error"),
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        Ok(Ok(())) => {}
    }

    if let Some(handle) = grpc_handle {
        match handle.await {
            Ok(Err(e)) => tracing::error!(error = %e, "gRPC server error"),
            Err(e) => tracing::error!(error = %e, "gRPC server task failed"),
            Ok(Ok(())) => {}
        }
    }

    if let Err(e) = storage.close().await {
        tracing::error!(error = %e, "Failed to close storage");
    }
    tracing::info!("Server stopped");
    Ok(())
}
