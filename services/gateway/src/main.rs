// Gateway service main entry point.
mod observability;

use anyhow::{Context, Result};
use gateway::config::GatewayConfig;
use gateway::transport::{self, GatewayState};
use std::future::Future;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    run_with_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("courier-gateway")?;
    let config = GatewayConfig::from_env_or_yaml()?;

    let metrics_bind = config.metrics_bind;
    tokio::spawn(async move {
        if let Err(err) = observability::serve_metrics(metrics_handle, metrics_bind).await {
            tracing::warn!(error = %err, "metrics listener exited");
        }
    });

    let state = GatewayState::from_config(&config)?;
    let listener = TcpListener::bind(config.ws_bind)
        .await
        .with_context(|| format!("bind websocket listener on {}", config.ws_bind))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        authentication_required = config.authentication_required,
        cache_limit = config.cache_limit,
        "websocket listener started"
    );

    let server = tokio::spawn(async move {
        if let Err(err) = transport::serve(listener, state).await {
            tracing::warn!(error = %err, "websocket server exited");
        }
    });

    shutdown.await;
    server.abort();
    tracing::info!("gateway stopped");
    Ok(())
}
