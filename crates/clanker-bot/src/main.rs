use tracing::{error, info, warn};

mod app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("CLANKER_CONFIG").ok();
    let config = clanker_core::config::ClankerConfig::load(config_path.as_deref())?;

    let filter_directive = format!("clanker={}", config.logging.level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter_directive));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!(channels = ?config.channels.names, "starting clanker");

    let state = std::sync::Arc::new(app::AppState::new(&config).await?);

    let resource_task = tokio::spawn(state.resource.clone().run(state.shutdown_rx()));
    let metrics_task = tokio::spawn(state.metrics.clone().run(state.shutdown_rx()));
    let transport_task = {
        let transport = state.transport.clone();
        let auth = state.auth.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.run(auth).await {
                error!(error = %e, "transport loop exited with error");
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        res = transport_task => {
            if let Err(e) = res {
                error!(error = %e, "transport task panicked");
            }
        }
    }

    let _ = state.shutdown_tx.send(true);
    if let Err(e) = resource_task.await {
        warn!(error = %e, "resource monitor task did not shut down cleanly");
    }
    if let Err(e) = metrics_task.await {
        warn!(error = %e, "metrics buffer task did not shut down cleanly");
    }

    info!("clanker stopped");
    Ok(())
}
