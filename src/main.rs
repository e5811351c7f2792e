use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vessel_core::{RealTimeManager, VesselCoreConfig};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let config = VesselCoreConfig::load().into_diagnostic()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting vessel-core");

    let manager = RealTimeManager::new(config);
    manager.start().await;

    tokio::signal::ctrl_c().await.into_diagnostic()?;
    info!("shutdown signal received, stopping vessel-core");

    manager.stop().await;
    Ok(())
}
