use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the crate logs at debug.
pub fn init() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into());

    Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    info!("Tracing subscriber initialized");
    Ok(())
}
