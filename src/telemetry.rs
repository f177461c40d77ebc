use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging. `RUST_LOG` wins over the configured level.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .compact()
                    .with_target(false),
            )
            .try_init()?;
    }

    tracing::debug!("Capture workflow telemetry initialized");
    Ok(())
}

/// Generate an identifier for one capture attempt
pub fn generate_session_id() -> Uuid {
    Uuid::new_v4()
}

/// Span wrapping everything driven by one capture engine instance
pub fn create_session_span(session_id: &Uuid, epoch: u64) -> tracing::Span {
    tracing::info_span!(
        "capture_session",
        session.id = %session_id,
        session.epoch = epoch,
    )
}
