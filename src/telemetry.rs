use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging.
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    if config.json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .try_init()?;
    }

    tracing::info!("Repair order telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the log lines of one order
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping the whole lifecycle of one order
pub fn create_order_span(order_number: u64, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "repair_order",
        order.number = order_number,
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique_uuids() {
        let first = generate_correlation_id();
        let second = generate_correlation_id();
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}
