use std::sync::Once;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

/// Bridges the engine's `(level, event, data)` log callback onto tracing.
pub fn forward_engine_log(
    level: &str,
    event: &str,
    data: serde_json::Value,
) -> imgharvest_engine::Result<()> {
    match level {
        "error" => error!(target: "imgharvest_engine", event, %data),
        "warn" => warn!(target: "imgharvest_engine", event, %data),
        "debug" => debug!(target: "imgharvest_engine", event, %data),
        _ => info!(target: "imgharvest_engine", event, %data),
    }
    Ok(())
}
