use anyhow::{Result, anyhow};
use tracing_subscriber::{filter::EnvFilter, fmt};

use crate::config::{BridgeKind, Config};

/// `RUST_LOG` wins; otherwise `info`, plus every uploaded rule on dry runs.
pub fn init_tracing(cfg: &Config) -> Result<()> {
    let fallback = match cfg.bridge {
        BridgeKind::Http => "info",
        BridgeKind::InMem => "info,provision=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("install tracing subscriber: {e}"))
}
