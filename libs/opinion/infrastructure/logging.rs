//! Logging setup
//!
//! Installs the process-wide tracing subscriber. `RUST_LOG` wins when set;
//! otherwise the requested level applies to the bot's own crates while the
//! HTTP and WebSocket internals stay at warn.

use tracing_subscriber::EnvFilter;

/// Transport crates whose debug output drowns the trading log.
const QUIET_CRATES: &[&str] = &["hyper", "reqwest", "tungstenite", "tokio_tungstenite"];

/// Initialize tracing at the given level (error/warn/info/debug/trace).
/// Unknown levels fall back to info.
pub fn init_tracing(level: &str) {
    let valid = ["error", "warn", "info", "debug", "trace"];
    let level = if valid.contains(&level) { level } else { "info" };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = vec![
            level.to_string(),
            format!("opinion={level}"),
            format!("opinion_mm_bot={level}"),
        ];
        directives.extend(QUIET_CRATES.iter().map(|krate| format!("{krate}=warn")));
        EnvFilter::new(directives.join(","))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
