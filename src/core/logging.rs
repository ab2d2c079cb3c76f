//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. the `level` argument (if provided)
//! 2. `DAGFLOW_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`

use tracing::Level;

/// Install a global fmt subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already installed, which makes
/// it safe to call from every test.
pub fn init_logging(level: Option<&str>) -> bool {
    let level = level
        .and_then(parse_level_str)
        .or_else(|| {
            std::env::var("DAGFLOW_LOG")
                .ok()
                .and_then(|s| parse_level_str(&s))
        })
        .unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
