//! Thin wrapper around `slog`/`sloggers` so the rest of the workspace can depend on
//! `flux::logging` instead of pulling in the logging crates directly.

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

use sloggers::types::Severity;
use sloggers::{Build, Config, LoggerConfig};

/// Builds the server's root logger: a terminal sink at the given level.
///
/// `level` follows `slog`'s severity names (`"trace"`, `"debug"`, `"info"`, `"warning"`,
/// `"error"`, `"critical"`).
pub fn init(level: &str) -> Logger {
    let toml = format!(
        r#"
type = "terminal"
level = "{}"
destination = "stderr"
"#,
        level
    );

    let config: LoggerConfig = serdeconv::from_toml_str(&toml).expect("malformed logging config");

    config.build_logger().expect("failed to build logger")
}

/// A logger that discards everything; used in tests and as a fallback default.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}

/// Re-exported so callers can name the severity type without depending on `sloggers` directly.
pub type LogLevel = Severity;
