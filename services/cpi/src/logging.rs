//! Logging initialization.
//!
//! Logs are JSON lines on stderr. Stdout is reserved for the response.

use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable consulted when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "WARDEN_CPI_LOG_LEVEL";

/// Level used when nothing else is configured.
pub const DEFAULT_LOG_LEVEL: &str = "debug";

/// Pick the filter directive: `RUST_LOG`, then [`LOG_LEVEL_ENV`], then the
/// configured level, then [`DEFAULT_LOG_LEVEL`].
pub fn filter_directive(
    rust_log: Option<String>,
    level_env: Option<String>,
    configured: Option<&str>,
) -> String {
    rust_log
        .filter(|s| !s.is_empty())
        .or_else(|| level_env.filter(|s| !s.is_empty()))
        .or_else(|| configured.filter(|s| !s.is_empty()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// Install the global subscriber.
pub fn init(configured_level: Option<&str>) -> anyhow::Result<()> {
    let directive = filter_directive(
        std::env::var("RUST_LOG").ok(),
        std::env::var(LOG_LEVEL_ENV).ok(),
        configured_level,
    );
    let filter = EnvFilter::try_new(&directive)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_writer(io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(fmt_layer).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_precedence() {
        let s = |v: &str| Some(v.to_string());

        assert_eq!(filter_directive(s("trace"), s("warn"), Some("info")), "trace");
        assert_eq!(filter_directive(None, s("warn"), Some("info")), "warn");
        assert_eq!(filter_directive(None, None, Some("info")), "info");
        assert_eq!(filter_directive(None, None, None), "debug");
        assert_eq!(filter_directive(s(""), None, Some("")), "debug");
    }
}
