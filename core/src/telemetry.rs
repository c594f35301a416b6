//! Tracing setup.
//!
//! Stdout carries the MCP protocol, so every log line goes to stderr.

use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,mcp_tts=info,mcp_tts_core=info,mcp_tts_audio=info";

/// Filter used when verbose logging is requested.
pub const VERBOSE_FILTER: &str = "debug,mcp_tts=debug,mcp_tts_core=debug,mcp_tts_audio=debug";

/// Pick the filter directive: explicit `RUST_LOG` wins, then the verbose switch.
pub fn filter_directive(rust_log: Option<String>, verbose: bool) -> String {
    match rust_log.filter(|s| !s.trim().is_empty()) {
        Some(directive) => directive,
        None if verbose => VERBOSE_FILTER.to_string(),
        None => DEFAULT_FILTER.to_string(),
    }
}

/// Install the global fmt subscriber writing to stderr.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_wins() {
        let d = filter_directive(Some("warn".to_string()), true);
        assert_eq!(d, "warn");
    }

    #[test]
    fn test_verbose_and_default() {
        assert_eq!(filter_directive(None, true), VERBOSE_FILTER);
        assert_eq!(filter_directive(Some("  ".to_string()), false), DEFAULT_FILTER);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init("info");
        init("debug");
    }
}
