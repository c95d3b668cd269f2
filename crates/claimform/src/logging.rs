#![forbid(unsafe_code)]

//! Subscriber setup for binaries and demos embedding the form.
//!
//! The filter comes from `CLAIMFORM_LOG` (an `EnvFilter` directive such as
//! `claimform=debug`), defaulting to `info`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Filter env var.
pub const ENV_LOG: &str = "CLAIMFORM_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Output format of [`init`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Build the filter from `CLAIMFORM_LOG`, falling back to `info`.
#[must_use]
pub fn env_filter() -> EnvFilter {
    filter_from(std::env::var(ENV_LOG).ok().as_deref())
}

/// Parse `directives`; unset, blank or malformed input yields `info`.
#[must_use]
pub fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install a global subscriber. Returns `false` if one was already set.
pub fn init(format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter());
    let result = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_bad_directives_fall_back_to_info() {
        for input in [None, Some(""), Some("   "), Some("claimform=loud")] {
            assert_eq!(filter_from(input).to_string(), "info", "input {input:?}");
        }
    }

    #[test]
    fn directives_are_used_as_given() {
        assert_eq!(
            filter_from(Some(" claimform=debug ")).to_string(),
            "claimform=debug"
        );
    }

    #[test]
    fn second_init_is_refused() {
        let _ = init(LogFormat::Pretty);
        assert!(!init(LogFormat::Json));
    }
}
