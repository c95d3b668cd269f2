#![forbid(unsafe_code)]

//! Form configuration.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `CLAIMFORM_DEBOUNCE_MS` | uniqueness check debounce window | `500` |
//! | `CLAIMFORM_TRACE` | record coordinator events (`1`/`true`/`0`/`false`) | `true` |

use std::env;
use std::fmt;
use std::time::Duration;

use claimform_validation::CoordinatorConfig;

/// Debounce window env var.
pub const ENV_DEBOUNCE_MS: &str = "CLAIMFORM_DEBOUNCE_MS";
/// Event trace toggle env var.
pub const ENV_TRACE: &str = "CLAIMFORM_TRACE";

/// Message shown when an email is already registered.
pub const EMAIL_TAKEN_MESSAGE: &str = "Email already exists";
/// Message shown when the uniqueness check could not complete.
pub const EMAIL_CHECK_FAILED_MESSAGE: &str = "Validation error, please try again";

/// Tunables for a [`FormModel`](crate::FormModel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormConfig {
    /// Quiet period before a uniqueness check is issued.
    pub debounce: Duration,
    /// Record coordinator events in a checksummable trace.
    pub trace_enabled: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            trace_enabled: true,
        }
    }
}

impl FormConfig {
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read overrides through `lookup` (unset keys keep their defaults).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DEBOUNCE_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: ENV_DEBOUNCE_MS,
                value: raw.clone(),
                expected: "a non-negative integer (milliseconds)",
            })?;
            config.debounce = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup(ENV_TRACE) {
            config.trace_enabled = parse_flag(&raw).ok_or_else(|| ConfigError::Invalid {
                key: ENV_TRACE,
                value: raw.clone(),
                expected: "one of 1, 0, true, false",
            })?;
        }

        Ok(config)
    }

    /// Coordinator settings derived from this configuration.
    #[must_use]
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_debounce(self.debounce)
            .with_trace(self.trace_enabled)
            .with_rejected_message(EMAIL_TAKEN_MESSAGE)
            .with_failure_message(EMAIL_CHECK_FAILED_MESSAGE)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    let value = raw.trim();
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// A malformed configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid {
                key,
                value,
                expected,
            } => write!(f, "{key}={value:?}: expected {expected}"),
        }
    }
}

impl std::error::Error for ConfigError {}
