//! Retry policy configuration.
//!
//! [`RetrySettings`] is the raw, user-facing form: the wait may be given in
//! milliseconds or in seconds. [`RetryPolicy`] is the validated form the
//! engine runs with, holding a single effective wait.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

/// Retries made after the first attempt when none is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Wait between attempts when neither wait form is configured.
pub const DEFAULT_MILLIS_BETWEEN_RETRIES: u64 = 60_000;

/// Retry settings as written by the user.
///
/// At most one of `millis_between_retries` and `seconds_between_retries` may
/// be set; [`RetryPolicy::from_settings`] rejects both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait between attempts, in milliseconds.
    #[serde(default)]
    pub millis_between_retries: Option<u64>,

    /// Wait between attempts, in seconds.
    #[serde(default)]
    pub seconds_between_retries: Option<u64>,

    /// Expression producing the acknowledgement on success.
    #[serde(default)]
    pub ack_expression: Option<String>,

    /// Expression that marks a returned event as failed when truthy.
    #[serde(default)]
    pub failure_expression: Option<String>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            millis_between_retries: None,
            seconds_between_retries: None,
            ack_expression: None,
            failure_expression: None,
        }
    }
}

/// Validated retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    wait_between_retries: Duration,
    ack_expression: Option<String>,
    failure_expression: Option<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            wait_between_retries: Duration::from_millis(DEFAULT_MILLIS_BETWEEN_RETRIES),
            ack_expression: None,
            failure_expression: None,
        }
    }
}

impl RetryPolicy {
    /// Validates `settings` and resolves the effective wait.
    ///
    /// Seconds are converted to milliseconds. With no wait configured the
    /// policy waits 60 seconds between attempts.
    pub fn from_settings(settings: &RetrySettings) -> Result<Self> {
        let wait_between_retries =
            match (settings.millis_between_retries, settings.seconds_between_retries) {
                (Some(millis), Some(seconds)) => {
                    return Err(RouterError::configuration(format!(
                        "millis_between_retries ({millis}) and seconds_between_retries \
                         ({seconds}) cannot both be set"
                    )));
                },
                (Some(millis), None) => Duration::from_millis(millis),
                (None, Some(seconds)) => Duration::from_millis(seconds.saturating_mul(1_000)),
                (None, None) => Duration::from_millis(DEFAULT_MILLIS_BETWEEN_RETRIES),
            };

        Ok(Self {
            max_retries: settings.max_retries,
            wait_between_retries,
            ack_expression: non_blank(settings.ack_expression.as_deref()),
            failure_expression: non_blank(settings.failure_expression.as_deref()),
        })
    }

    /// Retries after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts an event receives before it is abandoned.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Effective wait between two attempts.
    pub fn wait_between_retries(&self) -> Duration {
        self.wait_between_retries
    }

    /// Effective wait in milliseconds.
    pub fn millis_between_retries(&self) -> u64 {
        u64::try_from(self.wait_between_retries.as_millis()).unwrap_or(u64::MAX)
    }

    /// Expression producing the acknowledgement, if any.
    pub fn ack_expression(&self) -> Option<&str> {
        self.ack_expression.as_deref()
    }

    /// Expression detecting failures in returned events, if any.
    pub fn failure_expression(&self) -> Option<&str> {
        self.failure_expression.as_deref()
    }

    /// Returns true once `attempt` (1-based) used up every retry.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts()
    }
}

fn non_blank(expression: Option<&str>) -> Option<String> {
    expression.map(str::trim).filter(|expression| !expression.is_empty()).map(str::to_owned)
}
