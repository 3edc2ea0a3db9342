//! Numeric poll settings
//!
//! [`PollSettings`] is the serialisable half of a poll configuration; the
//! task producer and callbacks are attached through the builder. Settings can
//! be loaded from any serde format:
//!
//! ```rust,ignore
//! let settings: PollSettings = serde_json::from_str(r#"{ "retries": 3 }"#)?;
//! assert_eq!(settings.interval, Duration::from_millis(500));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default pause between the end of one attempt and the start of the next
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Default retry budget
pub const DEFAULT_RETRIES: u32 = 5;

/// Timing and budget settings for one poll run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Delay between attempts, measured from the end of the previous attempt
    #[cfg_attr(feature = "humantime", serde(with = "humantime_serde"))]
    pub interval: Duration,
    /// Maximum number of failed attempts before the run gives up
    pub retries: u32,
    /// Per-attempt limit; an attempt still pending after it counts as failed
    #[cfg_attr(feature = "humantime", serde(with = "humantime_serde"))]
    pub attempt_timeout: Option<Duration>,
    /// Limit for the whole run, measured from the start of the first attempt
    #[cfg_attr(feature = "humantime", serde(with = "humantime_serde"))]
    pub overall_deadline: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            retries: DEFAULT_RETRIES,
            attempt_timeout: None,
            overall_deadline: None,
        }
    }
}

impl PollSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = Some(deadline);
        self
    }

    /// Validate settings at runtime
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retries == 0 {
            return Err(ConfigError::validation("retries must be at least 1"));
        }

        if self.attempt_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::validation(
                "attempt_timeout must be positive when set",
            ));
        }

        if self.overall_deadline.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::validation(
                "overall_deadline must be positive when set",
            ));
        }

        Ok(())
    }
}
