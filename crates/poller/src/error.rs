//! Error types for poll runs
//!
//! Three layers, matching where a problem is detected:
//! - [`ConfigError`] is returned synchronously by
//!   [`PollerBuilder::build`](crate::PollerBuilder::build) and never enters
//!   the attempt loop.
//! - [`AttemptError`] is one failed attempt: the task's own error, a
//!   synthetic attempt timeout, or a panic raised by the task producer.
//! - [`PollError`] is how the master future fails: the chronological list of
//!   attempt errors, or a single [`Cancellation`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::attempt::CancelToken;

/// Result type of a finished poll run
pub type PollResult<T, E> = Result<T, PollError<E>>;

/// Result type for configuration assembly and validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration problems detected before any attempt is made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No task producer was supplied to the builder
    #[error("No task function was specified")]
    MissingTask,

    /// A setting is out of range
    #[error("Invalid poll configuration: {message}")]
    Validation {
        /// What is wrong with the setting
        message: String,
    },
}

impl ConfigError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Why a single attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    /// The task reported a failure
    #[error("{0}")]
    Task(E),

    /// The attempt did not settle within the configured attempt timeout
    #[error("attempt timed out after {}ms", .after.as_millis())]
    TimedOut {
        /// The attempt timeout that elapsed
        after: Duration,
    },

    /// The task producer panicked while starting the attempt
    #[error("{message}")]
    Panicked {
        /// The panic payload, when it was a string
        message: String,
    },
}

impl<E> AttemptError<E> {
    /// The task's own error, if this attempt failed with one
    pub fn task_error(&self) -> Option<&E> {
        match self {
            Self::Task(err) => Some(err),
            _ => None,
        }
    }

    /// Whether this attempt was cut short by the attempt timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// How a run was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    /// The task replied with [`Attempt::decline`](crate::Attempt::decline)
    Declined,
    /// The task failed with the shared [`CANCEL_TOKEN`](crate::CANCEL_TOKEN)
    Token(&'static CancelToken),
    /// The token passed to [`PollerBuilder::cancel_on`](crate::PollerBuilder::cancel_on) fired
    External,
}

impl fmt::Display for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declined => write!(f, "Cancelled"),
            Self::Token(token) => write!(f, "{token}"),
            Self::External => write!(f, "Cancelled externally"),
        }
    }
}

/// Why the master future did not resolve with a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    /// Every attempt in the retry budget failed
    Exhausted {
        /// One entry per failed attempt, oldest first
        errors: Vec<AttemptError<E>>,
    },

    /// The continuation predicate stopped the run after a failure
    Vetoed {
        /// One entry per failed attempt, oldest first
        errors: Vec<AttemptError<E>>,
    },

    /// The overall deadline elapsed before the run settled
    DeadlineExceeded {
        /// The configured overall deadline
        deadline: Duration,
        /// Attempt errors collected before the deadline, possibly none
        errors: Vec<AttemptError<E>>,
    },

    /// The run was cancelled; this is its only error entry
    Cancelled(Cancellation),
}

impl<E: fmt::Display> fmt::Display for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { errors } => write!(
                f,
                "poll failed after {} attempt(s): {}",
                errors.len(),
                ErrorList(errors)
            ),
            Self::Vetoed { errors } => write!(
                f,
                "poll stopped by continuation predicate after {} attempt(s): {}",
                errors.len(),
                ErrorList(errors)
            ),
            Self::DeadlineExceeded { deadline, errors } => write!(
                f,
                "poll deadline of {}ms exceeded after {} failed attempt(s)",
                deadline.as_millis(),
                errors.len()
            ),
            Self::Cancelled(cancellation) => write!(f, "{cancellation}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for PollError<E> {}

impl<E> PollError<E> {
    /// Collected attempt errors in chronological order.
    ///
    /// Empty for [`PollError::Cancelled`], whose single entry is the
    /// cancellation itself.
    pub fn errors(&self) -> &[AttemptError<E>] {
        match self {
            Self::Exhausted { errors }
            | Self::Vetoed { errors }
            | Self::DeadlineExceeded { errors, .. } => errors,
            Self::Cancelled(_) => &[],
        }
    }

    /// Consume the error and return the collected attempt errors
    pub fn into_errors(self) -> Vec<AttemptError<E>> {
        match self {
            Self::Exhausted { errors }
            | Self::Vetoed { errors }
            | Self::DeadlineExceeded { errors, .. } => errors,
            Self::Cancelled(_) => Vec::new(),
        }
    }

    /// Number of failed attempts recorded before settlement
    pub fn attempts(&self) -> usize {
        self.errors().len()
    }

    /// The cancellation, if the run was cancelled
    pub fn cancellation(&self) -> Option<Cancellation> {
        match self {
            Self::Cancelled(cancellation) => Some(*cancellation),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

/// `[a, b, c]` rendering of collected errors for `Display`
struct ErrorList<'a, E>(&'a [AttemptError<E>]);

impl<E: fmt::Display> fmt::Display for ErrorList<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        f.write_str("]")
    }
}
