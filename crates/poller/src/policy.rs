//! Continuation decisions and the progress hook
//!
//! One user predicate, `(last error, last value) -> bool`, answers two
//! different questions at two different transitions:
//!
//! - after a success, [`ContinuationPolicy::continue_after_success`]: `true`
//!   keeps polling instead of settling with the value;
//! - after a failure, [`ContinuationPolicy::after_failure`]: `false` stops
//!   the run early with the errors collected so far.
//!
//! Without a predicate a success settles immediately and a failure is retried
//! until the budget is spent.

use std::fmt;

use tracing::debug;

use crate::error::AttemptError;

type Predicate<T, E> = dyn Fn(Option<&AttemptError<E>>, Option<&T>) -> bool + Send + Sync;
type Progress<E> = dyn Fn(u32, &AttemptError<E>) + Send + Sync;

/// What happens after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Wait for the interval and try again
    Retry,
    /// The retry budget is spent
    Exhausted,
    /// The predicate refused to continue
    Vetoed,
}

/// Decision points of the attempt loop, optionally backed by a user predicate
pub struct ContinuationPolicy<T, E> {
    predicate: Option<Box<Predicate<T, E>>>,
}

impl<T, E> Default for ContinuationPolicy<T, E> {
    fn default() -> Self {
        Self { predicate: None }
    }
}

impl<T, E> fmt::Debug for ContinuationPolicy<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationPolicy")
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl<T, E> ContinuationPolicy<T, E> {
    /// Policy delegating both decisions to `predicate`
    pub fn new<P>(predicate: P) -> Self
    where
        P: Fn(Option<&AttemptError<E>>, Option<&T>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Box::new(predicate)),
        }
    }

    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    /// Whether to keep polling although the attempt produced `value`
    pub fn continue_after_success(&self, value: &T) -> bool {
        self.predicate
            .as_ref()
            .is_some_and(|predicate| predicate(None, Some(value)))
    }

    /// Decide the fate of the run after its `failures`-th failed attempt.
    ///
    /// The predicate sees every failure, the last one included, and a veto
    /// wins over an exhausted budget.
    pub fn after_failure(
        &self,
        error: &AttemptError<E>,
        failures: u32,
        retries: u32,
    ) -> FailureDecision {
        match &self.predicate {
            Some(predicate) if !predicate(Some(error), None) => {
                debug!(failures, "continuation predicate vetoed retry");
                FailureDecision::Vetoed
            }
            _ if failures >= retries => FailureDecision::Exhausted,
            _ => FailureDecision::Retry,
        }
    }
}

/// Callback fired once per failed attempt with `(remaining, error)`
pub struct ProgressHook<E> {
    callback: Option<Box<Progress<E>>>,
}

impl<E> Default for ProgressHook<E> {
    fn default() -> Self {
        Self { callback: None }
    }
}

impl<E> fmt::Debug for ProgressHook<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressHook")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl<E> ProgressHook<E> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(u32, &AttemptError<E>) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Report a failed attempt; `remaining` counts this attempt as still available
    pub fn notify(&self, remaining: u32, error: &AttemptError<E>) {
        if let Some(callback) = &self.callback {
            callback(remaining, error);
        }
    }
}
