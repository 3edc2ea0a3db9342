//! The poll engine
//!
//! A [`Poller`] drives one run: it invokes the task producer, races each
//! attempt against the attempt timeout, waits `interval` after every attempt
//! that does not settle the run, and races all of it against the overall
//! deadline and an optional external [`CancellationToken`].
//!
//! ```rust,ignore
//! use poller::prelude::*;
//!
//! let status = Poller::<Status, ApiError>::builder()
//!     .task_async(move || client.job_status(id))
//!     .interval(Duration::from_secs(1))
//!     .retries(10)
//!     .attempt_timeout(Duration::from_secs(5))
//!     .should_continue(|_, status| status.is_some_and(|s| !s.is_done()))
//!     .build()?
//!     .run()
//!     .await?;
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attempt::{Attempt, Settlement, Task};
use crate::config::PollSettings;
use crate::error::{
    AttemptError, Cancellation, ConfigError, ConfigResult, PollError, PollResult,
};
use crate::policy::{ContinuationPolicy, FailureDecision, ProgressHook};

/// Validate `builder` and return the master future of its run.
///
/// Configuration errors are reported here, before any future exists.
pub fn poll<T, E>(
    builder: PollerBuilder<T, E>,
) -> ConfigResult<impl Future<Output = PollResult<T, E>>>
where
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    Ok(builder.build()?.run())
}

/// Assembles a [`Poller`]
pub struct PollerBuilder<T, E> {
    task: Option<Box<dyn Task<T, E>>>,
    settings: PollSettings,
    policy: ContinuationPolicy<T, E>,
    progress: ProgressHook<E>,
    cancel: Option<CancellationToken>,
}

impl<T, E> Default for PollerBuilder<T, E> {
    fn default() -> Self {
        Self {
            task: None,
            settings: PollSettings::default(),
            policy: ContinuationPolicy::default(),
            progress: ProgressHook::default(),
            cancel: None,
        }
    }
}

impl<T, E> fmt::Debug for PollerBuilder<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollerBuilder")
            .field("task", &self.task.is_some())
            .field("settings", &self.settings)
            .field("policy", &self.policy)
            .field("progress", &self.progress)
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

impl<T, E> PollerBuilder<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer invoked once per attempt
    #[must_use]
    pub fn task(mut self, task: impl Task<T, E>) -> Self {
        self.task = Some(Box::new(task));
        self
    }

    /// Producer returning a future per attempt
    #[must_use]
    pub fn task_async<F, Fut, R>(self, mut task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Settlement<T, E>> + 'static,
    {
        self.task(move || Attempt::<T, E>::pending(task()))
    }

    /// Replace all numeric settings at once
    #[must_use]
    pub fn settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Pause between the end of one attempt and the start of the next
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.settings.interval = interval;
        self
    }

    /// Maximum number of failed attempts
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.settings.retries = retries;
        self
    }

    /// Fail any attempt still pending after `timeout`
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.settings.attempt_timeout = Some(timeout);
        self
    }

    /// Fail the whole run once `deadline` has elapsed since it started
    #[must_use]
    pub fn overall_deadline(mut self, deadline: Duration) -> Self {
        self.settings.overall_deadline = Some(deadline);
        self
    }

    /// Predicate consulted with `(Some(error), None)` after a failure and
    /// `(None, Some(value))` after a success.
    ///
    /// Returning `false` after a failure stops the run; returning `true`
    /// after a success keeps polling.
    #[must_use]
    pub fn should_continue<P>(mut self, predicate: P) -> Self
    where
        P: Fn(Option<&AttemptError<E>>, Option<&T>) -> bool + Send + Sync + 'static,
    {
        self.policy = ContinuationPolicy::new(predicate);
        self
    }

    /// Callback fired once per failed attempt with `(remaining, error)`
    #[must_use]
    pub fn on_attempt_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32, &AttemptError<E>) + Send + Sync + 'static,
    {
        self.progress = ProgressHook::new(callback);
        self
    }

    /// Settle as cancelled as soon as `token` fires
    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> ConfigResult<Poller<T, E>> {
        let task = self.task.ok_or(ConfigError::MissingTask)?;
        self.settings.validate()?;

        Ok(Poller {
            task,
            settings: self.settings,
            policy: self.policy,
            progress: self.progress,
            cancel: self.cancel,
        })
    }
}

/// A validated poll configuration, ready to run once
pub struct Poller<T, E> {
    task: Box<dyn Task<T, E>>,
    settings: PollSettings,
    policy: ContinuationPolicy<T, E>,
    progress: ProgressHook<E>,
    cancel: Option<CancellationToken>,
}

impl<T, E> fmt::Debug for Poller<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("settings", &self.settings)
            .field("policy", &self.policy)
            .field("progress", &self.progress)
            .field("cancel", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

/// How an attempt concluded, after timeout and panic handling
enum Concluded<T, E> {
    Value(T),
    Failed(AttemptError<E>),
    Cancelled(Cancellation),
}

impl<T, E> From<Settlement<T, E>> for Concluded<T, E> {
    fn from(settlement: Settlement<T, E>) -> Self {
        match settlement {
            Settlement::Value(value) => Self::Value(value),
            Settlement::Failed(err) => Self::Failed(AttemptError::Task(err)),
            Settlement::Declined => Self::Cancelled(Cancellation::Declined),
            Settlement::Cancelled(token) => Self::Cancelled(Cancellation::Token(token)),
        }
    }
}

/// Outcome of racing one suspension point against the run-wide limits
enum Race<O> {
    Done(O),
    DeadlineExceeded,
    Cancelled,
}

/// Mutable state owned by a single run
struct RunState<E> {
    attempts: u32,
    errors: Vec<AttemptError<E>>,
    deadline: Option<Instant>,
}

impl<E> RunState<E> {
    fn start(settings: &PollSettings) -> Self {
        Self {
            attempts: 0,
            errors: Vec::new(),
            deadline: settings.overall_deadline.map(|d| Instant::now() + d),
        }
    }

    fn failures(&self) -> u32 {
        self.errors.len() as u32
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|at| Instant::now() >= at)
    }
}

impl<T, E> Poller<T, E>
where
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    #[must_use]
    pub fn builder() -> PollerBuilder<T, E> {
        PollerBuilder::new()
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Run the poll to completion.
    ///
    /// Resolves with the first accepted value, or fails with every attempt
    /// error collected along the way. Consuming `self` guarantees a single
    /// settlement per run.
    #[tracing::instrument(skip_all, fields(
        pattern = "poll",
        retries = self.settings.retries,
        interval_ms = self.settings.interval.as_millis() as u64,
    ))]
    pub async fn run(self) -> PollResult<T, E> {
        let Self {
            mut task,
            settings,
            policy,
            progress,
            cancel,
        } = self;
        let mut run = RunState::start(&settings);
        debug!(predicate = policy.has_predicate(), "poll started");

        loop {
            if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                warn!(attempts = run.attempts, "poll cancelled externally");
                return Err(PollError::Cancelled(Cancellation::External));
            }
            if run.deadline_passed() {
                return Err(deadline_exceeded(&settings, run));
            }

            run.attempts += 1;
            debug!(attempt = run.attempts, "starting attempt");

            let concluded = match catch_unwind(AssertUnwindSafe(|| task.call())) {
                Err(payload) => Concluded::Failed(AttemptError::Panicked {
                    message: panic_message(payload.as_ref()),
                }),
                Ok(attempt) => {
                    if attempt.is_ready() {
                        debug!(attempt = run.attempts, "attempt settled synchronously");
                    }
                    let settled = attempt.settle(settings.attempt_timeout);
                    match race(settled, run.deadline, cancel.as_ref()).await {
                        Race::Done(Ok(settlement)) => settlement.into(),
                        Race::Done(Err(after)) => {
                            Concluded::Failed(AttemptError::TimedOut { after })
                        }
                        Race::DeadlineExceeded => return Err(deadline_exceeded(&settings, run)),
                        Race::Cancelled => {
                            warn!(attempts = run.attempts, "poll cancelled externally");
                            return Err(PollError::Cancelled(Cancellation::External));
                        }
                    }
                }
            };

            match concluded {
                Concluded::Value(value) => {
                    if !policy.continue_after_success(&value) {
                        info!(attempts = run.attempts, "poll succeeded");
                        return Ok(value);
                    }
                    debug!(
                        attempt = run.attempts,
                        "continuation predicate requested another poll"
                    );
                }
                Concluded::Cancelled(cancellation) => {
                    warn!(attempts = run.attempts, %cancellation, "poll cancelled by task");
                    return Err(PollError::Cancelled(cancellation));
                }
                Concluded::Failed(error) => {
                    let remaining = settings.retries.saturating_sub(run.failures());
                    warn!(attempt = run.attempts, remaining, ?error, "attempt failed");
                    progress.notify(remaining, &error);

                    let decision =
                        policy.after_failure(&error, run.failures() + 1, settings.retries);
                    run.errors.push(error);

                    match decision {
                        FailureDecision::Retry => {}
                        FailureDecision::Exhausted => {
                            warn!(attempts = run.attempts, "retry budget exhausted");
                            return Err(PollError::Exhausted { errors: run.errors });
                        }
                        FailureDecision::Vetoed => {
                            return Err(PollError::Vetoed { errors: run.errors });
                        }
                    }
                }
            }

            debug!(
                interval_ms = settings.interval.as_millis() as u64,
                "scheduling next attempt"
            );
            match race(sleep(settings.interval), run.deadline, cancel.as_ref()).await {
                Race::Done(()) => {}
                Race::DeadlineExceeded => return Err(deadline_exceeded(&settings, run)),
                Race::Cancelled => {
                    warn!(attempts = run.attempts, "poll cancelled externally");
                    return Err(PollError::Cancelled(Cancellation::External));
                }
            }
        }
    }
}

/// Race `work` against the overall deadline and the external token.
///
/// Cancellation wins ties, then the deadline. Whatever loses is dropped here,
/// releasing its timer.
async fn race<F>(
    work: F,
    deadline: Option<Instant>,
    cancel: Option<&CancellationToken>,
) -> Race<F::Output>
where
    F: Future,
{
    let deadline_hit = async {
        match deadline {
            Some(at) => sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        () = cancelled => Race::Cancelled,
        () = deadline_hit => Race::DeadlineExceeded,
        output = work => Race::Done(output),
    }
}

fn deadline_exceeded<E>(settings: &PollSettings, run: RunState<E>) -> PollError<E> {
    let deadline = settings.overall_deadline.unwrap_or_default();
    warn!(
        attempts = run.attempts,
        deadline_ms = deadline.as_millis() as u64,
        "poll deadline exceeded"
    );
    PollError::DeadlineExceeded {
        deadline,
        errors: run.errors,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn counting<T, E>(
        f: impl Fn(u32) -> Attempt<T, E> + Send + 'static,
    ) -> (Arc<AtomicU32>, impl Task<T, E>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let task = move || f(counter.fetch_add(1, Ordering::SeqCst) + 1);
        (calls, task)
    }

    #[test]
    fn build_without_task_fails() {
        let err = Poller::<u32, String>::builder().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingTask);
    }

    #[test]
    fn poll_fails_synchronously_without_task() {
        assert!(poll(PollerBuilder::<u32, String>::new()).is_err());
    }

    #[test]
    fn build_validates_settings() {
        let err = Poller::<u32, String>::builder()
            .task(|| Attempt::value(1))
            .retries(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn builder_applies_settings() {
        let poller = Poller::<u32, String>::builder()
            .task(|| Attempt::value(1))
            .interval(Duration::from_millis(10))
            .retries(2)
            .attempt_timeout(Duration::from_secs(1))
            .overall_deadline(Duration::from_secs(3))
            .build()
            .unwrap();
        assert_eq!(
            *poller.settings(),
            PollSettings::new()
                .with_interval(Duration::from_millis(10))
                .with_retries(2)
                .with_attempt_timeout(Duration::from_secs(1))
                .with_overall_deadline(Duration::from_secs(3))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_calls_task_once() {
        let (calls, task) = counting(|_| Attempt::<_, String>::value("yay"));
        let result = Poller::<&str, String>::builder()
            .task(task)
            .build()
            .unwrap()
            .run()
            .await;
        assert_eq!(result, Ok("yay"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_run_collects_every_error() {
        let (calls, task) = counting(|n| Attempt::<(), u32>::fail(n));
        let err = Poller::<(), u32>::builder()
            .task(task)
            .retries(3)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PollError::Exhausted {
                errors: vec![
                    AttemptError::Task(1),
                    AttemptError::Task(2),
                    AttemptError::Task(3),
                ]
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_producer_is_a_failed_attempt() {
        let err = Poller::<(), String>::builder()
            .task(|| -> Attempt<(), String> { panic!("oops") })
            .retries(1)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.errors()[0].to_string(), "oops");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_before_first_result_reports_explicit_error() {
        let err = Poller::<(), String>::builder()
            .task_async(|| async {
                sleep(Duration::from_secs(10)).await;
                Ok::<_, String>(())
            })
            .overall_deadline(Duration::from_secs(1))
            .build()
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PollError::DeadlineExceeded {
                deadline: Duration::from_secs(1),
                errors: Vec::new(),
            }
        );
    }

    #[test]
    fn panic_message_handles_payload_kinds() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "task panicked");
    }
}
