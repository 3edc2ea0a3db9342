//! Attempt results and the shared cancellation sentinel
//!
//! A task producer may hand back either a value it already has or a future
//! that settles later. Both are normalised into an [`Attempt`], and every
//! attempt ends as exactly one [`Settlement`]:
//!
//! ```rust,ignore
//! use poller::{Attempt, Settlement, CANCEL_TOKEN};
//!
//! // Plain value, treated as an immediate success
//! let ready: Attempt<u32, String> = Attempt::value(7);
//!
//! // Deferred result
//! let pending: Attempt<u32, String> = Attempt::pending(async { Ok::<_, String>(7) });
//!
//! // Stop the whole run, no retry
//! let stop: Attempt<u32, String> = Attempt::ready(Settlement::Cancelled(&CANCEL_TOKEN));
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

/// Distinguished value a task fails with to cancel the whole run.
///
/// There is exactly one instance, [`CANCEL_TOKEN`]. Equality is by address,
/// so no ordinary error value can collide with it.
pub struct CancelToken {
    label: &'static str,
}

/// The process-wide cancellation sentinel
pub static CANCEL_TOKEN: CancelToken = CancelToken {
    label: "poll cancelled by task",
};

impl CancelToken {
    /// Whether this reference points at [`CANCEL_TOKEN`]
    pub fn is_shared(&self) -> bool {
        std::ptr::eq(self, &CANCEL_TOKEN)
    }
}

impl PartialEq for CancelToken {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for CancelToken {}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancelToken").field(&self.label).finish()
    }
}

impl fmt::Display for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

/// How a single attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement<T, E> {
    /// The attempt produced a value
    Value(T),
    /// The task declined to continue; cancels the run with the `Cancelled` marker
    Declined,
    /// The attempt failed and may be retried
    Failed(E),
    /// The attempt failed with the cancellation sentinel
    Cancelled(&'static CancelToken),
}

impl<T, E> Settlement<T, E> {
    /// Settlement carrying the shared [`CANCEL_TOKEN`]
    pub fn cancelled() -> Self {
        Self::Cancelled(&CANCEL_TOKEN)
    }
}

impl<T, E> From<Result<T, E>> for Settlement<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(err) => Self::Failed(err),
        }
    }
}

enum Repr<T, E> {
    Ready(Settlement<T, E>),
    Pending(BoxFuture<'static, Settlement<T, E>>),
}

/// What a task producer returns for one attempt: a settled result or a future
pub struct Attempt<T, E> {
    repr: Repr<T, E>,
}

impl<T, E> fmt::Debug for Attempt<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.repr {
            Repr::Ready(_) => "ready",
            Repr::Pending(_) => "pending",
        };
        f.debug_struct("Attempt").field("state", &state).finish()
    }
}

impl<T, E> Attempt<T, E> {
    /// An attempt that already settled
    pub fn ready(settlement: impl Into<Settlement<T, E>>) -> Self {
        Self {
            repr: Repr::Ready(settlement.into()),
        }
    }

    /// Immediate success with `value`
    pub fn value(value: T) -> Self {
        Self::ready(Settlement::Value(value))
    }

    /// Immediate failure with `err`
    pub fn fail(err: E) -> Self {
        Self::ready(Settlement::Failed(err))
    }

    /// Decline further polling; the run settles as cancelled
    pub fn decline() -> Self {
        Self::ready(Settlement::Declined)
    }

    /// Fail with the shared cancellation sentinel
    pub fn cancel() -> Self {
        Self::ready(Settlement::cancelled())
    }

    /// An attempt that settles when `future` completes
    pub fn pending<F, R>(future: F) -> Self
    where
        F: Future<Output = R> + Send + 'static,
        R: Into<Settlement<T, E>> + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        Self {
            repr: Repr::Pending(future.map(Into::into).boxed()),
        }
    }

    /// Whether the attempt settled without suspending
    pub fn is_ready(&self) -> bool {
        matches!(self.repr, Repr::Ready(_))
    }

    /// Drive the attempt to completion, racing it against `timeout`.
    ///
    /// Returns `Err(limit)` when the timeout wins. The losing future is
    /// dropped, so a late settlement can never be observed.
    pub(crate) async fn settle(
        self,
        timeout: Option<Duration>,
    ) -> Result<Settlement<T, E>, Duration> {
        match (self.repr, timeout) {
            (Repr::Ready(settlement), _) => Ok(settlement),
            (Repr::Pending(future), None) => Ok(future.await),
            (Repr::Pending(future), Some(limit)) => tokio::time::timeout(limit, future)
                .await
                .map_err(|_| limit),
        }
    }
}

impl<T, E> From<Settlement<T, E>> for Attempt<T, E> {
    fn from(settlement: Settlement<T, E>) -> Self {
        Self::ready(settlement)
    }
}

impl<T, E> From<Result<T, E>> for Attempt<T, E> {
    fn from(result: Result<T, E>) -> Self {
        Self::ready(result)
    }
}

/// Producer of attempts, invoked once per attempt
pub trait Task<T, E>: Send + 'static {
    /// Start one attempt
    fn call(&mut self) -> Attempt<T, E>;
}

impl<F, A, T, E> Task<T, E> for F
where
    F: FnMut() -> A + Send + 'static,
    A: Into<Attempt<T, E>>,
{
    fn call(&mut self) -> Attempt<T, E> {
        self().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static OTHER: CancelToken = CancelToken {
        label: "poll cancelled by task",
    };

    #[test]
    fn sentinel_equality_is_by_identity() {
        assert!(CANCEL_TOKEN.is_shared());
        assert_eq!(&CANCEL_TOKEN, &CANCEL_TOKEN);
        assert!(!OTHER.is_shared());
        assert_ne!(&CANCEL_TOKEN, &OTHER);
    }

    #[test]
    fn result_converts_to_settlement() {
        assert_eq!(Settlement::<u32, &str>::from(Ok(3)), Settlement::Value(3));
        assert_eq!(
            Settlement::<u32, &str>::from(Err("derp")),
            Settlement::Failed("derp")
        );
    }

    #[tokio::test]
    async fn ready_attempt_ignores_timeout() {
        let attempt = Attempt::<&str, ()>::value("foobar");
        assert!(attempt.is_ready());
        let settled = attempt.settle(Some(Duration::from_millis(1))).await;
        assert_eq!(settled, Ok(Settlement::Value("foobar")));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_attempt_loses_to_timeout() {
        let attempt = Attempt::<&str, ()>::pending(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ()>("derp")
        });
        assert!(!attempt.is_ready());
        assert_eq!(
            attempt.settle(Some(Duration::from_secs(1))).await,
            Err(Duration::from_secs(1))
        );
    }

    #[tokio::test]
    async fn pending_attempt_can_cancel() {
        let attempt = Attempt::<u32, ()>::pending(async { Settlement::<u32, ()>::cancelled() });
        match attempt.settle(None).await {
            Ok(Settlement::Cancelled(token)) => assert!(token.is_shared()),
            other => panic!("unexpected settlement: {other:?}"),
        }
    }

    #[test]
    fn closures_are_tasks() {
        let mut counter = 0;
        let mut task = move || {
            counter += 1;
            Ok::<_, String>(counter)
        };
        assert!(Task::<i32, String>::call(&mut task).is_ready());
    }
}
