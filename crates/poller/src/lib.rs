//! # Poller
//!
//! Asynchronous retry/poll engine. A task producer is invoked repeatedly
//! until it succeeds, is cancelled, runs out of retries, or runs out of time,
//! and the whole run is exposed as one future that settles exactly once.
//!
//! - **Retry budget**: at most `retries` failed attempts, spaced by a fixed
//!   `interval` measured from the end of each attempt.
//! - **Attempt timeout**: an attempt still pending after `attempt_timeout`
//!   is recorded as a failure whose message contains "timed out".
//! - **Overall deadline**: the run fails with whatever errors it has once
//!   `overall_deadline` elapses.
//! - **Continuation predicate**: can stop the run early after a failure or
//!   keep polling after a success.
//! - **Cancellation**: a task cancels the run by declining
//!   ([`Attempt::decline`]) or by failing with [`CANCEL_TOKEN`]; an external
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) can be attached
//!   as well.
//!
//! ```rust,ignore
//! use poller::prelude::*;
//!
//! let mut count = 0;
//! let value = Poller::<u32, String>::builder()
//!     .task(move || {
//!         count += 1;
//!         Ok::<_, String>(count)
//!     })
//!     .interval(Duration::from_millis(100))
//!     .should_continue(|_, value| value.is_some_and(|v| *v < 3))
//!     .build()?
//!     .run()
//!     .await?;
//! assert_eq!(value, 3);
//! ```

pub mod attempt;
pub mod config;
pub mod error;
pub mod policy;
pub mod poller;

pub use attempt::{Attempt, CANCEL_TOKEN, CancelToken, Settlement, Task};
pub use config::{DEFAULT_INTERVAL, DEFAULT_RETRIES, PollSettings};
pub use error::{
    AttemptError, Cancellation, ConfigError, ConfigResult, PollError, PollResult,
};
pub use policy::{ContinuationPolicy, FailureDecision, ProgressHook};
pub use poller::{Poller, PollerBuilder, poll};

/// Common imports for poll users
pub mod prelude {
    pub use std::time::Duration;

    pub use crate::{
        Attempt, AttemptError, CANCEL_TOKEN, Cancellation, ConfigError, PollError, PollResult,
        PollSettings, Poller, PollerBuilder, Settlement, poll,
    };
}
