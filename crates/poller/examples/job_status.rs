//! Poll a simulated job until it reports completion.
//!
//! Run with `RUST_LOG=poller=debug cargo run -p poller --example job_status`
//! to see the attempt loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use poller::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobStatus {
    Queued,
    Running { percent: u8 },
    Done,
}

/// Fake remote service: flaky at first, then reports progress
struct JobService {
    polls: Arc<AtomicU32>,
}

impl JobService {
    async fn status(polls: Arc<AtomicU32>) -> Result<JobStatus, String> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        match polls.fetch_add(1, Ordering::SeqCst) {
            0 => Err("503 service unavailable".to_string()),
            1 => Ok(JobStatus::Queued),
            n @ 2..=4 => Ok(JobStatus::Running {
                percent: (n as u8 - 1) * 30,
            }),
            _ => Ok(JobStatus::Done),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🔄 Job status poll demo");

    let service = JobService {
        polls: Arc::new(AtomicU32::new(0)),
    };
    let polls = Arc::clone(&service.polls);

    let status = Poller::<JobStatus, String>::builder()
        .task_async(move || JobService::status(Arc::clone(&polls)))
        .interval(Duration::from_millis(100))
        .retries(3)
        .attempt_timeout(Duration::from_secs(1))
        .overall_deadline(Duration::from_secs(10))
        .should_continue(|_, status| {
            if let Some(status) = status {
                println!("  📊 status: {status:?}");
            }
            status.is_some_and(|s| *s != JobStatus::Done)
        })
        .on_attempt_failure(|remaining, error| {
            println!("  💥 attempt failed ({remaining} left): {error}");
        })
        .build()?
        .run()
        .await?;

    println!(
        "  ✅ finished with {status:?} after {} polls",
        service.polls.load(Ordering::SeqCst)
    );

    println!("\n🛑 Cancelling from inside the task");
    let outcome = Poller::<JobStatus, String>::builder()
        .task(|| Attempt::<JobStatus, String>::decline())
        .build()?
        .run()
        .await;
    match outcome {
        Ok(status) => println!("  ⚠️  unexpectedly finished with {status:?}"),
        Err(err) => println!("  ❌ {err}"),
    }

    Ok(())
}
