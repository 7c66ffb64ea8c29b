//! Time/scheduling collaborator seam (§5): lets tests inject a fake
//! clock and lets `BlobCache`/`OperationQueue` internals schedule
//! delayed work without depending on `tokio::time` directly.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

/// Source of "now" plus the ability to run work later, abstracted so
/// the idle-flush timer and any future TTL-sweeper can be driven by a
/// fake clock in tests instead of real wall time.
pub trait TaskScheduler: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Run `task` once, after `delay` elapses.
    fn schedule_after(&self, delay: Duration, task: Pin<Box<dyn Future<Output = ()> + Send>>) -> JoinHandle<()>;

    /// Run `task` immediately, on the scheduler's executor.
    fn schedule(&self, task: Pin<Box<dyn Future<Output = ()> + Send>>) -> JoinHandle<()> {
        self.schedule_after(Duration::ZERO, task)
    }
}

/// Default [`TaskScheduler`]: wall-clock time and the ambient Tokio
/// runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TaskScheduler for TokioScheduler {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn schedule_after(&self, delay: Duration, task: Pin<Box<dyn Future<Output = ()> + Send>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn schedule_runs_the_task() {
        let scheduler = TokioScheduler;
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        let handle = scheduler.schedule(Box::pin(async move {
            r.store(true, Ordering::SeqCst);
        }));
        handle.await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn schedule_after_waits_before_running() {
        let scheduler = TokioScheduler;
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        let handle = scheduler.schedule_after(
            Duration::from_millis(10),
            Box::pin(async move {
                r.store(true, Ordering::SeqCst);
            }),
        );
        assert!(!ran.load(Ordering::SeqCst));
        handle.await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn now_returns_a_plausible_timestamp() {
        let scheduler = TokioScheduler;
        let now = scheduler.now();
        assert!(now.timestamp() > 0);
    }
}
