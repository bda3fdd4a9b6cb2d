//! Periodic flush scheduler
//!
//! Runs an async action once per interval on a dedicated OS thread that
//! drives its own current-thread tokio runtime, so producers need no runtime
//! of their own. Stopping is cooperative: no new tick starts after
//! [`FlushScheduler::stop`], but a tick already running is allowed to finish.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{Error, Result};

const THREAD_NAME: &str = "samsara-publisher";

struct ScheduledTask {
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

/// Recurring timer owning at most one running task
#[derive(Default)]
pub struct FlushScheduler {
    task: Mutex<Option<ScheduledTask>>,
}

impl FlushScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn task(&self) -> MutexGuard<'_, Option<ScheduledTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start invoking `action` every `interval`, replacing any running task.
    ///
    /// The first tick fires one full interval after start.
    pub fn start<F, Fut>(&self, interval: Duration, action: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        if interval.is_zero() {
            return Err(Error::InvalidArgument(
                "scheduler interval must be greater than 0".to_string(),
            ));
        }

        let mut task = self.task();
        if let Some(previous) = task.take() {
            let _ = previous.shutdown.send(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (shutdown, shutdown_rx) = oneshot::channel();

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(run_ticks(interval, action, shutdown_rx)))?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Flush scheduler started");
        *task = Some(ScheduledTask { shutdown, thread });
        Ok(())
    }

    /// Request that no further ticks run. Idempotent, does not wait.
    pub fn stop(&self) {
        if let Some(task) = self.task().take() {
            let _ = task.shutdown.send(());
            tracing::debug!("Flush scheduler stopped");
        }
    }

    /// Whether a task is active and its thread still alive
    pub fn is_running(&self) -> bool {
        self.task()
            .as_ref()
            .is_some_and(|task| !task.thread.is_finished())
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FlushScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushScheduler")
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run_ticks<F, Fut>(interval: Duration, action: F, mut shutdown: oneshot::Receiver<()>)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            // a dropped sender also ends the loop
            _ = &mut shutdown => break,
            _ = ticker.tick() => action().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_action(counter: &Arc<AtomicUsize>) -> impl Fn() -> std::future::Ready<()> + Send {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[test]
    fn test_ticks_until_stopped() {
        let scheduler = FlushScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        scheduler
            .start(Duration::from_millis(20), counting_action(&ticks))
            .unwrap();
        assert!(scheduler.is_running());

        thread::sleep(Duration::from_millis(200));
        scheduler.stop();
        assert!(!scheduler.is_running());

        // a tick racing with stop may still land
        thread::sleep(Duration::from_millis(30));
        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected several ticks, got {after_stop}");

        thread::sleep(Duration::from_millis(100));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_first_tick_waits_one_interval() {
        let scheduler = FlushScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        scheduler
            .start(Duration::from_secs(60), counting_action(&ticks))
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_restart_replaces_previous_task() {
        let scheduler = FlushScheduler::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        scheduler
            .start(Duration::from_millis(10), counting_action(&first))
            .unwrap();
        thread::sleep(Duration::from_millis(60));
        scheduler
            .start(Duration::from_millis(10), counting_action(&second))
            .unwrap();
        // let a tick that was already in flight settle
        thread::sleep(Duration::from_millis(20));
        let first_total = first.load(Ordering::SeqCst);

        thread::sleep(Duration::from_millis(100));
        assert_eq!(first.load(Ordering::SeqCst), first_total);
        assert!(second.load(Ordering::SeqCst) > 0);
        scheduler.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let scheduler = FlushScheduler::new();
        scheduler.stop();
        scheduler
            .start(Duration::from_millis(10), || async {})
            .unwrap();
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let scheduler = FlushScheduler::new();
        assert!(matches!(
            scheduler.start(Duration::ZERO, || async {}),
            Err(Error::InvalidArgument(_))
        ));
    }
}
