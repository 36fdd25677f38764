//! Periodic task runner
//!
//! A [`PeriodicTask`] owns a worker implementing [`Runnable`] and drives it
//! on a tokio task, either once or repeatedly with a fixed period measured
//! from the start of each call. Stopping hands the worker back so the task
//! can be restarted.

use std::mem;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info};

use modlink_core::{ModlinkError, Result};

// ----------------------------------------------------------------------------
// Worker Interface
// ----------------------------------------------------------------------------

/// Unit of work executed by a [`PeriodicTask`]
#[async_trait]
pub trait Runnable: Send + 'static {
    /// Run one iteration of work
    ///
    /// Long waits inside the work item should race against `stop` so a stop
    /// request is not held up. Returning an error ends the periodic loop.
    async fn on_process(&mut self, stop: &mut StopSignal) -> Result<()>;
}

/// Receiving side of a task's stop request
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// Whether stop has been requested or the owning task is gone
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once stop is requested
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Task State
// ----------------------------------------------------------------------------

/// How a running task was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Periodic(Duration),
}

enum TaskState<W> {
    Idle(W),
    Running {
        stop_tx: watch::Sender<bool>,
        handle: JoinHandle<W>,
        mode: RunMode,
    },
    /// The worker panicked and could not be recovered
    Lost,
}

/// Completion handle returned by [`PeriodicTask::run_once`]
#[derive(Debug)]
pub struct RunOnceHandle {
    done: oneshot::Receiver<Result<()>>,
}

impl RunOnceHandle {
    /// Wait for the single iteration to finish and return its result
    pub async fn wait(self) -> Result<()> {
        self.done
            .await
            .map_err(|_| ModlinkError::failed("task ended before its work item completed"))?
    }
}

// ----------------------------------------------------------------------------
// Periodic Task
// ----------------------------------------------------------------------------

/// Drives a [`Runnable`] on a background tokio task
///
/// Dropping a running task signals its worker to stop.
pub struct PeriodicTask<W: Runnable> {
    name: String,
    state: TaskState<W>,
}

impl<W: Runnable> PeriodicTask<W> {
    pub fn new(name: impl Into<String>, worker: W) -> Self {
        Self {
            name: name.into(),
            state: TaskState::Idle(worker),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the worker repeatedly, starting a new iteration every `period`
    ///
    /// An iteration that overruns the period is followed immediately by the
    /// next one. A zero period runs iterations back to back.
    pub fn run_periodic(&mut self, period: Duration) -> Result<()> {
        let worker = self.take_idle()?;
        let (stop_tx, stop) = StopSignal::new();
        let name = self.name.clone();

        let handle = tokio::spawn(periodic_loop(name, worker, stop, period));
        self.state = TaskState::Running {
            stop_tx,
            handle,
            mode: RunMode::Periodic(period),
        };
        info!(task = %self.name, period_ms = period.as_millis() as u64, "Periodic task started");
        Ok(())
    }

    /// Run exactly one iteration of the worker
    pub fn run_once(&mut self) -> Result<RunOnceHandle> {
        let mut worker = self.take_idle()?;
        let (stop_tx, mut stop) = StopSignal::new();
        let (done_tx, done) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let result = worker.on_process(&mut stop).await;
            let _ = done_tx.send(result);
            worker
        });
        self.state = TaskState::Running {
            stop_tx,
            handle,
            mode: RunMode::Once,
        };
        debug!(task = %self.name, "Single run started");
        Ok(RunOnceHandle { done })
    }

    /// Request stop and wait for the worker to come back
    ///
    /// Stopping an idle task is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, TaskState::Lost) {
            TaskState::Running {
                stop_tx, handle, ..
            } => {
                let _ = stop_tx.send(true);
                match handle.await {
                    Ok(worker) => {
                        self.state = TaskState::Idle(worker);
                        info!(task = %self.name, "Task stopped");
                        Ok(())
                    }
                    Err(err) => {
                        error!(task = %self.name, error = %err, "Task worker was lost");
                        Err(ModlinkError::failed(format!(
                            "task '{}' worker was lost: {}",
                            self.name, err
                        )))
                    }
                }
            }
            TaskState::Idle(worker) => {
                self.state = TaskState::Idle(worker);
                Ok(())
            }
            TaskState::Lost => Err(ModlinkError::invalid_state(format!(
                "task '{}' has no worker",
                self.name
            ))),
        }
    }

    /// Whether the background loop is still executing
    pub fn is_running(&self) -> bool {
        match &self.state {
            TaskState::Running { handle, .. } => !handle.is_finished(),
            _ => false,
        }
    }

    /// Whether the task was started but its loop has already ended
    ///
    /// The worker is only handed back by [`stop`](Self::stop); until then a
    /// new run is rejected.
    pub fn has_exited(&self) -> bool {
        match &self.state {
            TaskState::Running { handle, .. } => handle.is_finished(),
            _ => false,
        }
    }

    pub fn mode(&self) -> Option<RunMode> {
        match &self.state {
            TaskState::Running { mode, .. } => Some(*mode),
            _ => None,
        }
    }

    /// The worker, available while the task is stopped
    pub fn worker(&self) -> Option<&W> {
        match &self.state {
            TaskState::Idle(worker) => Some(worker),
            _ => None,
        }
    }

    pub fn worker_mut(&mut self) -> Option<&mut W> {
        match &mut self.state {
            TaskState::Idle(worker) => Some(worker),
            _ => None,
        }
    }

    fn take_idle(&mut self) -> Result<W> {
        match mem::replace(&mut self.state, TaskState::Lost) {
            TaskState::Idle(worker) => Ok(worker),
            other => {
                let reason = match &other {
                    TaskState::Lost => "has no worker",
                    _ => "is already started; stop it first",
                };
                self.state = other;
                Err(ModlinkError::invalid_state(format!(
                    "task '{}' {}",
                    self.name, reason
                )))
            }
        }
    }
}

async fn periodic_loop<W: Runnable>(
    name: String,
    mut worker: W,
    mut stop: StopSignal,
    period: Duration,
) -> W {
    while !stop.is_stopped() {
        let deadline = Instant::now() + period;

        if let Err(err) = worker.on_process(&mut stop).await {
            error!(task = %name, error = %err, "Work item failed, ending periodic loop");
            break;
        }

        if period.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            _ = stop.stopped() => break,
            _ = time::sleep_until(deadline) => {}
        }
    }
    debug!(task = %name, "Periodic loop exited");
    worker
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter {
        ticks: Arc<AtomicUsize>,
        fail_at: Option<usize>,
    }

    impl Counter {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let ticks = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    ticks: ticks.clone(),
                    fail_at: None,
                },
                ticks,
            )
        }
    }

    #[async_trait]
    impl Runnable for Counter {
        async fn on_process(&mut self, _stop: &mut StopSignal) -> Result<()> {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_at {
                return Err(ModlinkError::protocol_violation("counter limit"));
            }
            Ok(())
        }
    }

    /// Blocks until asked to stop
    struct Waiter;

    #[async_trait]
    impl Runnable for Waiter {
        async fn on_process(&mut self, stop: &mut StopSignal) -> Result<()> {
            stop.stopped().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_periodic_runs_repeatedly_and_stops() {
        let (counter, ticks) = Counter::new();
        let mut task = PeriodicTask::new("counter", counter);

        task.run_periodic(Duration::from_millis(5)).unwrap();
        assert!(task.is_running());
        assert_eq!(task.mode(), Some(RunMode::Periodic(Duration::from_millis(5))));
        time::sleep(Duration::from_millis(60)).await;
        task.stop().await.unwrap();

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several ticks, saw {seen}");
        assert!(!task.is_running());

        // No further ticks after stop
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (counter, _) = Counter::new();
        let mut task = PeriodicTask::new("counter", counter);
        task.run_periodic(Duration::from_millis(10)).unwrap();

        assert!(matches!(
            task.run_periodic(Duration::from_millis(10)),
            Err(ModlinkError::InvalidState { .. })
        ));
        assert!(task.run_once().is_err());
        task.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_restartable() {
        let (counter, ticks) = Counter::new();
        let mut task = PeriodicTask::new("counter", counter);
        task.stop().await.unwrap();

        task.run_periodic(Duration::ZERO).unwrap();
        time::sleep(Duration::from_millis(10)).await;
        task.stop().await.unwrap();
        task.stop().await.unwrap();

        let first = ticks.load(Ordering::SeqCst);
        task.run_once().unwrap().wait().await.unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), first + 1);
    }

    #[tokio::test]
    async fn test_stop_interrupts_blocking_work() {
        let mut task = PeriodicTask::new("waiter", Waiter);
        task.run_periodic(Duration::from_secs(3600)).unwrap();
        time::sleep(Duration::from_millis(5)).await;

        time::timeout(Duration::from_secs(1), task.stop())
            .await
            .expect("stop should not hang")
            .unwrap();
        assert!(task.worker().is_some());
    }

    #[tokio::test]
    async fn test_failing_work_item_ends_loop() {
        let (mut counter, ticks) = Counter::new();
        counter.fail_at = Some(3);
        let mut task = PeriodicTask::new("failing", counter);

        task.run_periodic(Duration::from_millis(1)).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_running());
        assert!(task.has_exited());
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(task.run_periodic(Duration::from_millis(1)).is_err());

        task.stop().await.unwrap();
        assert!(!task.has_exited());
        assert!(task.worker_mut().is_some());
    }

    #[tokio::test]
    async fn test_run_once_reports_result() {
        let (mut counter, _) = Counter::new();
        counter.fail_at = Some(1);
        let mut task = PeriodicTask::new("once", counter);

        let result = task.run_once().unwrap().wait().await;
        assert!(matches!(result, Err(ModlinkError::ProtocolViolation { .. })));
        task.stop().await.unwrap();
    }
}
