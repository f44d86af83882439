//! I/O driver - the single event loop behind a session.
//!
//! The driver owns a current-thread tokio runtime. That runtime only makes
//! progress while some thread sits in [`Runtime::block_on`], and the driver
//! dedicates exactly one worker thread to that job:
//!
//! - The worker is started lazily by [`IoDriver::spawn`] when it is
//!   `Stopped`.
//! - The worker runs until no spawned task is left, then marks itself
//!   `Stopped` and exits.
//! - A spawn that races with an exiting worker joins it before starting
//!   a replacement.
//!
//! Pending work is counted per task. The worker re-checks the count under
//! the lifecycle lock before it stops, and spawns increment it under the
//! same lock, so a task can never be left in the runtime with no worker
//! to drive it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Notify;

use crate::error::{FramelinkError, Result};

/// Default worker thread name.
pub const DEFAULT_THREAD_NAME: &str = "framelink-io";

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No worker is driving the runtime.
    Stopped,
    /// A worker is inside `block_on`.
    Running,
}

#[derive(Debug)]
struct Lifecycle {
    state: DriverState,
    /// Last worker started; joined before the next one starts.
    worker: Option<JoinHandle<()>>,
}

/// State shared between the driver handle, its worker, and the tasks
/// running on it.
#[derive(Debug)]
pub(crate) struct DriverControl {
    pending: AtomicUsize,
    stopping: AtomicBool,
    changed: Notify,
    lifecycle: Mutex<Lifecycle>,
}

impl DriverControl {
    fn new() -> Self {
        Self {
            pending: AtomicUsize::new(0),
            stopping: AtomicBool::new(false),
            changed: Notify::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: DriverState::Stopped,
                worker: None,
            }),
        }
    }

    fn should_exit(&self) -> bool {
        self.stopping.load(Ordering::Acquire) || self.pending.load(Ordering::Acquire) == 0
    }

    /// Resolves once there is no pending work or a stop was requested.
    async fn idle(&self) {
        loop {
            let notified = self.changed.notified();
            if self.should_exit() {
                return;
            }
            notified.await;
        }
    }

    /// Spawn a follow-up task from inside the runtime.
    ///
    /// The calling task keeps the worker alive, so no start check is needed.
    pub(crate) fn spawn_local<F>(self: &Arc<Self>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = WorkGuard::acquire(self);
        tokio::spawn(async move {
            let _guard = guard;
            future.await;
        });
    }
}

/// Counts one unit of pending work for as long as it lives.
///
/// Held inside the spawned future, so a task that completes, panics, or is
/// dropped by runtime shutdown all release it.
struct WorkGuard(Arc<DriverControl>);

impl WorkGuard {
    fn acquire(control: &Arc<DriverControl>) -> Self {
        control.pending.fetch_add(1, Ordering::AcqRel);
        Self(control.clone())
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.changed.notify_waiters();
        }
    }
}

/// Lazily started, self-stopping event loop.
#[derive(Debug)]
pub struct IoDriver {
    control: Arc<DriverControl>,
    handle: Handle,
    /// `None` once shut down.
    runtime: Option<Arc<Runtime>>,
    thread_name: String,
}

impl IoDriver {
    /// Create a driver with the default worker thread name.
    pub fn new() -> Result<Self> {
        Self::with_thread_name(DEFAULT_THREAD_NAME)
    }

    /// Create a driver whose worker threads carry `thread_name`.
    pub fn with_thread_name(thread_name: &str) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            control: Arc::new(DriverControl::new()),
            handle: runtime.handle().clone(),
            runtime: Some(Arc::new(runtime)),
            thread_name: thread_name.to_string(),
        })
    }

    pub(crate) fn control(&self) -> Arc<DriverControl> {
        self.control.clone()
    }

    /// Current worker state.
    pub fn state(&self) -> DriverState {
        self.control.lifecycle.lock().state
    }

    /// Number of tasks spawned and not yet finished.
    pub fn pending(&self) -> usize {
        self.control.pending.load(Ordering::Acquire)
    }

    /// Schedule a task, starting the worker if it is stopped.
    ///
    /// # Errors
    ///
    /// - `DriverStopped` after [`shutdown`](Self::shutdown).
    /// - `Io` if a worker thread cannot be spawned.
    pub fn spawn<F>(&self, future: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = match &self.runtime {
            Some(runtime) if !self.control.stopping.load(Ordering::Acquire) => runtime,
            _ => return Err(FramelinkError::DriverStopped),
        };

        let mut lifecycle = self.control.lifecycle.lock();

        let guard = WorkGuard::acquire(&self.control);
        self.handle.spawn(async move {
            let _guard = guard;
            future.await;
        });

        if lifecycle.state == DriverState::Stopped {
            if let Some(previous) = lifecycle.worker.take() {
                // It already marked itself stopped; this only waits for the
                // thread to return.
                let _ = previous.join();
            }

            let worker = self.start_worker(runtime.clone())?;
            lifecycle.worker = Some(worker);
            lifecycle.state = DriverState::Running;
        }

        Ok(())
    }

    fn start_worker(&self, runtime: Arc<Runtime>) -> Result<JoinHandle<()>> {
        let control = self.control.clone();
        let worker = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                tracing::trace!("I/O worker started");
                loop {
                    runtime.block_on(control.idle());

                    let mut lifecycle = control.lifecycle.lock();
                    if control.should_exit() {
                        lifecycle.state = DriverState::Stopped;
                        break;
                    }
                }
                tracing::trace!("I/O worker idle, exiting");
            })?;
        Ok(worker)
    }

    /// Stop the worker and drop every remaining task.
    ///
    /// Blocks until the worker thread has exited, unless called from the
    /// worker thread itself (e.g. from an event callback); in that case the
    /// worker exits as soon as the callback returns.
    pub fn shutdown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        self.control.stopping.store(true, Ordering::Release);
        self.control.changed.notify_waiters();

        let worker = self.control.lifecycle.lock().worker.take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                tracing::warn!("I/O driver shut down from its own worker thread");
            } else if worker.join().is_err() {
                tracing::error!("I/O worker panicked");
            }
        }

        // Only the last owner can tear the runtime down; on the worker-thread
        // path above, that is the worker itself once `block_on` returns.
        if let Ok(runtime) = Arc::try_unwrap(runtime) {
            runtime.shutdown_background();
        }
        tracing::debug!("I/O driver shut down");
    }
}

impl Drop for IoDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_starts_stopped() {
        let driver = IoDriver::new().unwrap();
        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(driver.pending(), 0);
    }

    #[test]
    fn test_spawn_runs_on_named_worker() {
        let driver = IoDriver::with_thread_name("driver-test").unwrap();
        let (tx, rx) = mpsc::channel();

        driver
            .spawn(async move {
                let name = thread::current().name().map(str::to_string);
                tx.send(name).unwrap();
            })
            .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("driver-test"));
    }

    #[test]
    fn test_worker_stops_when_idle_and_restarts() {
        let driver = IoDriver::new().unwrap();
        let (tx, rx) = mpsc::channel();

        let first = tx.clone();
        driver.spawn(async move { first.send(1).unwrap() }).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert!(wait_for(|| driver.state() == DriverState::Stopped));

        driver.spawn(async move { tx.send(2).unwrap() }).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
        assert!(wait_for(|| driver.state() == DriverState::Stopped));
        assert_eq!(driver.pending(), 0);
    }

    #[test]
    fn test_spawn_while_running_reuses_worker() {
        let driver = IoDriver::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = tx.clone();
        driver
            .spawn(async move {
                first.send(thread::current().id()).unwrap();
                let _ = release_rx.await;
            })
            .unwrap();
        let first_id = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(driver.state(), DriverState::Running);

        driver
            .spawn(async move { tx.send(thread::current().id()).unwrap() })
            .unwrap();
        let second_id = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(first_id, second_id);
        release_tx.send(()).unwrap();
        assert!(wait_for(|| driver.state() == DriverState::Stopped));
    }

    #[test]
    fn test_spawn_local_keeps_worker_alive() {
        let driver = IoDriver::new().unwrap();
        let control = driver.control();
        let (tx, rx) = mpsc::channel();

        driver
            .spawn(async move {
                control.spawn_local(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    tx.send("follow-up").unwrap();
                });
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "follow-up");
    }

    #[test]
    fn test_shutdown_drops_pending_tasks() {
        let mut driver = IoDriver::new().unwrap();
        let (tx, rx) = mpsc::channel::<()>();

        driver
            .spawn(async move {
                let _tx = tx;
                std::future::pending::<()>().await;
            })
            .unwrap();
        assert_eq!(driver.state(), DriverState::Running);

        driver.shutdown();

        // The task (and its sender) was dropped.
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
        assert!(matches!(
            driver.spawn(async {}),
            Err(FramelinkError::DriverStopped)
        ));
    }

    #[test]
    fn test_many_spawns_from_many_threads() {
        let driver = Arc::new(IoDriver::new().unwrap());
        let (tx, rx) = mpsc::channel();

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let driver = driver.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let tx = tx.clone();
                        driver.spawn(async move { tx.send(t * 50 + i).unwrap() }).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let mut seen: Vec<i32> = (0..400)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..400).collect::<Vec<_>>());
    }
}
