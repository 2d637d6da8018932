//! Background work and the completion context.
//!
//! [`TaskManager`] runs blocking jobs (index build, thumbnail decoding) on
//! tokio's blocking pool, never more than `workers` at a time. Everything the
//! host observes is posted to the [`MainQueue`], which the host drains from
//! its UI thread; listener callbacks never run anywhere else.

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;

type MainJob = Box<dyn FnOnce() + Send + 'static>;

/// How a background job ended
#[derive(Debug)]
pub enum BackgroundOutcome<T> {
    Finished(T),
    /// The job is still running but nobody waits for it anymore
    TimedOut(Duration),
    Panicked,
}

impl<T> BackgroundOutcome<T> {
    fn from_join(joined: Result<T, JoinError>) -> Self {
        match joined {
            Ok(value) => BackgroundOutcome::Finished(value),
            Err(e) => {
                log::error!("Background job failed: {}", e);
                BackgroundOutcome::Panicked
            }
        }
    }
}

/// Schedules background jobs and completion callbacks
#[derive(Clone)]
pub struct TaskManager {
    handle: Handle,
    workers: Arc<Semaphore>,
    main_tx: mpsc::UnboundedSender<MainJob>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("idle_workers", &self.workers.available_permits())
            .finish()
    }
}

impl TaskManager {
    /// Create a task manager on `handle` together with the queue of its completion context
    pub fn new(handle: Handle, workers: usize) -> (Self, MainQueue) {
        let (main_tx, rx) = mpsc::unbounded_channel();
        let manager = Self {
            handle,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            main_tx,
        };
        (manager, MainQueue { rx })
    }

    /// Post `job` to the completion context
    pub fn run_on_main<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.main_tx.send(Box::new(job)).is_err() {
            log::debug!("Completion context is gone, dropping callback");
        }
    }

    /// Run a blocking job on the worker pool, fire and forget
    pub fn run_background<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.run_background_with_timeout(None, job, |_| {});
    }

    /// Run a blocking job on the worker pool and hand its outcome to `done`.
    ///
    /// `done` runs on the runtime, not on the completion context. With a
    /// `timeout`, `done` receives [`BackgroundOutcome::TimedOut`] once the limit
    /// passes; the job itself keeps its worker slot until it returns.
    pub fn run_background_with_timeout<F, T, D>(&self, timeout: Option<Duration>, job: F, done: D)
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        D: FnOnce(BackgroundOutcome<T>) + Send + 'static,
    {
        let workers = Arc::clone(&self.workers);

        self.handle.spawn(async move {
            let permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    log::warn!("Worker pool closed, dropping background job");
                    return;
                }
            };

            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            });

            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, task).await {
                    Ok(joined) => BackgroundOutcome::from_join(joined),
                    Err(_) => BackgroundOutcome::TimedOut(limit),
                },
                None => BackgroundOutcome::from_join(task.await),
            };

            done(outcome);
        });
    }
}

/// Receiving end of the completion context
pub struct MainQueue {
    rx: mpsc::UnboundedReceiver<MainJob>,
}

impl MainQueue {
    /// Run every callback that is already queued, without waiting
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next callback and run it. Returns false once no sender is left.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Keep running callbacks until `done` holds or `limit` passes.
    /// Returns the final value of `done`.
    pub async fn run_until<P>(&mut self, limit: Duration, mut done: P) -> bool
    where
        P: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + limit;
        while !done() {
            match tokio::time::timeout_at(deadline, self.run_next()).await {
                Ok(true) => {}
                _ => return done(),
            }
        }
        true
    }
}
