//! Fixed-rate job scheduling on a bounded set of OS threads.
//!
//! A [`ScheduledPool`] owns `n` worker threads and a deadline-ordered queue of
//! recurring jobs. Workers sleep on a condition variable until the earliest
//! deadline, run the job with the queue unlocked, then re-queue it one period
//! after its previous deadline. A job is out of the queue while it runs, so
//! one job never overlaps itself. Missed firings are not replayed: a job that
//! falls behind fires once, immediately, and continues from there.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    parent: Option<CancelToken>,
}

/// Cooperative cancellation flag. A child token reports cancelled once it or
/// any ancestor is cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        CancelToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Returns true the first time this token is cancelled
    pub fn cancel(&self) -> bool {
        !self.inner.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(CancelToken::is_cancelled)
    }
}

type JobFn = Arc<dyn Fn() + Send + Sync>;

struct Job {
    name: String,
    period: Duration,
    run: JobFn,
}

/// (deadline, insertion order, job index); `Reverse` turns the heap into a min-heap
type Slot = Reverse<(Instant, u64, usize)>;

#[derive(Default)]
struct State {
    jobs: Vec<Arc<Job>>,
    queue: BinaryHeap<Slot>,
    seq: u64,
    shutdown: bool,
    live_workers: usize,
}

impl State {
    fn push(&mut self, due: Instant, job_index: usize) {
        self.seq += 1;
        self.queue.push(Reverse((due, self.seq, job_index)));
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    /// Signalled when the queue changes or on shutdown
    wake: Condvar,
    /// Signalled when a worker exits
    exited: Condvar,
}

/// How a pool shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReport {
    /// Every worker finished inside the grace period
    Drained,
    /// Grace period elapsed; this many workers were detached mid-job and will
    /// exit when their current job returns, without firing again
    Abandoned(usize),
    /// Pool had already been shut down
    AlreadyStopped,
}

pub struct ScheduledPool {
    name: String,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancelToken,
}

impl ScheduledPool {
    /// Spawn `workers` threads (at least one) named after the pool
    pub fn new(name: &str, workers: usize, cancel: CancelToken) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let count = workers.max(1);
        shared.state.lock().live_workers = count;

        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let worker_shared = shared.clone();
            let worker_cancel = cancel.clone();
            let spawned = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || worker_loop(&worker_shared, &worker_cancel));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Let the workers that did start exit before bailing
                    let mut state = shared.state.lock();
                    state.live_workers -= count - i;
                    state.shutdown = true;
                    drop(state);
                    shared.wake.notify_all();
                    return Err(Error::Scheduler(format!(
                        "failed to spawn worker for {name}: {e}"
                    )));
                }
            }
        }

        Ok(ScheduledPool {
            name: name.to_string(),
            shared,
            workers: handles,
            cancel,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `job` after `initial_delay` and then every `period`
    pub fn schedule_at_fixed_rate<F>(
        &self,
        name: impl Into<String>,
        initial_delay: Duration,
        period: Duration,
        job: F,
    ) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(Error::Scheduler("period must be non-zero".into()));
        }

        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(Error::Scheduler(format!("{} is shut down", self.name)));
        }

        let index = state.jobs.len();
        state.jobs.push(Arc::new(Job {
            name: name.into(),
            period,
            run: Arc::new(job),
        }));
        state.push(Instant::now() + initial_delay, index);
        drop(state);

        self.shared.wake.notify_all();
        Ok(())
    }

    /// Number of recurring jobs registered
    pub fn job_count(&self) -> usize {
        self.shared.state.lock().jobs.len()
    }

    pub fn job_names(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .jobs
            .iter()
            .map(|job| job.name.clone())
            .collect()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Cancel every job and wait up to `grace` for in-flight runs to finish.
    ///
    /// Workers still busy after the grace period are detached; they never
    /// pick up another job.
    pub fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown && self.workers.is_empty() {
                return ShutdownReport::AlreadyStopped;
            }
            state.shutdown = true;
            state.queue.clear();
            state.jobs.clear();
        }
        self.cancel.cancel();
        self.shared.wake.notify_all();

        let deadline = Instant::now() + grace;
        let mut state = self.shared.state.lock();
        while state.live_workers > 0 {
            if self.shared.exited.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        let remaining = state.live_workers;
        drop(state);

        let handles = std::mem::take(&mut self.workers);
        if remaining > 0 {
            tracing::warn!(
                pool = %self.name,
                workers = remaining,
                grace_ms = grace.as_millis() as u64,
                "Grace period elapsed, abandoning busy workers"
            );
            return ShutdownReport::Abandoned(remaining);
        }

        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!(pool = %self.name, "Worker exited with a panic");
            }
        }
        ShutdownReport::Drained
    }
}

impl Drop for ScheduledPool {
    fn drop(&mut self) {
        // Never block in drop; workers exit on their next wake-up
        self.shared.state.lock().shutdown = true;
        self.cancel.cancel();
        self.shared.wake.notify_all();
    }
}

fn worker_loop(shared: &Shared, cancel: &CancelToken) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown || cancel.is_cancelled() {
            break;
        }

        let next_due = state.queue.peek().map(|Reverse((due, _, _))| *due);
        match next_due {
            None => shared.wake.wait(&mut state),
            Some(due) if due > Instant::now() => {
                shared.wake.wait_until(&mut state, due);
            }
            Some(_) => run_due_job(shared, &mut state),
        }
    }

    state.live_workers -= 1;
    drop(state);
    shared.exited.notify_all();
}

fn run_due_job(shared: &Shared, state: &mut MutexGuard<'_, State>) {
    let Some(Reverse((due, _, index))) = state.queue.pop() else {
        return;
    };
    let Some(job) = state.jobs.get(index).cloned() else {
        return;
    };

    let outcome = MutexGuard::unlocked(state, || panic::catch_unwind(AssertUnwindSafe(|| (job.run)())));
    if outcome.is_err() {
        tracing::error!(job = %job.name, "Scheduled job panicked; it stays scheduled");
    }

    // Jobs are cleared on shutdown, so a stale index is never re-queued
    if state.shutdown {
        return;
    }
    let now = Instant::now();
    let next = (due + job.period).max(now);
    state.push(next, index);
    shared.wake.notify_all();
}
