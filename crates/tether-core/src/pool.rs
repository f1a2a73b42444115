//! Thread pool composed over the queue
//!
//! The pool owns a [`Queue`] of jobs whose extension state holds the worker
//! counts, so submitting a job and deciding whether to spawn a worker happen
//! under the queue's lock. Workers are detached threads that retire after
//! sitting idle for `idle_timeout`.
//!
//! # Leftover jobs
//!
//! Jobs are boxed closures. A job that never runs is dropped with
//! everything it captured, either when submission fails or when the pool is
//! destroyed with jobs still queued.

use crate::error::{Error, Result};
use crate::handle::{Handle, Kind, Ref, Registry, Resource};
use crate::queue::{End, Queue, QueueLimit, QueueOptions, DEFAULT_MIN_CAPACITY};
use crate::time::Timeout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Default time an idle worker waits for work before retiring
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// A unit of work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Upper bound on live workers
    pub max_threads: usize,
    /// Limit on queued jobs
    pub queue_limit: QueueLimit,
    /// Idle time after which a worker retires, in milliseconds
    pub idle_timeout_ms: u64,
    /// Worker thread name
    pub thread_name: String,
    /// Worker stack size in bytes; platform default when unset
    pub stack_size: Option<usize>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_threads: num_cpus::get().max(1),
            queue_limit: QueueLimit::Unbounded,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT.as_millis() as u64,
            thread_name: "tether-worker".to_string(),
            stack_size: None,
        }
    }
}

impl PoolOptions {
    /// Options with a worker cap and queue limit, defaults elsewhere
    pub fn new(max_threads: usize, queue_limit: QueueLimit) -> Self {
        Self {
            max_threads,
            queue_limit,
            ..Default::default()
        }
    }

    /// Idle timeout as a duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Worker bookkeeping kept under the queue lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerCounts {
    /// Live workers
    pub live: usize,
    /// Live workers waiting for a job
    pub idle: usize,
    /// Upper bound on `live`
    pub max: usize,
}

impl WorkerCounts {
    fn wants_worker(&self) -> bool {
        self.idle == 0 && self.live < self.max
    }
}

/// Thread pool
///
/// Created through [`Pool::create`] so that every worker can hold its own
/// strong reference to the pool.
pub struct Pool {
    handle: Handle,
    registry: Registry,
    queue: Queue<Job, WorkerCounts>,
    options: PoolOptions,
    spawned: AtomicU64,
    completed: AtomicU64,
}

impl Pool {
    /// Create and register a pool
    pub fn create(registry: &Registry, options: PoolOptions) -> Result<Ref<Pool>> {
        if options.max_threads == 0 {
            return Err(Error::InvalidArgument("max_threads"));
        }
        let queue = Queue::with_ext(
            QueueOptions {
                limit: options.queue_limit,
                min_capacity: DEFAULT_MIN_CAPACITY,
            },
            WorkerCounts {
                max: options.max_threads,
                ..Default::default()
            },
        )?;

        let pool = registry.create_with(|handle| Pool {
            handle,
            registry: registry.clone(),
            queue,
            options,
            spawned: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        })?;
        tracing::debug!(
            handle = %pool.handle(),
            max_threads = pool.options.max_threads,
            "pool created"
        );
        Ok(pool)
    }

    /// Submit a job
    ///
    /// Waits up to `timeout` while the queue is at its limit. Spawns a worker
    /// when none is idle and the worker cap allows it. A rejected job is
    /// dropped. If the worker it needs cannot be started, the job is taken
    /// back out of the queue and `Exhausted` is returned.
    pub fn add<F>(&self, job: F, timeout: Timeout) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        // The worker is started under the queue lock; it blocks on that lock
        // until the counts below are committed.
        self.queue
            .try_enqueue_with(Box::new(job) as Job, timeout, End::Back, |counts| {
                if counts.wants_worker() {
                    self.spawn_worker()?;
                    counts.live += 1;
                    counts.idle += 1;
                }
                Ok(())
            })
            .map_err(|rejected| rejected.error)
    }

    /// Submit `func(arg)` as a job
    pub fn add_with<A, F>(&self, arg: A, func: F, timeout: Timeout) -> Result<()>
    where
        A: Send + 'static,
        F: FnOnce(A) + Send + 'static,
    {
        self.add(move || func(arg), timeout)
    }

    /// Stop accepting jobs, run what is queued and wait for every worker to exit
    ///
    /// Must not be called from one of this pool's own jobs, which would wait
    /// for its own worker.
    pub fn shutdown(&self, timeout: Timeout) -> Result<()> {
        let started = Instant::now();
        self.queue.shutdown(timeout)?;
        self.queue
            .wait_ext(timeout.remaining(started), |counts| counts.live == 0)?;
        tracing::debug!(
            handle = %self.handle,
            completed = self.completed.load(Ordering::Relaxed),
            "pool shut down"
        );
        Ok(())
    }

    /// Snapshot of the worker counts
    pub fn workers(&self) -> WorkerCounts {
        self.queue.read_ext(|counts| *counts)
    }

    /// Jobs waiting for a worker
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Jobs run to completion so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Workers spawned over the pool's lifetime
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// The pool's handle
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Options the pool was created with
    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Block until no worker is live
    ///
    /// Unlike [`Pool::shutdown`] this leaves the queue open.
    pub fn wait_idle(&self, timeout: Timeout) -> Result<()> {
        self.queue.wait_ext(timeout, |counts| counts.live == 0)
    }

    /// Called with the queue lock held
    fn spawn_worker(&self) -> Result<()> {
        let pool = self.registry.get::<Pool>(self.handle)?;
        let mut builder = thread::Builder::new().name(self.options.thread_name.clone());
        if let Some(size) = self.options.stack_size {
            builder = builder.stack_size(size);
        }

        match builder.spawn(move || run_worker(pool)) {
            Ok(_detached) => {
                let n = self.spawned.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!(handle = %self.handle, spawned = n, "worker spawned");
                Ok(())
            }
            Err(error) => {
                tracing::error!(handle = %self.handle, %error, "failed to spawn pool worker");
                Err(Error::Exhausted)
            }
        }
    }
}

/// Keeps the worker counts right however the worker leaves its loop
struct WorkerExit<'a> {
    pool: &'a Pool,
    busy: bool,
    retired: bool,
}

impl Drop for WorkerExit<'_> {
    fn drop(&mut self) {
        if !self.retired {
            let busy = self.busy;
            self.pool.queue.update_ext(|counts| {
                counts.live -= 1;
                if !busy {
                    counts.idle -= 1;
                }
            });
        } else {
            self.pool.queue.wake_all();
        }
        if thread::panicking() {
            tracing::warn!(handle = %self.pool.handle, "pool worker died in a job");
        }
    }
}

fn run_worker(pool: Ref<Pool>) {
    let idle_timeout = Timeout::from(pool.options.idle_timeout());
    let mut exit = WorkerExit {
        pool: &pool,
        busy: false,
        retired: false,
    };

    loop {
        // Retirement is counted under the same lock that saw the queue empty,
        // so a concurrent `add` never counts on a worker that is leaving.
        let (job, ()) = pool.queue.dequeue_with(idle_timeout, |counts, outcome| {
            counts.idle -= 1;
            if outcome.is_err() {
                counts.live -= 1;
            }
        });

        match job {
            Ok(job) => {
                exit.busy = true;
                job();
                exit.busy = false;
                pool.completed.fetch_add(1, Ordering::Relaxed);
                pool.queue.update_ext(|counts| counts.idle += 1);
            }
            Err(reason) => {
                exit.retired = true;
                tracing::trace!(handle = %pool.handle, %reason, "worker retiring");
                break;
            }
        }
    }
}

impl Resource for Pool {
    fn kind(&self) -> Kind {
        Kind::Pool
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let pending = self.queue.len();
        if pending > 0 {
            tracing::debug!(handle = %self.handle, pending, "dropping unexecuted jobs");
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("handle", &self.handle)
            .field("workers", &self.workers())
            .field("pending", &self.pending())
            .field("completed", &self.completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use crossbeam::channel;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn pool(max_threads: usize, limit: QueueLimit) -> (Registry, Ref<Pool>) {
        init_test_logging();
        let registry = Registry::new();
        let pool = Pool::create(&registry, PoolOptions::new(max_threads, limit)).unwrap();
        (registry, pool)
    }

    #[test]
    fn test_zero_workers_rejected() {
        let registry = Registry::new();
        let result = Pool::create(&registry, PoolOptions::new(0, QueueLimit::Unbounded));
        assert_eq!(result.unwrap_err(), Error::InvalidArgument("max_threads"));
    }

    #[test]
    fn test_runs_jobs_and_shuts_down() {
        let (registry, pool) = pool(2, QueueLimit::Bounded(4));
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let ran = ran.clone();
            pool.add(
                move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                },
                Timeout::Forever,
            )
            .unwrap();
        }

        pool.shutdown(Timeout::Forever).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 10);
        assert_eq!(pool.completed(), 10);
        assert_eq!(pool.workers().live, 0);
        assert!(pool.spawned() <= 10);
        assert_eq!(registry.kind_of(pool.handle()), Some(Kind::Pool));
    }

    #[test]
    fn test_worker_cap_respected() {
        let (_registry, pool) = pool(2, QueueLimit::Unbounded);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            pool.add(
                move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    running.fetch_sub(1, Ordering::SeqCst);
                },
                Timeout::Forever,
            )
            .unwrap();
            assert!(pool.workers().live <= 2);
        }
        pool.shutdown(Timeout::Forever).unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_idle_workers_retire() {
        init_test_logging();
        let registry = Registry::new();
        let options = PoolOptions {
            idle_timeout_ms: 20,
            ..PoolOptions::new(1, QueueLimit::Unbounded)
        };
        let pool = Pool::create(&registry, options).unwrap();
        let (tx, rx) = channel::bounded(1);
        pool.add(move || tx.send(()).unwrap(), Timeout::Forever)
            .unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        pool.wait_idle(Timeout::After(Duration::from_secs(2)))
            .unwrap();
        assert_eq!(pool.workers(), WorkerCounts { live: 0, idle: 0, max: 1 });

        // A retired pool spawns a fresh worker on demand
        let (tx, rx) = channel::bounded(1);
        pool.add(move || tx.send(()).unwrap(), Timeout::Forever)
            .unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(pool.spawned(), 2);
    }

    #[test]
    fn test_add_after_shutdown_fails() {
        let (_registry, pool) = pool(1, QueueLimit::Unbounded);
        pool.shutdown(Timeout::Forever).unwrap();
        let result = pool.add(|| {}, Timeout::Immediate);
        assert_eq!(result.unwrap_err(), Error::Shutdown);
    }

    #[test]
    fn test_add_with_passes_argument() {
        let (_registry, pool) = pool(1, QueueLimit::Unbounded);
        let (tx, rx) = channel::bounded(1);
        pool.add_with(21u32, move |n| tx.send(n * 2).unwrap(), Timeout::Forever)
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
        pool.shutdown(Timeout::Forever).unwrap();
    }

    #[test]
    fn test_panicking_job_releases_worker() {
        let (_registry, pool) = pool(1, QueueLimit::Unbounded);
        pool.add(|| panic!("job failed"), Timeout::Forever).unwrap();
        pool.wait_idle(Timeout::After(Duration::from_secs(2)))
            .unwrap();

        let (tx, rx) = channel::bounded(1);
        pool.add(move || tx.send(()).unwrap(), Timeout::Forever)
            .unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        pool.shutdown(Timeout::Forever).unwrap();
        assert_eq!(pool.workers().live, 0);
    }

    #[test]
    fn test_failed_worker_spawn_withdraws_job() {
        init_test_logging();
        let registry = Registry::new();
        let options = PoolOptions {
            stack_size: Some(1 << 60),
            ..PoolOptions::new(1, QueueLimit::Unbounded)
        };
        let pool = Pool::create(&registry, options).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let ran = Arc::clone(&ran);
            let result = pool.add(
                move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                },
                Timeout::Immediate,
            );
            assert_eq!(result.unwrap_err(), Error::Exhausted);
        }
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.workers(), WorkerCounts { live: 0, idle: 0, max: 1 });
        assert_eq!(pool.spawned(), 0);
        assert_eq!(pool.shutdown(Timeout::millis(200)), Ok(()));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pool_kind_descends_from_queue() {
        let (registry, pool) = pool(1, QueueLimit::Unbounded);
        assert_eq!(registry.kind_of(pool.handle()), Some(Kind::Pool));
        assert!(registry.get_kind(pool.handle(), Kind::Queue).is_ok());
    }
}
