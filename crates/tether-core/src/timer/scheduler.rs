//! Scheduler thread
//!
//! A single thread sleeps until the earliest task is due, using condvar
//! timeouts so that a newly scheduled earlier task wakes it early. Task
//! actions run on this thread with the scheduler lock released.

use super::heap::{Entry, TaskHeap, DEFAULT_MIN_CAPACITY};
use super::task::{Payload, Task, TaskContext, TaskHandle};
use crate::error::{Error, Result};
use crate::handle::{Ref, Registry};
use crate::time::Timespec;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerOptions {
    /// Name of the scheduler thread
    pub thread_name: String,
    /// Heap capacity never shrinks below this
    pub min_capacity: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            thread_name: "tether-timer".to_string(),
            min_capacity: DEFAULT_MIN_CAPACITY,
        }
    }
}

struct State {
    heap: TaskHeap,
    current: Option<TaskHandle>,
    next_seq: u64,
    stopping: bool,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Take `task` out of the heap if it is still scheduled
    fn unschedule(&mut self, task: &Task) -> Option<Ref<Task>> {
        if !task.is_queued() {
            return None;
        }
        let index = task.heap_index.load(Ordering::Relaxed);
        match self.heap.get(index) {
            Some(entry) if entry.task.id() == task.id() => {
                Some(self.heap.remove(index).task)
            }
            _ => None,
        }
    }
}

pub(crate) struct Shared {
    registry: Registry,
    state: Mutex<State>,
    cond: Condvar,
}

impl Shared {
    pub(crate) fn cancel(&self, handle: TaskHandle) -> Result<Option<Box<dyn Any + Send>>> {
        let task = self
            .registry
            .get::<Task>(handle.as_handle())
            .map_err(|_| Error::NotFound)?;

        let scheduled = self.state.lock().unschedule(&task);
        let Some(scheduled) = scheduled else {
            return Err(Error::NotFound);
        };
        // Dropped with no scheduler lock held; the task may be destroyed here
        drop(scheduled);

        let mut payload = task.payload.lock();
        task.cancelled.store(true, Ordering::Relaxed);
        let arg = payload.take().map(|payload| payload.arg);
        drop(payload);

        tracing::debug!(%handle, running = arg.is_none(), "task cancelled");
        Ok(arg)
    }

    fn run(&self) {
        let mut state = self.state.lock();
        loop {
            if state.stopping {
                break;
            }

            let now = Timespec::now();
            let wait = match state.heap.peek() {
                None => {
                    self.cond.wait(&mut state);
                    continue;
                }
                Some(top) => top.due.until(&now),
            };
            if let Some(wait) = wait {
                self.cond.wait_for(&mut state, wait);
                continue;
            }

            let Some(entry) = state.heap.pop() else {
                continue;
            };
            let running = entry.task;

            if let Some(interval) = running.interval {
                // Rescheduled before the action runs, so the action may cancel it
                let seq = state.next_seq();
                let next = Entry {
                    due: entry.due.add(interval),
                    seq,
                    task: running.clone(),
                };
                if let Err((error, next)) = state.heap.push(next) {
                    tracing::warn!(handle = %running.id(), %error, "periodic task dropped");
                    MutexGuard::unlocked(&mut state, || drop(next));
                }
            }

            state.current = Some(running.id());
            MutexGuard::unlocked(&mut state, || self.execute(&running));
            state.current = None;
            MutexGuard::unlocked(&mut state, move || drop(running));
        }

        let leftovers = state.heap.drain();
        drop(state);
        if !leftovers.is_empty() {
            tracing::debug!(count = leftovers.len(), "discarding unfired tasks");
        }
        drop(leftovers);
        tracing::debug!("scheduler thread stopped");
    }

    fn execute(&self, task: &Ref<Task>) {
        let taken = task.payload.lock().take();
        let Some(mut payload) = taken else {
            // Cancelled between being popped and running
            return;
        };

        let firing = task.fired.fetch_add(1, Ordering::Relaxed) + 1;
        let cx = TaskContext {
            handle: task.id(),
            firing,
            shared: self,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| payload.run(&cx)));

        if outcome.is_err() {
            tracing::warn!(handle = %task.id(), "task action panicked; cancelling");
            let scheduled = self.state.lock().unschedule(task);
            drop(scheduled);
            let _slot = task.payload.lock();
            task.cancelled.store(true, Ordering::Relaxed);
        }

        let mut slot = task.payload.lock();
        if task.interval.is_some() && !task.cancelled.load(Ordering::Relaxed) {
            *slot = Some(payload);
        } else {
            drop(slot);
            drop(payload);
        }
    }
}

/// Timer-heap scheduler running task actions on its own thread
///
/// Dropping the scheduler stops its thread; tasks that have not fired are
/// discarded along with their arguments.
pub struct Scheduler {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl Scheduler {
    /// Start a scheduler whose tasks are registered in `registry`
    pub fn new(registry: &Registry, options: SchedulerOptions) -> Result<Self> {
        let shared = Arc::new(Shared {
            registry: registry.clone(),
            state: Mutex::new(State {
                heap: TaskHeap::new(options.min_capacity),
                current: None,
                next_seq: 0,
                stopping: false,
            }),
            cond: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|error| {
                tracing::error!(%error, "failed to spawn scheduler thread");
                Error::Exhausted
            })?;

        tracing::debug!(thread = %options.thread_name, "scheduler started");
        Ok(Self {
            shared,
            thread_id: thread.thread().id(),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Schedule `func` to run with `arg`
    ///
    /// The first firing happens at `at`, or one `interval` from now when `at`
    /// is unset. A task with an interval then fires every `interval` after
    /// its previous due time until cancelled. Zero values count as unset;
    /// leaving both unset is [`Error::InvalidArgument`].
    pub fn schedule<A, F>(
        &self,
        at: Option<Timespec>,
        interval: Option<Duration>,
        arg: A,
        func: F,
    ) -> Result<TaskHandle>
    where
        A: Send + 'static,
        F: FnMut(&TaskContext<'_>, &mut A) + Send + 'static,
    {
        let interval = interval.filter(|d| !d.is_zero());
        let due = match (at.filter(|t| !t.is_zero()), interval) {
            (Some(at), _) => at.normalize(),
            (None, Some(interval)) => Timespec::now().add(interval),
            (None, None) => return Err(Error::InvalidArgument("abstime or interval")),
        };

        let payload = Payload::new(arg, func);
        let task = self
            .shared
            .registry
            .create_with(|handle| Task::new(handle, interval, Some(payload)))?;
        let handle = task.id();

        let placed = {
            let mut state = self.shared.state.lock();
            if state.stopping {
                Err((Error::Shutdown, task))
            } else {
                let seq = state.next_seq();
                let placed = state
                    .heap
                    .push(Entry { due, seq, task })
                    .map_err(|(error, entry)| (error, entry.task));
                if let Ok(0) = placed {
                    self.shared.cond.notify_all();
                }
                placed
            }
        };

        match placed {
            Ok(_) => {
                tracing::trace!(%handle, ?interval, "task scheduled");
                Ok(handle)
            }
            Err((error, task)) => {
                drop(task);
                Err(error)
            }
        }
    }

    /// Run `func` once, `delay` from now
    pub fn schedule_after<F>(&self, delay: Duration, mut func: F) -> Result<TaskHandle>
    where
        F: FnMut(&TaskContext<'_>) + Send + 'static,
    {
        self.schedule(Some(Timespec::now().add(delay)), None, (), move |cx, _| func(cx))
    }

    /// Run `func` every `interval`, starting one interval from now
    pub fn schedule_every<F>(&self, interval: Duration, mut func: F) -> Result<TaskHandle>
    where
        F: FnMut(&TaskContext<'_>) + Send + 'static,
    {
        self.schedule(None, Some(interval), (), move |cx, _| func(cx))
    }

    /// Cancel a scheduled task
    ///
    /// Returns the task's argument when the task was idle, or `None` when it
    /// was cancelled while running (the argument is then dropped once the
    /// running action returns). Fails with [`Error::NotFound`] if the task
    /// already fired for the last time or was already cancelled.
    pub fn cancel(&self, handle: TaskHandle) -> Result<Option<Box<dyn Any + Send>>> {
        self.shared.cancel(handle)
    }

    /// [`cancel`](Self::cancel) and recover the argument as its concrete type
    pub fn cancel_as<A: 'static>(&self, handle: TaskHandle) -> Result<Option<A>> {
        match self.cancel(handle)? {
            None => Ok(None),
            Some(arg) => arg
                .downcast::<A>()
                .map(|arg| Some(*arg))
                .map_err(|_| Error::InvalidArgument("argument type")),
        }
    }

    /// Handle of the task whose action is running on the calling thread
    ///
    /// Always `None` outside the scheduler thread.
    pub fn current_task(&self) -> Option<TaskHandle> {
        if thread::current().id() != self.thread_id {
            return None;
        }
        self.shared.state.lock().current
    }

    /// Number of tasks waiting to fire
    pub fn pending(&self) -> usize {
        self.shared.state.lock().heap.len()
    }

    /// Whether the scheduler has been asked to stop
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().stopping
    }

    /// Stop the scheduler thread and discard unfired tasks
    ///
    /// Waits for a running action to return, unless called from inside one.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stopping = true;
            self.shared.cond.notify_all();
        }

        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if self.thread_id == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            tracing::error!("scheduler thread panicked");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Scheduler")
            .field("pending", &state.heap.len())
            .field("current", &state.current)
            .field("stopping", &state.stopping)
            .finish()
    }
}
