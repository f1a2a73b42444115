//! Scheduled task objects

use super::scheduler::Shared;
use crate::error::Result;
use crate::handle::{Handle, Kind, Resource};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Heap index of a task that is not in the heap
pub(crate) const NOT_QUEUED: usize = usize::MAX;

/// Handle naming a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(Handle);

impl TaskHandle {
    /// The underlying registry handle
    pub fn as_handle(self) -> Handle {
        self.0
    }

    /// Reinterpret a registry handle as a task handle
    pub fn from_handle(handle: Handle) -> Self {
        Self(handle)
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {}", self.0)
    }
}

type Action = Box<dyn FnMut(&TaskContext<'_>, &mut (dyn Any + Send)) + Send>;

/// The argument and action of a task; taken out while the action runs
pub(crate) struct Payload {
    pub(crate) arg: Box<dyn Any + Send>,
    action: Action,
}

impl Payload {
    pub(crate) fn new<A, F>(arg: A, mut func: F) -> Self
    where
        A: Send + 'static,
        F: FnMut(&TaskContext<'_>, &mut A) + Send + 'static,
    {
        Self {
            arg: Box::new(arg),
            action: Box::new(move |cx, arg| {
                if let Some(arg) = arg.downcast_mut::<A>() {
                    func(cx, arg)
                }
            }),
        }
    }

    pub(crate) fn run(&mut self, cx: &TaskContext<'_>) {
        (self.action)(cx, self.arg.as_mut())
    }
}

/// A registered task
///
/// `heap_index` is only written with the scheduler lock held. `cancelled`
/// is only written with `payload` locked, so the scheduler thread and a
/// cancelling thread agree on who disposes of the argument.
pub(crate) struct Task {
    handle: Handle,
    pub(crate) interval: Option<Duration>,
    pub(crate) heap_index: AtomicUsize,
    pub(crate) fired: AtomicU64,
    pub(crate) cancelled: AtomicBool,
    pub(crate) payload: Mutex<Option<Payload>>,
}

impl Task {
    pub(crate) fn new(handle: Handle, interval: Option<Duration>, payload: Option<Payload>) -> Self {
        Self {
            handle,
            interval,
            heap_index: AtomicUsize::new(NOT_QUEUED),
            fired: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            payload: Mutex::new(payload),
        }
    }

    pub(crate) fn id(&self) -> TaskHandle {
        TaskHandle(self.handle)
    }

    pub(crate) fn is_queued(&self) -> bool {
        self.heap_index.load(Ordering::Relaxed) != NOT_QUEUED
    }
}

impl Resource for Task {
    fn kind(&self) -> Kind {
        Kind::Task
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("handle", &self.handle)
            .field("interval", &self.interval)
            .field("fired", &self.fired.load(Ordering::Relaxed))
            .finish()
    }
}

/// What a running task can see about itself
pub struct TaskContext<'a> {
    pub(crate) handle: TaskHandle,
    pub(crate) firing: u64,
    pub(crate) shared: &'a Shared,
}

impl TaskContext<'_> {
    /// Handle of the running task
    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    /// 1-based number of this firing
    pub fn firing(&self) -> u64 {
        self.firing
    }

    /// Cancel the running task so it never fires again
    ///
    /// The argument stays with the running action and is dropped once it
    /// returns. Fails with [`Error::NotFound`](crate::Error::NotFound) for a
    /// one-shot task, which is no longer scheduled while it runs.
    pub fn cancel(&self) -> Result<()> {
        self.shared.cancel(self.handle).map(drop)
    }
}

impl fmt::Debug for TaskContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("handle", &self.handle)
            .field("firing", &self.firing)
            .finish()
    }
}
