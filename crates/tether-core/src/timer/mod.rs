//! Timer-heap task scheduler
//!
//! Tasks are registered objects of kind [`Kind::Task`](crate::Kind::Task)
//! held in a binary min-heap keyed by due time. One scheduler thread fires
//! them in due order; a periodic task is put back into the heap before its
//! action runs.

mod heap;
mod scheduler;
mod task;

pub use heap::DEFAULT_MIN_CAPACITY;
pub use scheduler::{Scheduler, SchedulerOptions};
pub use task::{TaskContext, TaskHandle};
