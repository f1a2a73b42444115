//! Tether Concurrency Runtime
//!
//! This crate provides the core building blocks for multithreaded
//! server-style programs:
//! - **Registry**: reference-counted objects addressed by opaque handles (`handle` module)
//! - **Queue**: synchronized circular queue with blocking, timeouts and shutdown (`queue` module)
//! - **Timer**: a single-thread binary-heap scheduler for one-shot and periodic tasks (`timer` module)
//! - **Pool**: a thread pool composed over the queue (`pool` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::{Pool, PoolOptions, Registry, Timeout};
//!
//! let registry = Registry::default();
//! let pool = Pool::create(&registry, PoolOptions::default())?;
//! pool.add(|| println!("hello from a worker"), Timeout::Forever)?;
//! pool.shutdown(Timeout::Forever)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![cfg_attr(test, allow(clippy::identity_op))]
#![allow(clippy::new_without_default)]

// ============================================================================
// Core Modules
// ============================================================================

/// Error taxonomy shared by every subsystem
pub mod error;

/// Time representation and the uniform timeout convention
pub mod time;

/// Object base: handles, the registry and strong references
pub mod handle;

/// Synchronized circular queue
pub mod queue;

/// Timer-heap task scheduler
pub mod timer;

/// Thread pool built atop the queue
pub mod pool;

/// Runtime configuration
pub mod config;

/// Runtime facade bundling registry, scheduler and pool
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_utils;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigError, RuntimeConfig};
pub use error::{Error, Rejected, Result};
pub use handle::{Handle, Kind, Ref, Registry, RegistryOptions, RegistryStats, Resource, Strategy};
pub use pool::{Pool, PoolOptions};
pub use queue::{End, Queue, QueueLimit, QueueOptions};
pub use runtime::Runtime;
pub use time::{Timeout, Timespec};
pub use timer::{Scheduler, SchedulerOptions, TaskContext, TaskHandle};
