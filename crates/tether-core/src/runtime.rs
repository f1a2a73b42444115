//! Runtime facade
//!
//! Bundles one registry, one scheduler and a default pool built from a
//! [`RuntimeConfig`]. Timed work that must not block the scheduler thread
//! is handed to the pool with [`Runtime::schedule_on_pool`].

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::handle::{Ref, Registry};
use crate::pool::Pool;
use crate::time::Timeout;
use crate::timer::{Scheduler, TaskHandle};
use std::time::{Duration, Instant};

/// Registry, scheduler and default pool sharing one configuration
pub struct Runtime {
    config: RuntimeConfig,
    registry: Registry,
    scheduler: Scheduler,
    pool: Ref<Pool>,
}

impl Runtime {
    /// Build every component from `config`
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let registry = Registry::with_options(config.registry.clone());
        let scheduler = Scheduler::new(&registry, config.scheduler.clone())?;
        let pool = Pool::create(&registry, config.pool.clone())?;
        tracing::debug!(
            strategy = ?registry.strategy(),
            max_threads = config.pool.max_threads,
            "runtime started"
        );
        Ok(Self {
            config,
            registry,
            scheduler,
            pool,
        })
    }

    /// The shared registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The task scheduler
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The default pool
    pub fn pool(&self) -> &Ref<Pool> {
        &self.pool
    }

    /// Effective configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Every `interval`, submit a fresh job built by `make_job` to the pool
    ///
    /// The task itself only enqueues, so a slow job never delays other
    /// tasks. If the pool refuses a job the task cancels itself.
    pub fn schedule_on_pool<F, J>(&self, interval: Duration, mut make_job: F) -> Result<TaskHandle>
    where
        F: FnMut() -> J + Send + 'static,
        J: FnOnce() + Send + 'static,
    {
        let pool = self.pool.clone();
        self.scheduler.schedule_every(interval, move |cx| {
            if let Err(error) = pool.add(make_job(), Timeout::Immediate) {
                tracing::debug!(handle = %cx.handle(), %error, "pool refused timed job");
                let _ = cx.cancel();
            }
        })
    }

    /// Stop the scheduler, then drain and stop the pool
    pub fn shutdown(&self, timeout: Timeout) -> Result<()> {
        let started = Instant::now();
        self.scheduler.shutdown();
        self.pool.shutdown(timeout.remaining(started))
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("registry", &self.registry.stats())
            .field("scheduler", &self.scheduler)
            .field("pool", &*self.pool)
            .finish()
    }
}
