//! `tether pool`: run work items through a pool and verify each ran once

use crate::output::StyledOutput;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tether_core::{QueueLimit, Runtime, RuntimeConfig, Timeout};

pub fn execute(
    config: &RuntimeConfig,
    out: &mut StyledOutput,
    threads: usize,
    limit: i64,
    items: usize,
) -> anyhow::Result<bool> {
    let mut config = config.clone();
    config.pool.max_threads = threads;
    config.pool.queue_limit = QueueLimit::from_raw(limit);
    config.validate()?;

    let runtime = Runtime::new(config)?;
    let pool = runtime.pool();
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..items).map(|_| AtomicUsize::new(0)).collect());

    let started = Instant::now();
    for i in 0..items {
        let runs = Arc::clone(&runs);
        pool.add_with(
            i,
            move |i: usize| {
                runs[i].fetch_add(1, Ordering::SeqCst);
            },
            Timeout::Forever,
        )?;
    }
    runtime.shutdown(Timeout::Forever)?;
    let elapsed = started.elapsed();

    let exactly_once = runs.iter().filter(|c| c.load(Ordering::SeqCst) == 1).count();
    let workers = pool.workers();

    out.heading("pool");
    out.field("threads", threads);
    out.field("queue limit", limit);
    out.field("items", items);
    out.field("workers spawned", pool.spawned());
    out.field("jobs completed", pool.completed());
    out.field("elapsed", format!("{:.2?}", elapsed));

    let mut ok = out.check("every item ran exactly once", exactly_once == items);
    ok &= out.check("no workers remain after shutdown", workers.live == 0);
    ok &= out.check("job queue drained", pool.pending() == 0);
    Ok(ok)
}
