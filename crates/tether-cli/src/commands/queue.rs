//! `tether queue`: fill an unbounded queue, shut it down, then drain it

use crate::output::StyledOutput;
use tether_core::{Error, Queue, QueueLimit, QueueOptions, RuntimeConfig, Timeout};

pub fn execute(config: &RuntimeConfig, out: &mut StyledOutput, items: u64) -> anyhow::Result<bool> {
    let queue: Queue<u64> = Queue::new(QueueOptions {
        limit: QueueLimit::Unbounded,
        ..config.queue.clone()
    })?;

    for i in 0..items {
        queue.add(i, Timeout::Immediate).map_err(Error::from)?;
    }
    let peak_capacity = queue.capacity();

    let first = queue.shutdown(Timeout::Immediate);
    let late_add = queue.add(items, Timeout::Immediate).map_err(|r| r.error);

    let mut drained = 0u64;
    let mut in_order = true;
    while let Ok(item) = queue.pop(Timeout::Immediate) {
        in_order &= item == drained;
        drained += 1;
    }
    let second = queue.shutdown(Timeout::Immediate);

    out.heading("queue");
    out.field("items", items);
    out.field("peak capacity", peak_capacity);
    out.field("final capacity", queue.capacity());
    out.field("first shutdown", outcome(first));
    out.field("drained", drained);
    out.field("second shutdown", outcome(second));

    let expected_first = if items == 0 { Ok(()) } else { Err(Error::TimedOut) };
    let mut ok = out.check("shutdown with items pending times out", first == expected_first);
    ok &= out.check("adds are refused while draining", late_add == Err(Error::Shutdown));
    ok &= out.check("every item drained in FIFO order", drained == items && in_order);
    ok &= out.check("shutdown of the drained queue succeeds", second == Ok(()));
    ok &= out.check("queue is closed", queue.is_closed());
    Ok(ok)
}

fn outcome(result: tether_core::Result<()>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(e) => e.to_string(),
    }
}
