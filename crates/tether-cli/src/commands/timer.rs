//! `tether timer`: schedule a one-shot task, then race a cancel against it
//!
//! A cancel attempted strictly before the due time must hand back the
//! task's argument and the body must never run. A later cancel must report
//! not-found after the body has run.

use crate::output::StyledOutput;
use crossbeam::channel::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tether_core::{Error, Runtime, RuntimeConfig, Timeout, Timespec};

/// Extra time allowed for the scheduler thread to wake
const SLACK: Duration = Duration::from_millis(200);

pub fn execute(
    config: &RuntimeConfig,
    out: &mut StyledOutput,
    delay_ms: u64,
    cancel_at_ms: u64,
) -> anyhow::Result<bool> {
    let runtime = Runtime::new(config.clone())?;
    let delay = Duration::from_millis(delay_ms);
    let cancel_at = Duration::from_millis(cancel_at_ms);
    let (tx, rx) = channel::unbounded::<Duration>();

    let started = Instant::now();
    let task = runtime.scheduler().schedule(
        Some(Timespec::now().add(delay)),
        None,
        tx,
        move |_, tx: &mut Sender<Duration>| {
            let _ = tx.send(started.elapsed());
        },
    )?;

    thread::sleep(cancel_at.saturating_sub(started.elapsed()));
    let cancelled = runtime.scheduler().cancel(task);
    let cancelled_after = started.elapsed();
    // The returned argument is the sender; dropping it disconnects the channel
    let cancel_outcome = match cancelled {
        Ok(Some(arg)) => {
            drop(arg);
            Ok(true)
        }
        Ok(None) => Ok(false),
        Err(e) => Err(e),
    };

    let fired_at = rx.recv_timeout(delay.saturating_sub(cancelled_after) + SLACK).ok();
    runtime.shutdown(Timeout::Forever)?;

    out.heading("timer");
    out.field("task", task);
    out.field("due after", format!("{:?}", delay));
    out.field("cancel at", format!("{:.2?}", cancelled_after));
    out.field(
        "cancel result",
        match cancel_outcome {
            Ok(true) => "cancelled, argument returned".to_string(),
            Ok(false) => "cancelled while running".to_string(),
            Err(e) => e.to_string(),
        },
    );
    out.field(
        "fired at",
        fired_at.map_or("never".to_string(), |at| format!("{:.2?}", at)),
    );

    let ok = if cancel_at < delay {
        let mut ok = out.check("cancel returned the argument", cancel_outcome == Ok(true));
        ok &= out.check("body never ran", fired_at.is_none());
        ok
    } else {
        let mut ok = out.check("cancel reported not found", cancel_outcome == Err(Error::NotFound));
        ok &= out.check("body ran", fired_at.is_some());
        ok
    };
    if cancel_at.abs_diff(delay) < Duration::from_millis(5) {
        out.warning("cancel and due time are within 5ms; the outcome is a race");
    }
    Ok(ok)
}
