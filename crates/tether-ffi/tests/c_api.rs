//! Exercises the exported C surface the way a C caller would

use crossbeam::channel::{self, Sender};
use std::ffi::{c_void, CStr};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tether_ffi::*;

fn type_of(h: TetherHandle) -> Option<String> {
    let name = tether_object_type(h);
    if name.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
}

fn new_queue(limit: i64, destroyer: TetherCallback) -> TetherHandle {
    let mut h: TetherHandle = 0;
    assert_eq!(unsafe { tether_queue_create(limit, destroyer, &mut h) }, 0);
    assert_ne!(h, 0);
    h
}

// ============================================================================
// Objects and queues
// ============================================================================

#[test]
fn test_queue_fifo_lifo_through_handles() {
    let q = new_queue(0, None);
    assert_eq!(type_of(q).as_deref(), Some("object:queue"));

    for i in 1..=3usize {
        assert_eq!(tether_queue_add(q, i as *mut c_void, 0.0), 0);
    }
    assert_eq!(tether_queue_push(q, 9usize as *mut c_void, 0.0), 0);
    assert_eq!(tether_queue_count(q), 4);

    let mut item: *mut c_void = ptr::null_mut();
    assert_eq!(unsafe { tether_queue_peek(q, &mut item) }, 0);
    assert_eq!(item as usize, 9);

    let mut seen = Vec::new();
    while unsafe { tether_queue_pop(q, &mut item, 0.0) } == 0 {
        seen.push(item as usize);
    }
    assert_eq!(seen, vec![9, 1, 2, 3]);
    assert_eq!(unsafe { tether_queue_peek(q, &mut item) }, libc::ENOENT);
    assert_eq!(unsafe { tether_queue_pop(q, &mut item, 0.01) }, libc::ETIMEDOUT);

    assert_eq!(tether_queue_shutdown(q, 0.0), 0);
    assert_eq!(tether_queue_count(q), -1);
    assert_eq!(tether_object_discard(q), libc::EINVAL);
}

#[test]
fn test_fixed_queue_reports_full() {
    let q = new_queue(-2, None);
    assert_eq!(tether_queue_add(q, ptr::null_mut(), 0.0), 0);
    assert_eq!(tether_queue_add(q, ptr::null_mut(), 0.0), 0);
    assert_eq!(tether_queue_add(q, ptr::null_mut(), 0.0), libc::ETIMEDOUT);
    assert_eq!(tether_queue_add(q, ptr::null_mut(), 0.02), libc::ETIMEDOUT);
    assert_eq!(tether_object_discard(q), 0);
}

static DESTROYED: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn destroy_item(item: *mut c_void) {
    DESTROYED.fetch_add(item as usize, Ordering::SeqCst);
}

#[test]
fn test_destroyer_runs_for_leftovers_on_last_release() {
    let q = new_queue(0, Some(destroy_item));
    for i in [10usize, 20, 30] {
        assert_eq!(tether_queue_add(q, i as *mut c_void, 0.0), 0);
    }

    assert_eq!(tether_object_retain(q), 0);
    assert_eq!(tether_object_discard(q), 0);
    assert_eq!(DESTROYED.load(Ordering::SeqCst), 0);

    assert_eq!(tether_object_discard(q), 0);
    assert_eq!(DESTROYED.load(Ordering::SeqCst), 60);
}

#[test]
fn test_shutdown_with_items_times_out_then_rejects_producers() {
    let q = new_queue(0, None);
    assert_eq!(tether_queue_add(q, 1usize as *mut c_void, 0.0), 0);

    assert_eq!(tether_object_retain(q), 0);
    assert_eq!(tether_queue_shutdown(q, 0.0), libc::ETIMEDOUT);
    assert_eq!(tether_queue_add(q, ptr::null_mut(), 0.0), libc::ESHUTDOWN);

    // Still draining: the consumer gets the item
    let mut item: *mut c_void = ptr::null_mut();
    assert_eq!(unsafe { tether_queue_pop(q, &mut item, -1.0) }, 0);
    assert_eq!(item as usize, 1);

    // Drained: shutdown completes and gives up the creator's reference once
    assert_eq!(tether_queue_shutdown(q, 0.0), 0);
    assert_eq!(tether_queue_shutdown(q, 0.0), 0);
    assert_eq!(unsafe { tether_queue_pop(q, &mut item, -1.0) }, libc::ESHUTDOWN);

    assert_eq!(tether_object_discard(q), 0);
    assert_eq!(tether_queue_count(q), -1);
}

#[test]
fn test_null_out_parameters_are_rejected() {
    assert_eq!(
        unsafe { tether_queue_create(0, None, ptr::null_mut()) },
        libc::EINVAL
    );
    let q = new_queue(0, None);
    assert_eq!(unsafe { tether_queue_pop(q, ptr::null_mut(), 0.0) }, libc::EINVAL);
    assert_eq!(tether_object_discard(q), 0);
}

// ============================================================================
// Pools
// ============================================================================

static POOL_RUNS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn count_run(arg: *mut c_void) {
    POOL_RUNS.fetch_add(arg as usize, Ordering::SeqCst);
}

#[test]
fn test_pool_runs_every_accepted_item() {
    let mut p: TetherHandle = 0;
    assert_eq!(unsafe { tether_pool_create(2, 4, 0, &mut p) }, 0);
    assert_eq!(type_of(p).as_deref(), Some("object:queue:pool"));

    for _ in 0..10 {
        assert_eq!(
            tether_pool_add(p, Some(count_run), 1usize as *mut c_void, None, -1.0),
            0
        );
    }
    assert_eq!(tether_pool_shutdown(p, -1.0), 0);
    assert_eq!(POOL_RUNS.load(Ordering::SeqCst), 10);

    assert_eq!(
        tether_pool_add(p, Some(count_run), ptr::null_mut(), None, 0.0),
        libc::ESHUTDOWN
    );
    assert_eq!(tether_pool_add(p, None, ptr::null_mut(), None, 0.0), libc::EINVAL);
    assert_eq!(tether_object_discard(p), 0);
}

#[test]
fn test_pool_rejects_negative_thread_count() {
    let mut p: TetherHandle = 0;
    assert_eq!(unsafe { tether_pool_create(-1, 0, 0, &mut p) }, libc::EINVAL);
    assert_eq!(p, 0);
}

// ============================================================================
// Timers
// ============================================================================

unsafe extern "C" fn report_fire(arg: *mut c_void) {
    let tx = Box::from_raw(arg as *mut Sender<TetherHandle>);
    let _ = tx.send(tether_timer_this());
}

fn in_ms(ms: i64) -> TetherTimespec {
    let mut now = TetherTimespec::default();
    assert_eq!(unsafe { tether_timespec_now(&mut now) }, 0);
    now.tv_nsec += ms * 1_000_000;
    assert_eq!(unsafe { tether_timespec_normalize(&mut now) }, 0);
    now
}

#[test]
fn test_timer_fires_then_cancel_reports_missing() {
    let (tx, rx) = channel::bounded(1);
    let arg = Box::into_raw(Box::new(tx)) as *mut c_void;
    let at = in_ms(20);
    let mut task: TetherHandle = 0;
    assert_eq!(
        unsafe { tether_timer_schedule(&at, ptr::null(), Some(report_fire), arg, &mut task) },
        0
    );

    // The body sees its own task handle
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(task));
    // Not on the scheduler thread
    assert_eq!(tether_timer_this(), 0);

    let mut arg: *mut c_void = ptr::null_mut();
    assert_eq!(unsafe { tether_timer_cancel(task, &mut arg) }, libc::ENOENT);
}

unsafe extern "C" fn never_runs(_: *mut c_void) {
    panic!("cancelled task fired");
}

#[test]
fn test_cancel_returns_argument() {
    let at = in_ms(60_000);
    let interval = TetherTimespec {
        tv_sec: 1,
        tv_nsec: 0,
    };
    let mut task: TetherHandle = 0;
    assert_eq!(
        unsafe {
            tether_timer_schedule(&at, &interval, Some(never_runs), 77usize as *mut c_void, &mut task)
        },
        0
    );
    assert_eq!(type_of(task).as_deref(), Some("object:task"));

    let mut arg: *mut c_void = ptr::null_mut();
    assert_eq!(unsafe { tether_timer_cancel(task, &mut arg) }, 0);
    assert_eq!(arg as usize, 77);
    assert_eq!(unsafe { tether_timer_cancel(task, &mut arg) }, libc::ENOENT);
}

#[test]
fn test_schedule_requires_time_or_interval() {
    let mut task: TetherHandle = 0;
    let rc = unsafe {
        tether_timer_schedule(ptr::null(), ptr::null(), Some(never_runs), ptr::null_mut(), &mut task)
    };
    assert_eq!(rc, libc::EINVAL);

    let zero = TetherTimespec::default();
    let rc = unsafe { tether_timer_schedule(&zero, &zero, Some(never_runs), ptr::null_mut(), &mut task) };
    assert_eq!(rc, libc::EINVAL);
}
