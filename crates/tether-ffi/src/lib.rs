//! C FFI bindings for the Tether runtime
//!
//! The API follows these principles:
//! - Every object is named by an opaque, pointer-sized handle; 0 is null
//! - Every fallible call returns 0 or a POSIX code (`EINVAL`, `EAGAIN`,
//!   `ETIMEDOUT`, `ESHUTDOWN`, `ENOENT`)
//! - Timeouts are seconds as a double: negative blocks forever, zero never
//!   blocks, positive bounds the wait
//! - Items and arguments are raw `void *` owned by the caller, except where
//!   a destroyer or disposer is supplied
//!
//! One process-wide registry backs every handle. The scheduler thread is
//! started on the first timer call.

use once_cell::sync::{Lazy, OnceCell};
use std::ffi::{c_char, c_double, c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{
    End, Error, Handle, Kind, Pool, PoolOptions, Queue, QueueLimit, QueueOptions, Ref, Registry,
    Resource, Scheduler, SchedulerOptions, TaskHandle, Timeout, Timespec,
};

// ============================================================================
// Types
// ============================================================================

/// Opaque object handle; 0 is the null handle
pub type TetherHandle = usize;

/// Callback taking one caller-owned pointer
pub type TetherCallback = Option<unsafe extern "C" fn(*mut c_void)>;

/// A `(seconds, nanoseconds)` pair
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TetherTimespec {
    /// Whole seconds
    pub tv_sec: i64,
    /// Nanoseconds; in `[0, 1e9)` once normalized
    pub tv_nsec: i64,
}

impl From<TetherTimespec> for Timespec {
    fn from(ts: TetherTimespec) -> Self {
        Timespec::new(ts.tv_sec, ts.tv_nsec)
    }
}

impl From<Timespec> for TetherTimespec {
    fn from(ts: Timespec) -> Self {
        TetherTimespec {
            tv_sec: ts.sec,
            tv_nsec: ts.nsec,
        }
    }
}

/// A caller-owned pointer moved between threads
#[derive(Debug, Clone, Copy)]
struct RawItem(*mut c_void);

// SAFETY: the runtime never dereferences the pointer; it is only handed
// back to the caller or to the caller's callbacks.
unsafe impl Send for RawItem {}

/// Queue registered through the C API
///
/// `released` records whether the creator's reference has been given up by
/// a successful shutdown.
struct CQueue {
    queue: Queue<RawItem>,
    released: AtomicBool,
}

impl Resource for CQueue {
    fn kind(&self) -> Kind {
        Kind::Queue
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
enum FfiError {
    #[error("null {0}")]
    Null(&'static str),

    #[error(transparent)]
    Core(#[from] Error),
}

impl FfiError {
    fn code(&self) -> c_int {
        match self {
            FfiError::Null(_) => libc::EINVAL,
            FfiError::Core(e) => errno(*e),
        }
    }
}

/// POSIX code for a runtime error
pub fn errno(error: Error) -> c_int {
    match error {
        Error::InvalidHandle | Error::InvalidArgument(_) => libc::EINVAL,
        Error::Exhausted => libc::EAGAIN,
        Error::TimedOut => libc::ETIMEDOUT,
        Error::Shutdown => libc::ESHUTDOWN,
        Error::NotFound => libc::ENOENT,
    }
}

fn status(call: &'static str, result: Result<(), FfiError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(error) => {
            tracing::debug!(call, %error, "ffi call failed");
            error.code()
        }
    }
}

// ============================================================================
// Process-wide state
// ============================================================================

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static SCHEDULER: OnceCell<Scheduler> = OnceCell::new();

/// The registry behind every C handle
pub fn registry() -> &'static Registry {
    &REGISTRY
}

fn scheduler() -> Result<&'static Scheduler, Error> {
    SCHEDULER.get_or_try_init(|| Scheduler::new(&REGISTRY, SchedulerOptions::default()))
}

fn handle(raw: TetherHandle) -> Result<Handle, Error> {
    Handle::from_usize(raw).ok_or(Error::InvalidHandle)
}

fn queue(raw: TetherHandle) -> Result<Ref<CQueue>, Error> {
    REGISTRY.get::<CQueue>(handle(raw)?)
}

fn pool(raw: TetherHandle) -> Result<Ref<Pool>, Error> {
    REGISTRY.get::<Pool>(handle(raw)?)
}

unsafe fn write_out<T>(out: *mut T, value: T) -> Result<(), FfiError> {
    if out.is_null() {
        return Err(FfiError::Null("out-parameter"));
    }
    *out = value;
    Ok(())
}

// ============================================================================
// Objects
// ============================================================================

/// Add one reference to a live object
///
/// # Returns
/// * 0 on success
/// * `EINVAL` if the handle is not live
#[no_mangle]
pub extern "C" fn tether_object_retain(object: TetherHandle) -> c_int {
    let result = handle(object).and_then(|h| {
        let r = REGISTRY.lookup(h).ok_or(Error::InvalidHandle)?;
        r.into_handle();
        Ok(())
    });
    status("tether_object_retain", result.map_err(FfiError::from))
}

/// Release one reference; the object is destroyed with its last reference
///
/// # Returns
/// * 0 on success
/// * `EINVAL` if the handle is not live (including a double discard)
#[no_mangle]
pub extern "C" fn tether_object_discard(object: TetherHandle) -> c_int {
    let result = handle(object).and_then(|h| REGISTRY.discard(h));
    status("tether_object_discard", result.map_err(FfiError::from))
}

/// Colon-joined type chain of a live object, e.g. `"object:queue"`
///
/// Returns NULL for a dead handle. The string is static.
#[no_mangle]
pub extern "C" fn tether_object_type(object: TetherHandle) -> *const c_char {
    let Some(kind) = handle(object).ok().and_then(|h| REGISTRY.kind_of(h)) else {
        return ptr::null();
    };
    let chain = match kind {
        Kind::Object | Kind::Custom(_) => c"object",
        Kind::Queue => c"object:queue",
        Kind::Pool => c"object:queue:pool",
        Kind::Task => c"object:task",
    };
    chain.as_ptr()
}

// ============================================================================
// Queues
// ============================================================================

/// Create a queue
///
/// # Arguments
/// * `limit` - negative: fixed capacity of `-limit` rounded up to a power
///   of two; 0: unbounded; positive: bounded
/// * `destroyer` - Optional callback applied to items left in the queue
///   when it is destroyed; must not block or use the queue
/// * `out` - Receives the new handle, holding the creator's reference
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tether_queue_create(
    limit: i64,
    destroyer: TetherCallback,
    out: *mut TetherHandle,
) -> c_int {
    let result = (|| -> Result<(), FfiError> {
        if out.is_null() {
            return Err(FfiError::Null("out-parameter"));
        }
        let mut queue = Queue::new(queue_options(limit)?)?;
        if let Some(destroy) = destroyer {
            queue = queue.with_destroyer(move |item: RawItem| unsafe { destroy(item.0) });
        }
        let created = REGISTRY.create(CQueue {
            queue,
            released: AtomicBool::new(false),
        })?;
        write_out(out, created.into_handle().as_usize())
    })();
    status("tether_queue_create", result)
}

fn queue_options(limit: i64) -> Result<QueueOptions, Error> {
    let mut options = QueueOptions::with_limit(QueueLimit::from_raw(limit));
    if options.limit == QueueLimit::Fixed {
        options.min_capacity = usize::try_from(limit.unsigned_abs())
            .ok()
            .and_then(usize::checked_next_power_of_two)
            .ok_or(Error::InvalidArgument("limit"))?;
    }
    Ok(options)
}

fn enqueue(q: TetherHandle, item: *mut c_void, timeout: c_double, end: End) -> Result<(), FfiError> {
    queue(q)?
        .queue
        .enqueue(RawItem(item), Timeout::from_secs_f64(timeout), end)
        .map_err(|rejected| rejected.error)?;
    Ok(())
}

/// Add an item at the tail, waiting up to `timeout` while the queue is full
#[no_mangle]
pub extern "C" fn tether_queue_add(q: TetherHandle, item: *mut c_void, timeout: c_double) -> c_int {
    status("tether_queue_add", enqueue(q, item, timeout, End::Back))
}

/// Add an item at the head, waiting up to `timeout` while the queue is full
#[no_mangle]
pub extern "C" fn tether_queue_push(q: TetherHandle, item: *mut c_void, timeout: c_double) -> c_int {
    status("tether_queue_push", enqueue(q, item, timeout, End::Front))
}

/// Remove the head item, waiting up to `timeout` while the queue is empty
///
/// # Returns
/// * 0 with the item stored in `out`
/// * `ETIMEDOUT` if nothing arrived in time
/// * `ESHUTDOWN` once the queue is shut down and empty
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tether_queue_pop(
    q: TetherHandle,
    out: *mut *mut c_void,
    timeout: c_double,
) -> c_int {
    let result = (|| -> Result<(), FfiError> {
        if out.is_null() {
            return Err(FfiError::Null("out-parameter"));
        }
        let item = queue(q)?.queue.pop(Timeout::from_secs_f64(timeout))?;
        write_out(out, item.0)
    })();
    status("tether_queue_pop", result)
}

/// Read the head item without removing it
///
/// # Returns
/// * 0 with the item stored in `out`
/// * `ENOENT` if the queue is empty
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tether_queue_peek(q: TetherHandle, out: *mut *mut c_void) -> c_int {
    let result = (|| -> Result<(), FfiError> {
        let item = queue(q)?.queue.peek().ok_or(Error::NotFound)?;
        write_out(out, item.0)
    })();
    status("tether_queue_peek", result)
}

/// Number of queued items, or -1 for an invalid handle
#[no_mangle]
pub extern "C" fn tether_queue_count(q: TetherHandle) -> isize {
    match queue(q) {
        Ok(q) => q.queue.len() as isize,
        Err(_) => -1,
    }
}

/// Shut a queue down, waiting up to `timeout` for it to drain
///
/// On success the creator's reference is released (once, however many
/// times this is called); the queue is destroyed when the last other
/// reference goes. Blocked producers fail with `ESHUTDOWN`; consumers keep
/// draining until the queue is empty.
///
/// # Returns
/// * 0 once the queue is empty and closed
/// * `ETIMEDOUT` if items remain; the queue keeps draining
#[no_mangle]
pub extern "C" fn tether_queue_shutdown(q: TetherHandle, timeout: c_double) -> c_int {
    let result = (|| -> Result<(), FfiError> {
        let h = handle(q)?;
        let cq = REGISTRY.get::<CQueue>(h)?;
        cq.queue.shutdown(Timeout::from_secs_f64(timeout))?;
        if !cq.released.swap(true, Ordering::AcqRel) {
            REGISTRY.discard(h)?;
        }
        Ok(())
    })();
    status("tether_queue_shutdown", result)
}

// ============================================================================
// Pools
// ============================================================================

/// A submitted work item
///
/// If the pool drops the item without running it, `disposer` (when given)
/// receives the argument. Items refused by `tether_pool_add` are never
/// disposed; the caller keeps the argument.
struct WorkItem {
    func: unsafe extern "C" fn(*mut c_void),
    arg: RawItem,
    disposer: TetherCallback,
    accepted: Arc<AtomicBool>,
    ran: bool,
}

impl WorkItem {
    fn run(mut self) {
        self.ran = true;
        unsafe { (self.func)(self.arg.0) }
    }
}

impl Drop for WorkItem {
    fn drop(&mut self) {
        if self.ran || !self.accepted.load(Ordering::Acquire) {
            return;
        }
        if let Some(dispose) = self.disposer {
            unsafe { dispose(self.arg.0) }
        }
    }
}

/// Create a thread pool
///
/// # Arguments
/// * `max_threads` - Worker cap; 0 means one per CPU
/// * `queue_limit` - Job queue limit, same convention as `tether_queue_create`
/// * `stack_size` - Worker stack size in bytes; 0 for the platform default
/// * `out` - Receives the new handle, holding the creator's reference
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tether_pool_create(
    max_threads: c_int,
    queue_limit: i64,
    stack_size: usize,
    out: *mut TetherHandle,
) -> c_int {
    let result = (|| -> Result<(), FfiError> {
        if out.is_null() {
            return Err(FfiError::Null("out-parameter"));
        }
        let defaults = PoolOptions::default();
        let max_threads = match max_threads {
            n if n < 0 => return Err(Error::InvalidArgument("max_threads").into()),
            0 => defaults.max_threads,
            n => n as usize,
        };
        let options = PoolOptions {
            max_threads,
            queue_limit: QueueLimit::from_raw(queue_limit),
            stack_size: (stack_size > 0).then_some(stack_size),
            ..defaults
        };
        let created = Pool::create(&REGISTRY, options)?;
        write_out(out, created.into_handle().as_usize())
    })();
    status("tether_pool_create", result)
}

/// Submit `func(arg)` to a pool
///
/// # Arguments
/// * `disposer` - Optional; called with `arg` if the accepted item is
///   dropped without running, which happens only when the pool is destroyed
///   with items still queued. With NULL such arguments are not released.
///
/// # Returns
/// * 0 once queued
/// * `ETIMEDOUT` if the queue stayed full for `timeout`
/// * `ESHUTDOWN` after `tether_pool_shutdown`
#[no_mangle]
pub extern "C" fn tether_pool_add(
    p: TetherHandle,
    func: TetherCallback,
    arg: *mut c_void,
    disposer: TetherCallback,
    timeout: c_double,
) -> c_int {
    let result = (|| -> Result<(), FfiError> {
        let func = func.ok_or(FfiError::Null("func"))?;
        let pool = pool(p)?;
        let accepted = Arc::new(AtomicBool::new(false));
        let item = WorkItem {
            func,
            arg: RawItem(arg),
            disposer,
            accepted: Arc::clone(&accepted),
            ran: false,
        };
        pool.add(move || item.run(), Timeout::from_secs_f64(timeout))?;
        accepted.store(true, Ordering::Release);
        Ok(())
    })();
    status("tether_pool_add", result)
}

/// Stop accepting work, run what is queued and wait for the workers to exit
///
/// The creator's reference is kept; release it with `tether_object_discard`.
/// Must not be called from one of the pool's own work items.
#[no_mangle]
pub extern "C" fn tether_pool_shutdown(p: TetherHandle, timeout: c_double) -> c_int {
    let result = pool(p).and_then(|pool| pool.shutdown(Timeout::from_secs_f64(timeout)));
    status("tether_pool_shutdown", result.map_err(FfiError::from))
}

// ============================================================================
// Timers
// ============================================================================

/// Schedule `func(arg)` on the scheduler thread
///
/// # Arguments
/// * `abstime` - Optional absolute time of the first firing
/// * `interval` - Optional period; with `abstime` NULL or zero the first
///   firing is one interval from now
/// * `out` - Receives the task handle
///
/// `func` runs on the shared scheduler thread and must not block.
///
/// # Safety
/// `abstime` and `interval` must each be NULL or valid for reads; `out`
/// must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tether_timer_schedule(
    abstime: *const TetherTimespec,
    interval: *const TetherTimespec,
    func: TetherCallback,
    arg: *mut c_void,
    out: *mut TetherHandle,
) -> c_int {
    let result = (|| -> Result<(), FfiError> {
        let func = func.ok_or(FfiError::Null("func"))?;
        if out.is_null() {
            return Err(FfiError::Null("out-parameter"));
        }
        let at = abstime.as_ref().map(|ts| Timespec::from(*ts));
        let interval = match interval.as_ref() {
            None => None,
            Some(ts) => {
                let ts = Timespec::from(*ts);
                if ts.sec < 0 {
                    return Err(Error::InvalidArgument("interval").into());
                }
                Some(Duration::new(ts.sec as u64, ts.nsec as u32))
            }
        };

        let task = scheduler()?.schedule(at, interval, RawItem(arg), move |_, arg| unsafe {
            func(arg.0)
        })?;
        write_out(out, task.as_handle().as_usize())
    })();
    status("tether_timer_schedule", result)
}

/// Cancel a scheduled task
///
/// # Returns
/// * 0 with the task's argument stored in `out_arg` (NULL when the task
///   cancelled itself or was cancelled while running)
/// * `ENOENT` if the task already fired or was already cancelled
///
/// # Safety
/// `out_arg` must be NULL or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tether_timer_cancel(task: TetherHandle, out_arg: *mut *mut c_void) -> c_int {
    let result = (|| -> Result<(), FfiError> {
        let task = TaskHandle::from_handle(handle(task)?);
        let arg = scheduler()?.cancel_as::<RawItem>(task)?;
        if !out_arg.is_null() {
            *out_arg = arg.map_or(ptr::null_mut(), |arg| arg.0);
        }
        Ok(())
    })();
    status("tether_timer_cancel", result)
}

/// Handle of the task whose callback is running, or 0 outside one
#[no_mangle]
pub extern "C" fn tether_timer_this() -> TetherHandle {
    SCHEDULER
        .get()
        .and_then(|s| s.current_task())
        .map_or(0, |task| task.as_handle().as_usize())
}

// ============================================================================
// Time
// ============================================================================

/// Fold nanosecond overflow or underflow into the seconds field
///
/// # Safety
/// `ts` must be valid for reads and writes.
#[no_mangle]
pub unsafe extern "C" fn tether_timespec_normalize(ts: *mut TetherTimespec) -> c_int {
    let Some(ts) = ts.as_mut() else {
        return libc::EINVAL;
    };
    *ts = Timespec::from(*ts).into();
    0
}

/// Current wall-clock time
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn tether_timespec_now(out: *mut TetherTimespec) -> c_int {
    status("tether_timespec_now", write_out(out, Timespec::now().into()))
}
