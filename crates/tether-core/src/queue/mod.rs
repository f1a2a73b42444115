//! Synchronized queue
//!
//! A growable, shrinkable circular queue guarded by one mutex and one
//! condition variable shared by producers and consumers. Because both
//! directions wait on the same condition variable, every wakeup is a
//! broadcast.
//!
//! ## Limits
//!
//! | limit          | behavior                                                  |
//! |----------------|-----------------------------------------------------------|
//! | `Fixed`        | capacity pinned at the minimum, producers block when full |
//! | `Unbounded`    | capacity doubles whenever the buffer fills                |
//! | `Bounded(n)`   | capacity doubles up to `n`, producers block at `n` items  |
//!
//! Capacity halves again once occupancy drops below a quarter, never below
//! the configured minimum.
//!
//! ## Shutdown
//!
//! `shutdown` first moves the queue to *draining*: producers are refused and
//! woken, consumers keep receiving items. Once the queue is empty it becomes
//! *closed* and every waiting consumer receives [`Error::Shutdown`]. A
//! shutdown whose timeout expires before the queue empties returns
//! [`Error::TimedOut`] and leaves the queue draining; calling `shutdown`
//! again later completes it.

mod ring;

use crate::error::{Error, Rejected, Result};
use crate::handle::{Kind, Ref, Registry, Resource};
use crate::time::Timeout;
use parking_lot::{Condvar, Mutex, MutexGuard};
use ring::Ring;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Default minimum capacity of a queue buffer
pub const DEFAULT_MIN_CAPACITY: usize = 16;

/// Largest capacity an unbounded queue may grow to
const MAX_CAPACITY: usize = 1 << (usize::BITS - 2);

/// Which end of the queue an item is added to
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum End {
    /// Head of the queue; the item is popped next
    Front,
    /// Tail of the queue; FIFO order
    Back,
}

/// Occupancy limit of a queue
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum QueueLimit {
    /// Capacity fixed at the minimum; never reallocates
    Fixed,
    /// Grow without bound
    Unbounded,
    /// Block producers once this many items are queued
    Bounded(usize),
}

impl QueueLimit {
    /// Map the numeric convention: negative = fixed, zero = unbounded,
    /// positive = bounded.
    pub fn from_raw(limit: i64) -> Self {
        match limit {
            l if l < 0 => QueueLimit::Fixed,
            0 => QueueLimit::Unbounded,
            l => QueueLimit::Bounded(l as usize),
        }
    }

    /// Inverse of [`QueueLimit::from_raw`]
    pub fn as_raw(self) -> i64 {
        match self {
            QueueLimit::Fixed => -1,
            QueueLimit::Unbounded => 0,
            QueueLimit::Bounded(n) => n as i64,
        }
    }
}

impl Default for QueueLimit {
    fn default() -> Self {
        QueueLimit::Unbounded
    }
}

impl From<i64> for QueueLimit {
    fn from(limit: i64) -> Self {
        QueueLimit::from_raw(limit)
    }
}

impl From<QueueLimit> for i64 {
    fn from(limit: QueueLimit) -> Self {
        limit.as_raw()
    }
}

/// Queue construction options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Occupancy limit
    pub limit: QueueLimit,
    /// Smallest buffer capacity (rounded up to a power of two)
    pub min_capacity: usize,
}

impl QueueOptions {
    /// Options with the given limit and the default minimum capacity
    pub fn with_limit(limit: QueueLimit) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            limit: QueueLimit::Unbounded,
            min_capacity: DEFAULT_MIN_CAPACITY,
        }
    }
}

/// Callback applied to items still queued when the queue is destroyed
pub type Destroyer<T> = Box<dyn Fn(T) + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Open,
    Draining,
    Closed,
}

struct State<T, X> {
    ring: Ring<T>,
    phase: Phase,
    ext: X,
}

/// Synchronized circular queue
///
/// `X` is extra state kept under the queue's own lock, for types that
/// compose a queue and must update their bookkeeping atomically with it.
pub struct Queue<T, X = ()> {
    state: Mutex<State<T, X>>,
    cond: Condvar,
    waiters: AtomicUsize,
    limit: QueueLimit,
    min_capacity: usize,
    max_capacity: usize,
    destroyer: Option<Destroyer<T>>,
}

/// Counts a thread as waiting for as long as it is parked, including when
/// it unwinds out of the wait.
struct WaiterGuard<'a>(&'a AtomicUsize);

impl<'a> WaiterGuard<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        WaiterGuard(count)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

impl<T> Queue<T> {
    /// Create a standalone queue
    pub fn new(options: QueueOptions) -> Result<Self> {
        Queue::with_ext(options, ())
    }

    /// Create a queue and register it
    pub fn create(registry: &Registry, options: QueueOptions) -> Result<Ref<Self>>
    where
        T: Send + 'static,
    {
        let queue = Queue::new(options)?;
        registry.create(queue)
    }
}

impl<T, X> Queue<T, X> {
    /// Create a queue carrying extension state `ext`
    pub fn with_ext(options: QueueOptions, ext: X) -> Result<Self> {
        let min_capacity = options.min_capacity.max(1).next_power_of_two();
        let max_capacity = match options.limit {
            QueueLimit::Fixed => min_capacity,
            QueueLimit::Unbounded => MAX_CAPACITY,
            QueueLimit::Bounded(0) => return Err(Error::InvalidArgument("limit")),
            QueueLimit::Bounded(n) => n
                .checked_next_power_of_two()
                .ok_or(Error::InvalidArgument("limit"))?
                .max(min_capacity),
        };

        Ok(Self {
            state: Mutex::new(State {
                ring: Ring::with_capacity(min_capacity)?,
                phase: Phase::Open,
                ext,
            }),
            cond: Condvar::new(),
            waiters: AtomicUsize::new(0),
            limit: options.limit,
            min_capacity,
            max_capacity,
            destroyer: None,
        })
    }

    /// Install the callback applied to leftover items on destruction
    ///
    /// The destroyer must not block and must not use this queue.
    pub fn with_destroyer(mut self, destroyer: impl Fn(T) + Send + Sync + 'static) -> Self {
        self.destroyer = Some(Box::new(destroyer));
        self
    }

    /// Add an item at the tail
    pub fn add(&self, item: T, timeout: Timeout) -> std::result::Result<(), Rejected<T>> {
        self.enqueue(item, timeout, End::Back)
    }

    /// Add an item at the head
    pub fn push(&self, item: T, timeout: Timeout) -> std::result::Result<(), Rejected<T>> {
        self.enqueue(item, timeout, End::Front)
    }

    /// Add an item at either end, waiting for space if the queue is at its limit
    pub fn enqueue(
        &self,
        item: T,
        timeout: Timeout,
        end: End,
    ) -> std::result::Result<(), Rejected<T>> {
        self.enqueue_with(item, timeout, end, |_| ())
    }

    /// Like [`Queue::enqueue`], then run `then` on the extension state while
    /// the queue lock is still held.
    pub fn enqueue_with<R>(
        &self,
        item: T,
        timeout: Timeout,
        end: End,
        then: impl FnOnce(&mut X) -> R,
    ) -> std::result::Result<R, Rejected<T>> {
        self.try_enqueue_with(item, timeout, end, |ext| Ok(then(ext)))
    }

    /// Like [`Queue::enqueue_with`], but `then` may refuse the item
    ///
    /// A refused item is taken back out before the lock is released, so no
    /// consumer ever sees it, and is returned with `then`'s error.
    pub fn try_enqueue_with<R>(
        &self,
        item: T,
        timeout: Timeout,
        end: End,
        then: impl FnOnce(&mut X) -> Result<R>,
    ) -> std::result::Result<R, Rejected<T>> {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();

        loop {
            if state.phase != Phase::Open {
                return Err(Rejected::new(Error::Shutdown, item));
            }
            if !self.at_limit(&state) {
                break;
            }
            if expired(deadline) {
                return Err(Rejected::new(Error::TimedOut, item));
            }
            self.wait(&mut state, deadline);
        }

        if state.ring.is_full() {
            let capacity = state.ring.capacity();
            let grown = match capacity.checked_mul(2) {
                Some(c) if c <= self.max_capacity => state.ring.resize(c),
                _ => Err(Error::Exhausted),
            };
            if let Err(e) = grown {
                return Err(Rejected::new(e, item));
            }
        }

        let was_empty = state.ring.is_empty();
        match end {
            End::Back => state.ring.push_back(item),
            End::Front => state.ring.push_front(item),
        }

        match then(&mut state.ext) {
            Ok(r) => {
                if was_empty {
                    self.cond.notify_all();
                }
                Ok(r)
            }
            Err(error) => {
                let withdrawn = match end {
                    End::Back => state.ring.pop_back(),
                    End::Front => state.ring.pop_front(),
                };
                let Some(item) = withdrawn else {
                    unreachable!("item pushed under the lock is gone");
                };
                Err(Rejected::new(error, item))
            }
        }
    }

    /// Remove the head item, waiting while the queue is empty
    pub fn pop(&self, timeout: Timeout) -> Result<T> {
        self.dequeue(timeout)
    }

    /// Remove the head item, waiting while the queue is empty
    pub fn dequeue(&self, timeout: Timeout) -> Result<T> {
        self.dequeue_with(timeout, |_, _| ()).0
    }

    /// Like [`Queue::dequeue`], then run `then` on the extension state and
    /// the outcome while the queue lock is still held.
    pub fn dequeue_with<R>(
        &self,
        timeout: Timeout,
        then: impl FnOnce(&mut X, &Result<T>) -> R,
    ) -> (Result<T>, R) {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();

        let result = loop {
            if !state.ring.is_empty() {
                let was_at_limit = self.at_limit(&state);
                let item = state.ring.pop_front();
                if was_at_limit || (state.ring.is_empty() && state.phase == Phase::Draining) {
                    self.cond.notify_all();
                }
                self.maybe_shrink(&mut state);
                break item.ok_or(Error::NotFound);
            }
            if state.phase == Phase::Closed {
                break Err(Error::Shutdown);
            }
            if expired(deadline) {
                break Err(Error::TimedOut);
            }
            self.wait(&mut state, deadline);
        };

        let extra = then(&mut state.ext, &result);
        (result, extra)
    }

    /// Clone of the head item, if any
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.peek_with(T::clone)
    }

    /// Inspect the head item under the lock
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.state.lock().ring.front().map(f)
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.state.lock().ring.len()
    }

    /// Whether the queue holds no items
    pub fn is_empty(&self) -> bool {
        self.state.lock().ring.is_empty()
    }

    /// Current buffer capacity
    pub fn capacity(&self) -> usize {
        self.state.lock().ring.capacity()
    }

    /// Occupancy limit
    pub fn limit(&self) -> QueueLimit {
        self.limit
    }

    /// Threads currently parked on this queue
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }

    /// Whether shutdown has started
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().phase != Phase::Open
    }

    /// Whether shutdown has completed
    pub fn is_closed(&self) -> bool {
        self.state.lock().phase == Phase::Closed
    }

    /// Shut the queue down, waiting up to `timeout` for it to drain
    ///
    /// Returns `Ok(())` once the queue is empty and closed (immediately if it
    /// already was), or [`Error::TimedOut`] if items remain when the timeout
    /// expires.
    pub fn shutdown(&self, timeout: Timeout) -> Result<()> {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();

        match state.phase {
            Phase::Closed => return Ok(()),
            Phase::Open => {
                state.phase = Phase::Draining;
                self.cond.notify_all();
                tracing::debug!(remaining = state.ring.len(), "queue draining");
            }
            Phase::Draining => {}
        }

        loop {
            if state.ring.is_empty() {
                state.phase = Phase::Closed;
                self.cond.notify_all();
                tracing::debug!("queue closed");
                return Ok(());
            }
            if expired(deadline) {
                return Err(Error::TimedOut);
            }
            self.wait(&mut state, deadline);
        }
    }

    /// Run `f` on the extension state under the queue lock and wake every
    /// waiter afterwards.
    pub fn update_ext<R>(&self, f: impl FnOnce(&mut X) -> R) -> R {
        let mut state = self.state.lock();
        let r = f(&mut state.ext);
        self.cond.notify_all();
        r
    }

    /// Wake every thread parked on this queue
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.cond.notify_all();
    }

    /// Read the extension state under the queue lock
    pub fn read_ext<R>(&self, f: impl FnOnce(&X) -> R) -> R {
        f(&self.state.lock().ext)
    }

    /// Wait until `ready` holds for the extension state
    pub fn wait_ext(&self, timeout: Timeout, mut ready: impl FnMut(&X) -> bool) -> Result<()> {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();
        loop {
            if ready(&state.ext) {
                return Ok(());
            }
            if expired(deadline) {
                return Err(Error::TimedOut);
            }
            self.wait(&mut state, deadline);
        }
    }

    fn at_limit(&self, state: &State<T, X>) -> bool {
        let len = state.ring.len();
        match self.limit {
            QueueLimit::Fixed => len >= state.ring.capacity(),
            QueueLimit::Unbounded => len >= self.max_capacity,
            QueueLimit::Bounded(n) => len >= n,
        }
    }

    fn maybe_shrink(&self, state: &mut State<T, X>) {
        let capacity = state.ring.capacity();
        let half = capacity / 2;
        if half >= self.min_capacity && state.ring.len() < capacity / 4 {
            // Keeping the larger buffer is always safe
            let _ = state.ring.resize(half);
        }
    }

    fn wait(&self, state: &mut MutexGuard<'_, State<T, X>>, deadline: Option<Instant>) {
        let _waiter = WaiterGuard::enter(&self.waiters);
        match deadline {
            None => self.cond.wait(state),
            Some(deadline) => {
                let _ = self.cond.wait_until(state, deadline);
            }
        }
    }
}

impl<T, X> Drop for Queue<T, X> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let leftover = state.ring.len();
        if leftover > 0 {
            tracing::debug!(leftover, "destroying queue with queued items");
        }
        match &self.destroyer {
            Some(destroyer) => state.ring.drain().for_each(|item| destroyer(item)),
            None => state.ring.drain().for_each(drop),
        }
    }
}

impl<T, X> Resource for Queue<T, X>
where
    T: Send + 'static,
    X: Send + 'static,
{
    fn kind(&self) -> Kind {
        Kind::Queue
    }
}

impl<T, X> fmt::Debug for Queue<T, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Queue")
            .field("len", &state.ring.len())
            .field("capacity", &state.ring.capacity())
            .field("limit", &self.limit)
            .field("phase", &state.phase)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn unbounded() -> Queue<u32> {
        Queue::new(QueueOptions {
            limit: QueueLimit::Unbounded,
            min_capacity: 4,
        })
        .unwrap()
    }

    #[test]
    fn test_fifo_at_tail() {
        let q = unbounded();
        for c in ['a', 'b', 'c'] {
            q.add(c as u32, Timeout::Immediate).unwrap();
        }
        let popped: Vec<_> = (0..3).map(|_| q.pop(Timeout::Immediate).unwrap()).collect();
        assert_eq!(popped, vec!['a' as u32, 'b' as u32, 'c' as u32]);
    }

    #[test]
    fn test_lifo_at_head() {
        let q = unbounded();
        for c in ['a', 'b', 'c'] {
            q.push(c as u32, Timeout::Immediate).unwrap();
        }
        let popped: Vec<_> = (0..3).map(|_| q.pop(Timeout::Immediate).unwrap()).collect();
        assert_eq!(popped, vec!['c' as u32, 'b' as u32, 'a' as u32]);
    }

    #[test]
    fn test_pop_empty_times_out() {
        let q = unbounded();
        assert_eq!(q.pop(Timeout::Immediate), Err(Error::TimedOut));
        let start = Instant::now();
        assert_eq!(q.pop(Timeout::millis(30)), Err(Error::TimedOut));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_grows_and_shrinks() {
        let q = unbounded();
        assert_eq!(q.capacity(), 4);
        for i in 0..100 {
            q.add(i, Timeout::Immediate).unwrap();
        }
        assert_eq!(q.capacity(), 128);
        for _ in 0..98 {
            q.pop(Timeout::Immediate).unwrap();
        }
        assert!(q.capacity() < 128);
        assert!(q.capacity() >= 4);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(Timeout::Immediate), Ok(98));
    }

    #[test]
    fn test_fixed_limit_never_reallocates() {
        let q: Queue<u32> = Queue::new(QueueOptions {
            limit: QueueLimit::Fixed,
            min_capacity: 4,
        })
        .unwrap();
        for i in 0..4 {
            q.add(i, Timeout::Immediate).unwrap();
        }
        let rejected = q.add(99, Timeout::Immediate).unwrap_err();
        assert_eq!(rejected.error, Error::TimedOut);
        assert_eq!(rejected.into_inner(), 99);
        assert_eq!(q.capacity(), 4);
    }

    #[test]
    fn test_bounded_blocks_until_space() {
        let q = Arc::new(
            Queue::new(QueueOptions {
                limit: QueueLimit::Bounded(2),
                min_capacity: 2,
            })
            .unwrap(),
        );
        q.add(1u32, Timeout::Immediate).unwrap();
        q.add(2, Timeout::Immediate).unwrap();

        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                q.pop(Timeout::Forever).unwrap()
            })
        };

        q.add(3, Timeout::Forever).unwrap();
        assert_eq!(consumer.join().unwrap(), 1);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_blocked_consumer_wakes_on_add() {
        let q = Arc::new(unbounded());
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.pop(Timeout::Forever))
        };
        while q.waiters() == 0 {
            thread::yield_now();
        }
        q.add(7, Timeout::Immediate).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(7));
        assert_eq!(q.waiters(), 0);
    }

    #[test]
    fn test_shutdown_refuses_producers() {
        let q = unbounded();
        q.shutdown(Timeout::Immediate).unwrap();
        assert!(q.is_closed());
        let rejected = q.add(1, Timeout::Forever).unwrap_err();
        assert_eq!(rejected.error, Error::Shutdown);
        assert_eq!(q.pop(Timeout::Forever), Err(Error::Shutdown));
    }

    #[test]
    fn test_shutdown_wakes_blocked_producer() {
        let q = Arc::new(
            Queue::new(QueueOptions {
                limit: QueueLimit::Bounded(1),
                min_capacity: 1,
            })
            .unwrap(),
        );
        q.add(1u32, Timeout::Immediate).unwrap();
        let producer = {
            let q = q.clone();
            thread::spawn(move || q.add(2, Timeout::Forever).map_err(|r| r.error))
        };
        while q.waiters() == 0 {
            thread::yield_now();
        }
        assert_eq!(q.shutdown(Timeout::Immediate), Err(Error::TimedOut));
        assert_eq!(producer.join().unwrap(), Err(Error::Shutdown));
    }

    #[test]
    fn test_draining_consumers_still_receive_items() {
        let q = unbounded();
        q.add(1, Timeout::Immediate).unwrap();
        q.add(2, Timeout::Immediate).unwrap();
        assert_eq!(q.shutdown(Timeout::Immediate), Err(Error::TimedOut));
        assert!(q.is_shutdown());
        assert!(!q.is_closed());
        assert_eq!(q.pop(Timeout::Immediate), Ok(1));
        assert_eq!(q.pop(Timeout::Immediate), Ok(2));
        // Empty but not yet closed: a consumer still just times out
        assert_eq!(q.pop(Timeout::Immediate), Err(Error::TimedOut));
        q.shutdown(Timeout::Immediate).unwrap();
        assert_eq!(q.pop(Timeout::Immediate), Err(Error::Shutdown));
    }

    #[test]
    fn test_shutdown_waits_for_consumer_to_drain() {
        let q = Arc::new(unbounded());
        for i in 0..10 {
            q.add(i, Timeout::Immediate).unwrap();
        }
        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Ok(v) = q.pop(Timeout::Forever) {
                    seen.push(v);
                }
                seen
            })
        };
        q.shutdown(Timeout::Forever).unwrap();
        assert_eq!(consumer.join().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_destroyer_sees_leftovers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let q = {
            let seen = seen.clone();
            unbounded().with_destroyer(move |item| seen.lock().push(item))
        };
        q.add(1, Timeout::Immediate).unwrap();
        q.add(2, Timeout::Immediate).unwrap();
        drop(q);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let q = unbounded();
        assert_eq!(q.peek(), None);
        q.add(5, Timeout::Immediate).unwrap();
        assert_eq!(q.peek(), Some(5));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_extension_updated_under_lock() {
        let q: Queue<u32, usize> = Queue::with_ext(QueueOptions::default(), 0).unwrap();
        let total = q
            .enqueue_with(1, Timeout::Immediate, End::Back, |n| {
                *n += 1;
                *n
            })
            .unwrap();
        assert_eq!(total, 1);
        let (item, seen) = q.dequeue_with(Timeout::Immediate, |n, r| {
            if r.is_ok() {
                *n -= 1;
            }
            *n
        });
        assert_eq!(item, Ok(1));
        assert_eq!(seen, 0);
    }

    #[test]
    fn test_refused_item_is_withdrawn() {
        let q = unbounded();
        q.add(1, Timeout::Immediate).unwrap();
        q.add(2, Timeout::Immediate).unwrap();

        for end in [End::Back, End::Front] {
            let rejected = q
                .try_enqueue_with(7, Timeout::Immediate, end, |_| Err::<(), _>(Error::Exhausted))
                .unwrap_err();
            assert_eq!(rejected.error, Error::Exhausted);
            assert_eq!(rejected.into_inner(), 7);
        }

        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(Timeout::Immediate), Ok(1));
        assert_eq!(q.pop(Timeout::Immediate), Ok(2));
    }

    #[test]
    fn test_registered_queue_kind() {
        let registry = Registry::new();
        let q = Queue::<u32>::create(&registry, QueueOptions::default()).unwrap();
        assert_eq!(registry.kind_of(q.handle()), Some(Kind::Queue));
        q.add(3, Timeout::Immediate).unwrap();
        let again = registry.get::<Queue<u32>>(q.handle()).unwrap();
        assert_eq!(again.pop(Timeout::Immediate), Ok(3));
    }

    #[test]
    fn test_zero_bound_is_invalid() {
        let err = Queue::<u32>::new(QueueOptions::with_limit(QueueLimit::Bounded(0))).unwrap_err();
        assert_eq!(err, Error::InvalidArgument("limit"));
    }
}
