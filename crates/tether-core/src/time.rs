//! Time representation
//!
//! Absolute and relative times are `(seconds, nanoseconds)` pairs. Values are
//! kept normalized (`0 <= nsec < 1_000_000_000`) so that comparison reduces
//! to a signed nanosecond difference.
//!
//! All blocking calls share one timeout convention, captured by [`Timeout`]:
//! a negative value blocks forever, zero fails immediately, and a positive
//! value bounds the wait.

use std::cmp::Ordering;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Nanoseconds per second
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A `(seconds, nanoseconds)` pair
#[derive(Debug, Copy, Clone, Default)]
pub struct Timespec {
    /// Whole seconds
    pub sec: i64,
    /// Nanoseconds; in `[0, 1e9)` once normalized
    pub nsec: i64,
}

impl Timespec {
    /// The zero time, used as "unset"
    pub const ZERO: Timespec = Timespec { sec: 0, nsec: 0 };

    /// Build a normalized timespec
    pub fn new(sec: i64, nsec: i64) -> Self {
        Timespec { sec, nsec }.normalize()
    }

    /// Current wall-clock time since the Unix epoch
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => Self::from(since),
            Err(before) => {
                let d = before.duration();
                Timespec::new(-(d.as_secs() as i64), -(d.subsec_nanos() as i64))
            }
        }
    }

    /// Fold nanosecond overflow and underflow into the seconds field
    pub fn normalize(self) -> Self {
        let mut sec = self.sec.saturating_add(self.nsec.div_euclid(NANOS_PER_SEC));
        let nsec = self.nsec.rem_euclid(NANOS_PER_SEC);
        if sec == i64::MIN {
            sec = i64::MIN + 1;
        }
        Timespec { sec, nsec }
    }

    /// Whether this is the zero ("unset") time
    pub fn is_zero(&self) -> bool {
        let n = self.normalize();
        n.sec == 0 && n.nsec == 0
    }

    /// Total nanoseconds represented by this value
    pub fn as_nanos(&self) -> i128 {
        let n = self.normalize();
        n.sec as i128 * NANOS_PER_SEC as i128 + n.nsec as i128
    }

    /// Signed difference `self - other` in nanoseconds
    pub fn diff_nanos(&self, other: &Timespec) -> i128 {
        self.as_nanos() - other.as_nanos()
    }

    /// Add a relative duration, saturating at the largest representable time
    pub fn add(self, d: Duration) -> Self {
        let secs = i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
        Timespec::new(
            self.sec.saturating_add(secs),
            self.nsec + d.subsec_nanos() as i64,
        )
    }

    /// Time remaining from `now` until `self`, or `None` if already due
    pub fn until(&self, now: &Timespec) -> Option<Duration> {
        let diff = self.diff_nanos(now);
        if diff <= 0 {
            None
        } else {
            Some(Duration::from_nanos(diff.min(u64::MAX as i128) as u64))
        }
    }
}

impl From<Duration> for Timespec {
    fn from(d: Duration) -> Self {
        Timespec {
            sec: d.as_secs() as i64,
            nsec: d.subsec_nanos() as i64,
        }
    }
}

impl PartialEq for Timespec {
    fn eq(&self, other: &Self) -> bool {
        self.diff_nanos(other) == 0
    }
}

impl Eq for Timespec {}

impl PartialOrd for Timespec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timespec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.diff_nanos(other).cmp(&0)
    }
}

/// How long a blocking call may wait
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Timeout {
    /// Block until the condition is met (negative timeout)
    Forever,
    /// Never block (zero timeout)
    Immediate,
    /// Block for at most this long (positive timeout)
    After(Duration),
}

impl Timeout {
    /// Map the numeric convention: negative = forever, zero = immediate,
    /// positive = bounded seconds.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs < 0.0 {
            Timeout::Forever
        } else if secs == 0.0 {
            Timeout::Immediate
        } else {
            Timeout::After(Duration::from_secs_f64(secs))
        }
    }

    /// Shorthand for `Timeout::After(Duration::from_millis(ms))`
    pub fn millis(ms: u64) -> Self {
        if ms == 0 {
            Timeout::Immediate
        } else {
            Timeout::After(Duration::from_millis(ms))
        }
    }

    /// Absolute deadline for a wait starting now
    ///
    /// Returns `None` for [`Timeout::Forever`].
    pub fn deadline(self) -> Option<Instant> {
        match self {
            Timeout::Forever => None,
            Timeout::Immediate => Some(Instant::now()),
            Timeout::After(d) => Some(Instant::now() + d),
        }
    }

    /// What is left of this timeout for a wait that began at `started`
    pub fn remaining(self, started: Instant) -> Self {
        match self {
            Timeout::After(d) => match d.checked_sub(started.elapsed()) {
                Some(left) if !left.is_zero() => Timeout::After(left),
                _ => Timeout::Immediate,
            },
            other => other,
        }
    }

    /// Whether the caller must not wait at all
    pub fn is_immediate(self) -> bool {
        matches!(self, Timeout::Immediate)
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Timeout::Immediate
        } else {
            Timeout::After(d)
        }
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Timeout::Forever, Timeout::from)
    }
}
