use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of the reactor timebase.
///
/// Implementations report elapsed milliseconds since the origin set by
/// [`init`](Self::init). The reported value must be monotone non-decreasing:
/// the whole timer registry is ordered on it.
pub trait MonotonicClock: Send + Sync {
    /// Resets the clock origin. Called by the reactor on startup.
    fn init(&self);

    /// Returns the number of milliseconds elapsed since the last `init`.
    fn now_ms(&self) -> u64;
}

/// Monotonic clock backed by [`Instant`].
///
/// This is the default timebase: `Instant` is monotonic by construction, so
/// no fix-up logic is needed.
pub struct SystemClock {
    origin: Mutex<Option<Instant>>,
}

impl SystemClock {
    /// Creates a clock with no origin; `now_ms` reports zero until `init`.
    pub fn new() -> Self {
        SystemClock {
            origin: Mutex::new(None),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl MonotonicClock for SystemClock {
    fn init(&self) {
        *self.origin.lock().unwrap() = Some(Instant::now());
    }

    fn now_ms(&self) -> u64 {
        self.origin
            .lock()
            .unwrap()
            .map(|origin| origin.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Monotonic clock derived from the wall clock.
///
/// The wall clock is susceptible to step changes (NTP corrections, manual
/// adjustment). This source works around them by maintaining an offset which
/// absorbs any observed backward jump, and any forward jump larger than
/// twice the polling interval. A background poller samples the clock at the
/// polling interval so that the interval between observations, and therefore
/// the error absorbed per step, stays bounded.
///
/// Prefer [`SystemClock`] unless the timebase must track the wall clock.
pub struct AdjustedClock {
    inner: Arc<AdjustedState>,
    poller_started: AtomicBool,
}

struct AdjustedState {
    poll_interval_ms: i64,
    fixup: Mutex<Fixup>,
}

struct Fixup {
    offset_ms: i64,
    last_read_ms: i64,
}

impl AdjustedClock {
    /// Creates an adjusted clock with the default 1000 ms polling interval.
    pub fn new() -> Self {
        AdjustedClock::with_poll_interval(Duration::from_millis(1000))
    }

    /// Creates an adjusted clock with the given polling interval, which also
    /// bounds the forward jump tolerated before fix-up (twice the interval).
    pub fn with_poll_interval(interval: Duration) -> Self {
        AdjustedClock {
            inner: Arc::new(AdjustedState {
                poll_interval_ms: interval.as_millis().max(1) as i64,
                fixup: Mutex::new(Fixup {
                    offset_ms: 0,
                    last_read_ms: 0,
                }),
            }),
            poller_started: AtomicBool::new(false),
        }
    }
}

impl Default for AdjustedClock {
    fn default() -> Self {
        AdjustedClock::new()
    }
}

impl MonotonicClock for AdjustedClock {
    fn init(&self) {
        {
            let mut fixup = self.inner.fixup.lock().unwrap();
            fixup.last_read_ms = 0;
            fixup.offset_ms = wall_ms();
        }

        // A single poller serves the lifetime of the clock; it holds a weak
        // reference and exits once the clock is dropped.
        if !self.poller_started.swap(true, Ordering::AcqRel) {
            let state = Arc::downgrade(&self.inner);
            let interval = Duration::from_millis(self.inner.poll_interval_ms as u64);
            thread::Builder::new()
                .name("reflexis-clock".into())
                .spawn(move || run_poller(state, interval))
                .expect("failed to spawn clock poller thread");
        }
    }

    fn now_ms(&self) -> u64 {
        self.inner.sample().max(0) as u64
    }
}

impl AdjustedState {
    /// Reads the wall clock and folds any discontinuity into the offset.
    fn sample(&self) -> i64 {
        let mut fixup = self.fixup.lock().unwrap();
        let mut current = wall_ms() - fixup.offset_ms;
        let delta = current - fixup.last_read_ms;

        if delta < 0 {
            // The wall clock went backwards; freeze until it catches up.
            current = fixup.last_read_ms;
            fixup.offset_ms += delta;
        } else if delta > 2 * self.poll_interval_ms {
            // The wall clock jumped forwards; advance by one poll interval
            // and absorb the rest.
            current = fixup.last_read_ms + self.poll_interval_ms;
            fixup.offset_ms += delta - self.poll_interval_ms;
        }

        fixup.last_read_ms = current;
        current
    }
}

fn run_poller(state: Weak<AdjustedState>, interval: Duration) {
    loop {
        thread::sleep(interval);
        match state.upgrade() {
            Some(state) => {
                state.sample();
            }
            None => break,
        }
    }
}

fn wall_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
