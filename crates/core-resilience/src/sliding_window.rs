//! Sliding-window request counter
//!
//! A hard cap on requests within any trailing window, useful next to the
//! token budget when an upstream publishes a "N requests per T" quota rather
//! than a sustained rate. Unlike the budget it has no burst credit: a slot
//! frees up exactly `window` after it was used.
//!
//! # Example
//!
//! ```
//! use tollgate_core_resilience::SlidingWindowCounter;
//! use std::time::Duration;
//!
//! let counter = SlidingWindowCounter::new(Duration::from_secs(10), 5);
//! assert!(counter.record(3));
//! assert!(!counter.record(3)); // would exceed 5
//! assert_eq!(counter.available(), 2);
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct WindowState {
    /// (recorded at, request count), oldest first
    entries: VecDeque<(Instant, u64)>,
    in_window: u64,
}

impl WindowState {
    fn expire(&mut self, now: Instant, window: Duration) {
        while let Some(&(at, count)) = self.entries.front() {
            if now.saturating_duration_since(at) < window {
                break;
            }
            self.entries.pop_front();
            self.in_window -= count;
        }
    }
}

/// Thread-safe counter of requests within a trailing time window
#[derive(Debug)]
pub struct SlidingWindowCounter {
    window: Duration,
    max_requests: u64,
    state: Mutex<WindowState>,
}

impl SlidingWindowCounter {
    pub fn new(window: Duration, max_requests: u64) -> Self {
        Self {
            window,
            max_requests,
            state: Mutex::new(WindowState {
                entries: VecDeque::new(),
                in_window: 0,
            }),
        }
    }

    /// Record `count` requests if they fit in the current window.
    ///
    /// All-or-nothing: on `false` nothing is recorded.
    pub fn record(&self, count: u64) -> bool {
        if count == 0 {
            return true;
        }

        let now = Instant::now();
        let mut state = self.state.lock();
        state.expire(now, self.window);

        match state.in_window.checked_add(count) {
            Some(total) if total <= self.max_requests => {
                state.in_window = total;
                state.entries.push_back((now, count));
                true
            }
            _ => false,
        }
    }

    /// Requests that could still be recorded right now
    pub fn available(&self) -> u64 {
        let mut state = self.state.lock();
        state.expire(Instant::now(), self.window);
        self.max_requests.saturating_sub(state.in_window)
    }

    /// Time until the oldest recorded request leaves the window
    pub fn time_until_slot(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.expire(now, self.window);

        if state.in_window < self.max_requests {
            return Duration::ZERO;
        }
        state
            .entries
            .front()
            .map(|&(at, _)| self.window.saturating_sub(now.saturating_duration_since(at)))
            .unwrap_or(Duration::ZERO)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.in_window = 0;
    }
}
