use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling window of input timestamps.
///
/// Timestamps are appended in non-decreasing order, so eviction only ever
/// pops from the front and stops at the first entry still inside the window.
#[derive(Debug, Default)]
pub struct ActivityWindow {
    events: VecDeque<Instant>,
}

impl ActivityWindow {
    /// Events from different devices can arrive slightly out of order; a
    /// timestamp older than the newest entry is clamped up to it.
    pub fn record(&mut self, at: Instant) {
        let at = self.events.back().map_or(at, |&newest| at.max(newest));
        self.events.push_back(at);
    }

    /// Drop every entry older than `window` relative to `now`.
    pub fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.events.front() {
            if now.saturating_duration_since(oldest) > window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn count(&mut self, now: Instant, window: Duration) -> usize {
        self.evict(now, window);
        self.events.len()
    }
}

/// Minimum spacing between counted mouse-move events, so one continuous
/// gesture does not flood the window.
#[derive(Debug)]
pub struct MoveThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl MoveThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Returns true if a move at `now` should count as activity.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
