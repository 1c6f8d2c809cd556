//! Trailing-window rate counter

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counts events over a sliding trailing window.
///
/// `incr` records an event, `rate` reports how many events landed inside
/// the window ending now. Used for the frames-per-second figure in the
/// info broadcast.
pub struct RateCounter {
    window: Duration,
    hits: Mutex<VecDeque<Instant>>,
}

impl RateCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            hits: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one event.
    pub fn incr(&self) {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap();
        Self::prune(&mut hits, now, self.window);
        hits.push_back(now);
    }

    /// Events observed in the trailing window.
    pub fn rate(&self) -> u64 {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap();
        Self::prune(&mut hits, now, self.window);
        hits.len() as u64
    }

    fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(front) = hits.front() {
            if now.duration_since(*front) > window {
                hits.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_events_in_window() {
        let counter = RateCounter::new(Duration::from_secs(1));
        for _ in 0..5 {
            counter.incr();
        }
        assert_eq!(counter.rate(), 5);
    }

    #[test]
    fn events_fall_out_of_the_window() {
        let counter = RateCounter::new(Duration::from_millis(30));
        counter.incr();
        counter.incr();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(counter.rate(), 0);
    }
}
