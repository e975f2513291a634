//! API rate counter. Tracks call timestamps in a sliding one-minute
//! window rather than a wall-clock-minute bucket, so usage can't burst
//! right across a minute boundary and evade the limit.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

const WINDOW: Duration = Duration::seconds(60);

#[derive(Debug, Default)]
pub struct ApiRateCounter {
    calls: VecDeque<DateTime<Utc>>,
}

impl ApiRateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&mut self, now: DateTime<Utc>) {
        self.calls.push_back(now);
        self.evict_expired(now);
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        while let Some(&front) = self.calls.front() {
            if now - front > WINDOW {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Calls observed in the trailing 60 seconds from `now`.
    pub fn calls_in_window(&mut self, now: DateTime<Utc>) -> u32 {
        self.evict_expired(now);
        self.calls.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_expire_after_the_window() {
        let mut counter = ApiRateCounter::new();
        let t0 = Utc::now();
        for _ in 0..5 {
            counter.record_call(t0);
        }
        assert_eq!(counter.calls_in_window(t0), 5);
        assert_eq!(counter.calls_in_window(t0 + Duration::seconds(61)), 0);
    }

    #[test]
    fn sliding_window_does_not_reset_at_a_fixed_boundary() {
        // Unlike a wall-clock-minute counter, calls 40s apart both still
        // count at the 50s mark even though they straddle a minute tick.
        let mut counter = ApiRateCounter::new();
        let t0 = Utc::now();
        counter.record_call(t0);
        counter.record_call(t0 + Duration::seconds(40));
        assert_eq!(counter.calls_in_window(t0 + Duration::seconds(50)), 2);
    }
}
