use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Source of wall-clock time and delays.
///
/// Everything timer-driven in the app (autosave, search debounce, scroll
/// guard, auth cool-down) takes its notion of "now" from here so it can be
/// driven deterministically in tests.
#[async_trait(?Send)]
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserClock;

#[async_trait(?Send)]
impl Clock for BrowserClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        gloo_timers::future::TimeoutFuture::new(millis_to_u32(duration)).await;
    }
}

/// Trailing-edge debounce expressed as a deadline.
///
/// `trigger` pushes the deadline out; `poll` reports `true` exactly once after
/// the deadline has passed with no further triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<DateTime<Utc>>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn trigger(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let deadline = now + self.delay;
        self.deadline = Some(deadline);
        deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.deadline
            .map(|deadline| (deadline - now).max(Duration::zero()))
    }
}

pub fn millis_to_u32(duration: Duration) -> u32 {
    duration.num_milliseconds().clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Clock that only moves when told to. `sleep` advances it instantly.
    pub struct ManualClock {
        now: Cell<DateTime<Utc>>,
        sleeps: RefCell<Vec<Duration>>,
    }

    impl ManualClock {
        pub fn at_millis(millis: i64) -> Self {
            let start = DateTime::from_timestamp_millis(millis).unwrap();
            Self {
                now: Cell::new(start),
                sleeps: RefCell::new(Vec::new()),
            }
        }

        pub fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }

        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.borrow().clone()
        }
    }

    #[async_trait(?Send)]
    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.now.get()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
            self.advance(duration);
        }
    }
}
