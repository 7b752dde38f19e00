use chrono::{DateTime, Utc};

/// Source of wall-clock time for the race model and the timer queue
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use super::Clock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::cell::Cell;
    use std::rc::Rc;

    /// Clock that only moves when told to. Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        now: Rc<Cell<DateTime<Utc>>>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::at(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
        }
    }

    impl ManualClock {
        pub fn at(now: DateTime<Utc>) -> Self {
            Self {
                now: Rc::new(Cell::new(now)),
            }
        }

        pub fn set(&self, now: DateTime<Utc>) {
            self.now.set(now);
        }

        pub fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }

        pub fn advance_millis(&self, millis: i64) {
            self.advance(Duration::milliseconds(millis));
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.now.get()
        }
    }
}
