//! Cooperative deadline queue.
//!
//! Timers are kept in a min-heap keyed by `(deadline, seq)` with a map of live
//! actions as the source of truth. Cancelling only removes the map entry; the
//! stale heap key is discarded the next time it reaches the top. Actions run
//! on the thread that calls [`TimerQueue::run_due`], one at a time, with no
//! queue borrow held, so an action may schedule or cancel further timers.

use chrono::{DateTime, Duration, Utc};
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tracing::{debug, error, warn};

use crate::core::RaceManager;
use crate::timer::{Clock, TimerAction, TimerHandle, TimerService};

struct Inner {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, u64)>>,
    live: HashMap<u64, TimerAction>,
    next_seq: u64,
    accepting: bool,
}

impl Inner {
    /// Drop cancelled keys sitting on top of the heap
    fn discard_stale(&mut self) {
        while let Some(Reverse((_, seq))) = self.heap.peek() {
            if self.live.contains_key(seq) {
                break;
            }
            self.heap.pop();
        }
    }
}

/// Single-threaded timer service driven by the control loop
#[derive(Clone)]
pub struct TimerQueue {
    inner: Rc<RefCell<Inner>>,
    clock: Rc<dyn Clock>,
}

impl TimerQueue {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                heap: BinaryHeap::new(),
                live: HashMap::new(),
                next_seq: 0,
                accepting: true,
            })),
            clock,
        }
    }

    /// Number of armed timers
    pub fn pending(&self) -> usize {
        self.inner.borrow().live.len()
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.inner.borrow().live.contains_key(&handle.0)
    }

    /// Earliest armed deadline, if any
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let mut inner = self.inner.borrow_mut();
        inner.discard_stale();
        inner.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Time left until the earliest deadline, zero if already due
    pub fn time_until_next(&self) -> Option<std::time::Duration> {
        self.next_deadline().map(|deadline| {
            (deadline - self.clock.now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO)
        })
    }

    fn pop_due(&self) -> Option<TimerAction> {
        let now = self.clock.now();
        let mut inner = self.inner.borrow_mut();
        inner.discard_stale();
        match inner.heap.peek() {
            Some(Reverse((deadline, _))) if *deadline <= now => {}
            _ => return None,
        }
        let Reverse((_, seq)) = inner.heap.pop()?;
        inner.live.remove(&seq)
    }

    /// Run every action whose deadline has passed, in deadline order.
    ///
    /// A failing action is logged and does not stop the others.
    pub fn run_due(&self, race: &RaceManager) -> usize {
        let mut fired = 0;
        while let Some(action) = self.pop_due() {
            fired += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| action(race))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("timer action failed: {:#}", e),
                Err(_) => error!("timer action panicked"),
            }
        }
        fired
    }

    /// Stop accepting new timers and drop the outstanding ones
    pub fn shutdown(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.accepting = false;
        debug!("timer queue shutting down, dropping {} timers", inner.live.len());
        inner.heap.clear();
        inner.live.clear();
    }
}

impl TimerService for TimerQueue {
    fn schedule_action(&self, delay_millis: i64, action: TimerAction) -> TimerHandle {
        let deadline = self.clock.now() + Duration::milliseconds(delay_millis.max(0));
        let mut inner = self.inner.borrow_mut();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if inner.accepting {
            inner.heap.push(Reverse((deadline, seq)));
            inner.live.insert(seq, action);
        } else {
            debug!("timer queue is shut down, ignoring timer in {}ms", delay_millis);
        }
        TimerHandle(seq)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.inner.borrow_mut().live.remove(&handle.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SequenceTiming;
    use crate::timer::ManualClock;

    fn setup() -> (ManualClock, TimerQueue, RaceManager) {
        let clock = ManualClock::default();
        let timers = TimerQueue::new(Rc::new(clock.clone()));
        let race = RaceManager::new(SequenceTiming::default(), Rc::new(clock.clone())).unwrap();
        (clock, timers, race)
    }

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> impl FnOnce(&RaceManager) -> anyhow::Result<()> {
        let log = log.clone();
        move |_: &RaceManager| {
            log.borrow_mut().push(tag);
            Ok(())
        }
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let (clock, timers, race) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        timers.schedule(2000, recorder(&log, "late"));
        timers.schedule(1000, recorder(&log, "early"));
        timers.schedule(1000, recorder(&log, "early-second"));

        clock.advance_millis(999);
        assert_eq!(timers.run_due(&race), 0);

        clock.advance_millis(1);
        assert_eq!(timers.run_due(&race), 2);
        assert_eq!(*log.borrow(), vec!["early", "early-second"]);

        clock.advance_millis(1000);
        timers.run_due(&race);
        assert_eq!(*log.borrow(), vec!["early", "early-second", "late"]);
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (clock, timers, race) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        let cancelled = timers.schedule(500, recorder(&log, "cancelled"));
        let fired = timers.schedule(100, recorder(&log, "fired"));
        timers.cancel(cancelled);
        timers.cancel(cancelled);

        clock.advance_millis(1000);
        timers.run_due(&race);
        timers.cancel(fired);

        assert_eq!(*log.borrow(), vec!["fired"]);
        assert!(!timers.is_armed(cancelled));
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_failing_action_does_not_stop_others() {
        let (clock, timers, race) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        timers.schedule(10, |_: &RaceManager| anyhow::bail!("relay unplugged"));
        timers.schedule(20, recorder(&log, "after"));

        clock.advance_millis(50);
        assert_eq!(timers.run_due(&race), 2);
        assert_eq!(*log.borrow(), vec!["after"]);
    }

    #[test]
    fn test_action_can_reschedule() {
        let (clock, timers, race) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        let t = timers.clone();
        let l = log.clone();
        timers.schedule(500, move |_: &RaceManager| {
            l.borrow_mut().push("first");
            t.schedule(500, recorder(&l, "second"));
            Ok(())
        });

        clock.advance_millis(500);
        timers.run_due(&race);
        assert_eq!(timers.pending(), 1);
        assert_eq!(timers.time_until_next(), Some(std::time::Duration::from_millis(500)));
    }

    #[test]
    fn test_shutdown_rejects_new_timers() {
        let (clock, timers, race) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        timers.schedule(100, recorder(&log, "dropped"));
        timers.shutdown();
        timers.schedule(100, recorder(&log, "ignored"));

        clock.advance_millis(200);
        assert_eq!(timers.run_due(&race), 0);
        assert!(log.borrow().is_empty());
    }
}
