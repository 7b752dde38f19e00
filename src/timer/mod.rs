pub mod clock;
pub mod queue;

pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub use clock::ManualClock;
pub use queue::TimerQueue;

use crate::core::RaceManager;

/// Work run when a timer fires. Gets a read-only view of the race.
pub type TimerAction = Box<dyn FnOnce(&RaceManager) -> anyhow::Result<()>>;

/// Opaque handle returned by [`TimerService::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub(crate) u64);

/// "Run this after N milliseconds" with cancellable handles.
///
/// Delays are real wall-clock milliseconds measured from the call; callers
/// apply any time acceleration before scheduling. Cancelling a timer that
/// already fired or was already cancelled is a no-op.
pub trait TimerService {
    fn schedule_action(&self, delay_millis: i64, action: TimerAction) -> TimerHandle;

    fn cancel(&self, handle: TimerHandle);

    fn schedule<F>(&self, delay_millis: i64, action: F) -> TimerHandle
    where
        F: FnOnce(&RaceManager) -> anyhow::Result<()> + 'static,
        Self: Sized,
    {
        self.schedule_action(delay_millis, Box::new(action))
    }
}
