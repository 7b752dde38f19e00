//! # Change notification bus
//!
//! [`ChangeBus`] is the in-process publish/subscribe channel owned by the
//! [`RaceManager`]. Controllers subscribe to the events they care about, or to
//! every event by passing `None`.
//!
//! ## Rules
//! - Delivery is synchronous, on the publisher's thread, in subscription order.
//! - Subscribers only get a shared view of the race; there is no path back
//!   into the model from a notification.
//! - Each invocation is isolated: an error or a panic in one subscriber is
//!   logged and the remaining subscribers still run.

use std::panic::{self, AssertUnwindSafe};
use tracing::{error, trace, warn};

use crate::core::{Finish, FinishId, Fleet, FleetId, RaceManager};

/// A state change published by the race manager
#[derive(Debug, Clone, PartialEq)]
pub enum RaceEvent {
    FleetAdded(FleetId),
    /// Carries the removed fleet since it is no longer reachable through the manager
    FleetRemoved(Fleet),
    FleetChanged(FleetId),
    FinishAdded(FinishId),
    FinishRemoved(Finish),
    FinishChanged(FinishId),
    SequenceStartedWithWarning,
    SequenceStartedWithoutWarning,
    /// The recalled fleet, already rescheduled
    GeneralRecall(FleetId),
    StartSequenceReset,
}

/// Event names used for subscription filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FleetAdded,
    FleetRemoved,
    FleetChanged,
    FinishAdded,
    FinishRemoved,
    FinishChanged,
    SequenceStartedWithWarning,
    SequenceStartedWithoutWarning,
    GeneralRecall,
    StartSequenceReset,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FleetAdded => "fleetAdded",
            EventKind::FleetRemoved => "fleetRemoved",
            EventKind::FleetChanged => "fleetChanged",
            EventKind::FinishAdded => "finishAdded",
            EventKind::FinishRemoved => "finishRemoved",
            EventKind::FinishChanged => "finishChanged",
            EventKind::SequenceStartedWithWarning => "sequenceStartedWithWarning",
            EventKind::SequenceStartedWithoutWarning => "sequenceStartedWithoutWarning",
            EventKind::GeneralRecall => "generalRecall",
            EventKind::StartSequenceReset => "startSequenceReset",
        }
    }
}

impl RaceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RaceEvent::FleetAdded(_) => EventKind::FleetAdded,
            RaceEvent::FleetRemoved(_) => EventKind::FleetRemoved,
            RaceEvent::FleetChanged(_) => EventKind::FleetChanged,
            RaceEvent::FinishAdded(_) => EventKind::FinishAdded,
            RaceEvent::FinishRemoved(_) => EventKind::FinishRemoved,
            RaceEvent::FinishChanged(_) => EventKind::FinishChanged,
            RaceEvent::SequenceStartedWithWarning => EventKind::SequenceStartedWithWarning,
            RaceEvent::SequenceStartedWithoutWarning => EventKind::SequenceStartedWithoutWarning,
            RaceEvent::GeneralRecall(_) => EventKind::GeneralRecall,
            RaceEvent::StartSequenceReset => EventKind::StartSequenceReset,
        }
    }
}

/// Subscriber callback. Receives the event and a read-only view of the race.
pub type Callback = Box<dyn Fn(&RaceEvent, &RaceManager) -> anyhow::Result<()>>;

struct Subscription {
    /// `None` subscribes to every event
    kind: Option<EventKind>,
    name: &'static str,
    callback: Callback,
}

/// Ordered subscriber list with per-subscriber fault isolation
#[derive(Default)]
pub struct ChangeBus {
    subscriptions: Vec<Subscription>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect<F>(&mut self, kind: Option<EventKind>, name: &'static str, callback: F)
    where
        F: Fn(&RaceEvent, &RaceManager) -> anyhow::Result<()> + 'static,
    {
        self.subscriptions.push(Subscription {
            kind,
            name,
            callback: Box::new(callback),
        });
    }

    /// Deliver `event` to every matching subscriber, in subscription order
    pub fn fire(&self, event: &RaceEvent, race: &RaceManager) {
        let kind = event.kind();
        for sub in &self.subscriptions {
            if sub.kind.map_or(false, |k| k != kind) {
                continue;
            }
            trace!("delivering {} to '{}'", kind.as_str(), sub.name);
            match panic::catch_unwind(AssertUnwindSafe(|| (sub.callback)(event, race))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("subscriber '{}' failed on {}: {:#}", sub.name, kind.as_str(), e);
                }
                Err(_) => {
                    error!("subscriber '{}' panicked on {}", sub.name, kind.as_str());
                }
            }
        }
    }
}
