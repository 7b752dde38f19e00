use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::FleetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FinishId(pub u32);

impl fmt::Display for FinishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One boat crossing the line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finish {
    pub finish_id: FinishId,
    /// True wall-clock time, never accelerated
    pub finish_time: DateTime<Utc>,
    /// Assigned by the operator after the finish is recorded
    pub fleet: Option<FleetId>,
}

impl Finish {
    pub fn new(finish_id: FinishId, finish_time: DateTime<Utc>) -> Self {
        Self {
            finish_id,
            finish_time,
            fleet: None,
        }
    }

    pub fn has_fleet(&self) -> bool {
        self.fleet.is_some()
    }

    /// Elapsed race time given the start of the assigned fleet
    pub fn elapsed_finish_time_delta(&self, fleet_start: DateTime<Utc>) -> Duration {
        self.finish_time - fleet_start
    }
}
