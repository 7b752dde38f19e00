use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable fleet identifier, never reused within a race day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FleetId(pub u32);

impl fmt::Display for FleetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A start group of boats sharing one start time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fleet {
    pub fleet_id: FleetId,
    pub name: String,
    /// Absolute wall-clock instant, unset until the sequence starts
    pub start_time: Option<DateTime<Utc>>,
}

impl Fleet {
    pub fn new(fleet_id: FleetId, name: &str) -> Self {
        Self {
            fleet_id,
            name: name.to_string(),
            start_time: None,
        }
    }

    pub fn is_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time.map_or(false, |start| start <= now)
    }

    /// Seconds elapsed since the start; negative while the start is still ahead
    pub fn delta_seconds_to_start_time(&self, now: DateTime<Utc>) -> Option<f64> {
        self.start_time
            .map(|start| (now - start).num_milliseconds() as f64 / 1000.0)
    }

    /// Same as [`Self::delta_seconds_to_start_time`] but in accelerated virtual seconds
    pub fn adjusted_delta_seconds_to_start_time(
        &self,
        now: DateTime<Utc>,
        test_speed_ratio: u32,
    ) -> Option<f64> {
        self.delta_seconds_to_start_time(now)
            .map(|delta| delta * test_speed_ratio as f64)
    }

    pub fn status(&self, now: DateTime<Utc>) -> &'static str {
        match self.start_time {
            None => "Not started",
            Some(start) if start > now => "Starting",
            Some(_) => "Started",
        }
    }
}
