use serde::{Deserialize, Serialize};

use crate::core::{Finish, Fleet, SequenceState, SequenceTiming};

/// Current snapshot layout
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialisable copy of everything a [`RaceManager`](crate::core::RaceManager) owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub version: u32,
    pub timing: SequenceTiming,
    pub sequence_state: SequenceState,
    pub next_fleet_id: u32,
    pub next_finish_id: u32,
    pub fleets: Vec<Fleet>,
    pub finishes: Vec<Finish>,
}

impl RaceSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FleetId, RaceManager};
    use crate::timer::ManualClock;
    use std::rc::Rc;

    #[test]
    fn test_file_layout() {
        let clock = ManualClock::default();
        let timing = SequenceTiming::with_speed_ratio(4).unwrap();
        let mut race = RaceManager::new(timing, Rc::new(clock)).unwrap();
        race.create_fleet("Lasers").unwrap();
        race.create_finish();

        let json: serde_json::Value =
            serde_json::from_str(&race.snapshot().to_json().unwrap()).unwrap();
        assert_eq!(json["version"], SNAPSHOT_VERSION);
        assert_eq!(json["timing"]["test_speed_ratio"], 4);
        assert_eq!(json["timing"]["stagger_secs"], 300);
        assert!(json.get("test_speed_ratio").is_none());
        assert_eq!(json["fleets"][0]["fleet_id"], FleetId(1).0);
        assert_eq!(json["fleets"][0]["name"], "Lasers");
        assert!(json["fleets"][0]["start_time"].is_null());
        assert!(json["finishes"][0]["finish_time"].is_string());
        assert!(json["finishes"][0]["fleet"].is_null());
    }
}
