use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::core::error::{RaceError, RaceResult};

/// Offsets and acceleration used to lay out a start sequence.
///
/// All `*_secs` values are virtual seconds except `countdown_secs`, which is
/// always real time: the operator hears the countdown at normal speed even in
/// training mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceTiming {
    /// 1 = real time, 5 = five times faster
    pub test_speed_ratio: u32,
    /// Countdown before the first gun
    pub countdown_secs: u32,
    /// Interval between successive fleet starts
    pub stagger_secs: u32,
    /// Extra lead before the first class start in an F flag start
    pub warning_lead_secs: u32,
}

impl Default for SequenceTiming {
    fn default() -> Self {
        Self {
            test_speed_ratio: 1,
            countdown_secs: 10,
            stagger_secs: 300,
            warning_lead_secs: 300,
        }
    }
}

impl SequenceTiming {
    pub fn with_speed_ratio(test_speed_ratio: u32) -> RaceResult<Self> {
        let timing = Self {
            test_speed_ratio,
            ..Self::default()
        };
        timing.validate()?;
        Ok(timing)
    }

    pub fn validate(&self) -> RaceResult<()> {
        if self.test_speed_ratio == 0 {
            return Err(RaceError::Configuration(
                "test speed ratio must be at least 1".to_string(),
            ));
        }
        if self.stagger_secs == 0 {
            return Err(RaceError::Configuration(
                "stagger between fleet starts must be positive".to_string(),
            ));
        }
        if self.countdown_secs == 0 {
            return Err(RaceError::Configuration(
                "countdown must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ratio(&self) -> f64 {
        self.test_speed_ratio as f64
    }

    pub fn countdown(&self) -> Duration {
        Duration::seconds(self.countdown_secs as i64)
    }

    /// Real duration of `virtual_secs` at the current speed ratio, truncated to milliseconds
    pub fn scaled(&self, virtual_secs: f64) -> Duration {
        Duration::milliseconds((virtual_secs * 1000.0 / self.ratio()) as i64)
    }

    /// Real offset from the first gun to the start of the fleet at `index`
    pub fn fleet_start_offset(&self, index: usize, with_warning: bool) -> Duration {
        let lead = if with_warning { self.warning_lead_secs as f64 } else { 0.0 };
        self.scaled(lead + (index as f64 + 1.0) * self.stagger_secs as f64)
    }

    pub fn stagger(&self) -> Duration {
        self.scaled(self.stagger_secs as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ratio_rejected() {
        let err = SequenceTiming::with_speed_ratio(0).unwrap_err();
        assert!(matches!(err, RaceError::Configuration(_)));
    }

    #[test]
    fn test_zero_stagger_rejected() {
        let timing = SequenceTiming {
            stagger_secs: 0,
            ..SequenceTiming::default()
        };
        assert!(timing.validate().is_err());
    }

    #[test]
    fn test_fleet_offsets() {
        let timing = SequenceTiming::default();
        assert_eq!(timing.fleet_start_offset(0, false), Duration::seconds(300));
        assert_eq!(timing.fleet_start_offset(1, false), Duration::seconds(600));
        assert_eq!(timing.fleet_start_offset(0, true), Duration::seconds(600));

        let fast = SequenceTiming::with_speed_ratio(7).unwrap();
        // 300 / 7 = 42.857..s, truncated to whole milliseconds
        assert_eq!(fast.fleet_start_offset(0, false), Duration::milliseconds(42_857));
    }
}
