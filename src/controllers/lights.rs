//! Light display policy: five lamps count down the minutes to the next start.

use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

use crate::core::{EventKind, RaceManager};
use crate::hardware::{LampOutputs, SignalLights, ALL_OFF};
use crate::timer::{TimerHandle, TimerQueue, TimerService};

const POLL_INTERVAL_MS: i64 = 500;

/// Lamp pattern for a fleet starting in `seconds_to_start` virtual seconds.
///
/// One lamp goes out per minute from five minutes out; in the last thirty
/// seconds the remaining lamp flashes at 2 Hz.
pub fn lamps_for_seconds_to_start(seconds_to_start: f64) -> LampOutputs {
    let lit = if seconds_to_start > 300.0 {
        0
    } else if seconds_to_start > 240.0 {
        5
    } else if seconds_to_start > 180.0 {
        4
    } else if seconds_to_start > 120.0 {
        3
    } else if seconds_to_start > 60.0 {
        2
    } else if seconds_to_start > 30.0 || (seconds_to_start * 2.0).trunc() as i64 % 2 == 0 {
        1
    } else {
        0
    };
    let mut lamps = ALL_OFF;
    for lamp in lamps.iter_mut().take(lit) {
        *lamp = true;
    }
    lamps
}

pub struct LightsController {
    timers: TimerQueue,
    lights: Rc<dyn SignalLights>,
    /// Last pattern sent; the hardware starts dark
    current: LampOutputs,
    update_timer: Option<TimerHandle>,
}

impl LightsController {
    pub fn new(timers: TimerQueue, lights: Rc<dyn SignalLights>) -> Self {
        Self {
            timers,
            lights,
            current: ALL_OFF,
            update_timer: None,
        }
    }

    pub fn wire(controller: &Rc<RefCell<Self>>, race: &mut RaceManager) {
        for kind in [
            EventKind::SequenceStartedWithWarning,
            EventKind::SequenceStartedWithoutWarning,
            EventKind::GeneralRecall,
            EventKind::StartSequenceReset,
        ] {
            let lights = controller.clone();
            race.subscribe(Some(kind), "lights", move |_, race| {
                Self::update_lights(&lights, race);
                Ok(())
            });
        }
    }

    pub fn current(&self) -> LampOutputs {
        self.current
    }

    fn calculate_lights_display(race: &RaceManager) -> LampOutputs {
        race.next_fleet_to_start()
            .and_then(|fleet| {
                fleet.adjusted_delta_seconds_to_start_time(race.now(), race.test_speed_ratio())
            })
            .map_or(ALL_OFF, |delta| lamps_for_seconds_to_start(-delta))
    }

    fn cancel_update_timer(&mut self) {
        if let Some(handle) = self.update_timer.take() {
            self.timers.cancel(handle);
        }
    }

    /// Recompute the lamps now and keep polling while a fleet is still to start
    pub fn update_lights(controller: &Rc<RefCell<Self>>, race: &RaceManager) {
        let mut this = controller.borrow_mut();
        this.cancel_update_timer();

        let lamps = Self::calculate_lights_display(race);
        if lamps != this.current {
            debug!("Lamps now {:?}", lamps);
            this.lights.set_outputs(lamps);
            this.current = lamps;
        }

        if race.next_fleet_to_start().is_some() {
            let next = controller.clone();
            let handle = this.timers.schedule(POLL_INTERVAL_MS, move |race: &RaceManager| {
                Self::update_lights(&next, race);
                Ok(())
            });
            this.update_timer = Some(handle);
        } else {
            this.lights.set_outputs(ALL_OFF);
            this.current = ALL_OFF;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SequenceTiming;
    use crate::hardware::RecordingLights;
    use crate::timer::{Clock, ManualClock};
    use chrono::{DateTime, Duration, Utc};

    const FIVE: LampOutputs = [true; 5];
    const FOUR: LampOutputs = [true, true, true, true, false];
    const THREE: LampOutputs = [true, true, true, false, false];
    const TWO: LampOutputs = [true, true, false, false, false];
    const ONE: LampOutputs = [true, false, false, false, false];

    struct Rig {
        clock: ManualClock,
        timers: TimerQueue,
        lamps: Rc<RecordingLights>,
        controller: Rc<RefCell<LightsController>>,
        race: RaceManager,
        t0: DateTime<Utc>,
    }

    impl Rig {
        fn new(fleets: &[&str]) -> Self {
            Self::with_speed_ratio(fleets, 1)
        }

        fn with_speed_ratio(fleets: &[&str], ratio: u32) -> Self {
            let clock = ManualClock::default();
            let timing = SequenceTiming::with_speed_ratio(ratio).unwrap();
            let mut race = RaceManager::new(timing, Rc::new(clock.clone())).unwrap();
            for name in fleets {
                race.create_fleet(name).unwrap();
            }
            let timers = TimerQueue::new(Rc::new(clock.clone()));
            let lamps = Rc::new(RecordingLights::default());
            let controller = Rc::new(RefCell::new(LightsController::new(timers.clone(), lamps.clone())));
            LightsController::wire(&controller, &mut race);
            let t0 = clock.now();
            Self { clock, timers, lamps, controller, race, t0 }
        }

        fn run_until(&self, until_ms: i64) -> Vec<(i64, LampOutputs)> {
            let end = self.t0 + Duration::milliseconds(until_ms);
            let mut written = Vec::new();
            while let Some(deadline) = self.timers.next_deadline() {
                if deadline > end {
                    break;
                }
                self.clock.set(deadline);
                self.timers.run_due(&self.race);
                let at = (deadline - self.t0).num_milliseconds();
                written.extend(self.lamps.take().into_iter().map(|lamps| (at, lamps)));
            }
            self.clock.set(end.max(self.clock.now()));
            written
        }
    }

    #[test]
    fn test_lamp_table() {
        assert_eq!(lamps_for_seconds_to_start(301.0), ALL_OFF);
        assert_eq!(lamps_for_seconds_to_start(300.0), FIVE);
        assert_eq!(lamps_for_seconds_to_start(250.0), FIVE);
        assert_eq!(lamps_for_seconds_to_start(240.0), FOUR);
        assert_eq!(lamps_for_seconds_to_start(200.0), FOUR);
        assert_eq!(lamps_for_seconds_to_start(150.0), THREE);
        assert_eq!(lamps_for_seconds_to_start(90.0), TWO);
        assert_eq!(lamps_for_seconds_to_start(45.0), ONE);
        assert_eq!(lamps_for_seconds_to_start(30.0), ONE);
    }

    #[test]
    fn test_last_thirty_seconds_flash() {
        assert_eq!(lamps_for_seconds_to_start(25.0), ONE);
        assert_eq!(lamps_for_seconds_to_start(25.2), ONE);
        assert_eq!(lamps_for_seconds_to_start(25.5), ALL_OFF);
        assert_eq!(lamps_for_seconds_to_start(25.9), ALL_OFF);
        assert_eq!(lamps_for_seconds_to_start(0.4), ONE);
        assert_eq!(lamps_for_seconds_to_start(0.6), ALL_OFF);
    }

    #[test]
    fn test_countdown_polling() {
        let mut rig = Rig::new(&["Lasers"]);
        rig.race.start_race_sequence_with_warning().unwrap();
        // start at 610s; still dark, so nothing is written yet
        assert!(rig.lamps.take().is_empty());

        let written = rig.run_until(1_000_000);
        assert_eq!(
            &written[..5],
            &[
                (310_000, FIVE),
                (370_000, FOUR),
                (430_000, THREE),
                (490_000, TWO),
                (550_000, ONE),
            ]
        );
        // flashing from 29.5s out, then everything off at the start
        assert_eq!(written[5], (580_500, ALL_OFF));
        assert_eq!(written[6], (581_000, ONE));
        assert_eq!(written.last(), Some(&(610_000, ALL_OFF)));
        assert_eq!(written.len(), 5 + 59 + 1);
        assert_eq!(rig.timers.pending(), 0);
    }

    #[test]
    fn test_countdown_polling_in_training() {
        let mut rig = Rig::with_speed_ratio(&["Lasers"], 5);
        rig.race.start_race_sequence_with_warning().unwrap();
        // 10s countdown plus 600 virtual seconds at ratio 5: start at 130s
        assert!(rig.lamps.take().is_empty());

        let written = rig.run_until(200_000);
        assert_eq!(
            &written[..5],
            &[
                (70_000, FIVE),
                (82_000, FOUR),
                (94_000, THREE),
                (106_000, TWO),
                (118_000, ONE),
            ]
        );
        // 30 virtual seconds out is 6 real seconds; the lamp flips on every poll
        let flashing = &written[5..written.len() - 1];
        assert_eq!(flashing.len(), 11);
        for (i, (at, lamps)) in flashing.iter().enumerate() {
            assert_eq!(*at, 124_500 + 500 * i as i64);
            assert_eq!(*lamps, if i % 2 == 0 { ALL_OFF } else { ONE });
        }
        assert_eq!(written.last(), Some(&(130_000, ALL_OFF)));
        assert_eq!(rig.timers.pending(), 0);
    }

    #[test]
    fn test_reset_turns_lamps_off() {
        let mut rig = Rig::new(&["Lasers"]);
        rig.race.start_race_sequence_with_warning().unwrap();
        rig.run_until(320_000);
        assert_eq!(rig.controller.borrow().current(), FIVE);

        rig.race.reset_start_sequence();
        assert_eq!(rig.lamps.take(), vec![ALL_OFF]);
        assert_eq!(rig.controller.borrow().current(), ALL_OFF);
        assert_eq!(rig.timers.pending(), 0);
    }

    #[test]
    fn test_recall_keeps_a_single_poll() {
        let mut rig = Rig::new(&["Lasers", "Toppers"]);
        rig.race.start_race_sequence_without_warning().unwrap();
        rig.run_until(315_000);
        assert_eq!(rig.timers.pending(), 1);

        rig.race.general_recall().unwrap();
        assert_eq!(rig.timers.pending(), 1);

        // Toppers now start next, at 610s
        rig.run_until(320_000);
        assert_eq!(rig.controller.borrow().current(), FIVE);
    }
}
