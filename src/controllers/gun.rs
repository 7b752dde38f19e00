//! Signal scheduling policy.
//!
//! `GunController` turns race events into timed audio signals: the ten second
//! countdown, the F flag down warning and the 5/4/1/0 minute guns for every
//! fleet. It keeps nothing but the handles of the timers it armed, so a
//! recall or reset can cancel them all at once.

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info};

use crate::audio::ClipQueue;
use crate::core::{EventKind, Fleet, FleetId, RaceManager};
use crate::timer::{TimerHandle, TimerQueue, TimerService};

/// F flag comes down four virtual minutes after the first gun of a warning start
const FLAG_DOWN_SECS: f64 = 240.0;
/// Offsets (virtual seconds before start) of the first fleet's guns in a warning start
const FIRST_FLEET_OFFSETS: [f64; 4] = [300.0, 240.0, 60.0, 0.0];
/// Offsets of the guns for every other fleet
const FLEET_OFFSETS: [f64; 3] = [240.0, 60.0, 0.0];
/// Warning tones sound once a second for this long before a gun
const WARNING_BEEPS_MS: i64 = 10_000;
const BEEP_INTERVAL_MS: usize = 1_000;

/// Clip names for the two kinds of signal
#[derive(Debug, Clone)]
pub struct SignalClips {
    pub gun: String,
    pub warning: String,
}

impl Default for SignalClips {
    fn default() -> Self {
        Self {
            gun: "gun".to_string(),
            warning: "warning".to_string(),
        }
    }
}

/// Real milliseconds from `now` until the signal `seconds_before` virtual
/// seconds ahead of the fleet's start, or `None` if the fleet has no start
/// in the future.
pub fn millis_to_signal(
    fleet: &Fleet,
    now: DateTime<Utc>,
    test_speed_ratio: u32,
    seconds_before: f64,
) -> Option<i64> {
    let seconds_to_start = -fleet.delta_seconds_to_start_time(now)?;
    if seconds_to_start <= 0.0 {
        return None;
    }
    // e.g. ratio 5, first fleet of an F flag start: 130s to start, so the
    // 5 minute gun is 130 - 300/5 = 70s away
    let seconds_to_gun = seconds_to_start - seconds_before / test_speed_ratio as f64;
    Some((1000.0 * seconds_to_gun) as i64)
}

pub struct GunController {
    timers: TimerQueue,
    audio: Rc<dyn ClipQueue>,
    clips: SignalClips,
    scheduled: Vec<TimerHandle>,
}

impl GunController {
    pub fn new(timers: TimerQueue, audio: Rc<dyn ClipQueue>, clips: SignalClips) -> Self {
        Self {
            timers,
            audio,
            clips,
            scheduled: Vec::new(),
        }
    }

    /// Register for the race events this controller reacts to
    pub fn wire(controller: &Rc<RefCell<Self>>, race: &mut RaceManager) {
        let gun = controller.clone();
        race.subscribe(Some(EventKind::SequenceStartedWithWarning), "gun", move |_, race| {
            gun.borrow_mut().handle_sequence_started_with_warning(race);
            Ok(())
        });
        let gun = controller.clone();
        race.subscribe(Some(EventKind::SequenceStartedWithoutWarning), "gun", move |_, race| {
            gun.borrow_mut().handle_sequence_started_without_warning(race);
            Ok(())
        });
        let gun = controller.clone();
        race.subscribe(Some(EventKind::GeneralRecall), "gun", move |_, race| {
            gun.borrow_mut().handle_general_recall(race);
            Ok(())
        });
        let gun = controller.clone();
        race.subscribe(Some(EventKind::StartSequenceReset), "gun", move |_, _| {
            gun.borrow_mut().cancel_schedules();
            Ok(())
        });
        let gun = controller.clone();
        race.subscribe(Some(EventKind::FinishAdded), "gun", move |_, _| {
            gun.borrow().fire_gun();
            Ok(())
        });
    }

    pub fn fire_gun(&self) {
        self.audio.enqueue_clip(&self.clips.gun);
    }

    /// Timers currently armed by this controller
    pub fn armed(&self) -> usize {
        self.scheduled
            .iter()
            .filter(|handle| self.timers.is_armed(**handle))
            .count()
    }

    fn schedule_clip(&mut self, millis: i64, clip: &str) {
        let audio = self.audio.clone();
        let clip = clip.to_string();
        let handle = self.timers.schedule(millis, move |_: &RaceManager| {
            audio.enqueue_clip(&clip);
            Ok(())
        });
        // forget handles of signals that already sounded
        self.scheduled.retain(|h| self.timers.is_armed(*h));
        self.scheduled.push(handle);
    }

    /// One tone a second before the fixed countdown gun, starting now
    fn schedule_countdown(&mut self, gun_millis: i64) {
        let warning = self.clips.warning.clone();
        // the first tone is due immediately; unlike the other signals a
        // zero delay is kept here so the operator hears the countdown begin
        for millis in (0..gun_millis).step_by(BEEP_INTERVAL_MS) {
            self.schedule_clip(millis, &warning);
        }
        let gun = self.clips.gun.clone();
        self.schedule_clip(gun_millis, &gun);
    }

    /// Tones for the ten seconds before `gun_millis`; a final warning adds one
    /// more tone at `gun_millis` in place of a gun. Tones already due are skipped.
    fn schedule_warning_beeps(&mut self, gun_millis: i64, final_warning: bool) {
        let warning = self.clips.warning.clone();
        for millis in (gun_millis - WARNING_BEEPS_MS..gun_millis).step_by(BEEP_INTERVAL_MS) {
            if millis > 0 {
                self.schedule_clip(millis, &warning);
            }
        }
        if final_warning && gun_millis > 0 {
            self.schedule_clip(gun_millis, &warning);
        }
    }

    fn schedule_gun_for_fleet_start(&mut self, fleet: &Fleet, race: &RaceManager, seconds_before: f64) {
        let Some(gun_millis) =
            millis_to_signal(fleet, race.now(), race.test_speed_ratio(), seconds_before)
        else {
            return;
        };
        if gun_millis <= 0 {
            debug!(
                "{}s signal for '{}' already due, not scheduling",
                seconds_before, fleet.name
            );
            return;
        }
        info!(
            "Scheduling {}s gun for '{}' in {}ms",
            seconds_before, fleet.name, gun_millis
        );
        self.schedule_warning_beeps(gun_millis, false);
        let gun = self.clips.gun.clone();
        self.schedule_clip(gun_millis, &gun);
    }

    pub fn cancel_schedules(&mut self) {
        debug!("Cancelling {} scheduled signals", self.scheduled.len());
        for handle in self.scheduled.drain(..) {
            self.timers.cancel(handle);
        }
    }

    /// Standard schedule for every fleet still to start. Also used after a
    /// restore: signals whose time has passed are never armed.
    pub fn schedule_guns_for_future_fleet_starts(&mut self, race: &RaceManager) {
        self.schedule_future_fleets_except(race, None);
    }

    fn schedule_future_fleets_except(&mut self, race: &RaceManager, skip: Option<FleetId>) {
        let now = race.now();
        for fleet in race.fleets() {
            if fleet.is_started(now) || Some(fleet.fleet_id) == skip {
                continue;
            }
            for seconds_before in FLEET_OFFSETS {
                self.schedule_gun_for_fleet_start(fleet, race, seconds_before);
            }
        }
    }

    fn countdown_millis(race: &RaceManager) -> i64 {
        race.timing().countdown_secs as i64 * 1000
    }

    pub fn handle_sequence_started_with_warning(&mut self, race: &RaceManager) {
        let countdown = Self::countdown_millis(race);
        self.schedule_countdown(countdown);

        let flag_down = countdown + (FLAG_DOWN_SECS * 1000.0 / race.timing().ratio()) as i64;
        self.schedule_warning_beeps(flag_down, true);

        let first = race.fleets().first().cloned();
        if let Some(first) = &first {
            for seconds_before in FIRST_FLEET_OFFSETS {
                self.schedule_gun_for_fleet_start(first, race, seconds_before);
            }
        }
        self.schedule_future_fleets_except(race, first.map(|f| f.fleet_id));
    }

    pub fn handle_sequence_started_without_warning(&mut self, race: &RaceManager) {
        self.schedule_countdown(Self::countdown_millis(race));
        self.schedule_guns_for_future_fleet_starts(race);
    }

    pub fn handle_general_recall(&mut self, race: &RaceManager) {
        self.fire_gun();
        self.fire_gun();
        self.cancel_schedules();
        self.schedule_guns_for_future_fleet_starts(race);
    }
}
