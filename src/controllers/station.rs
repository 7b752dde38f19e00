use std::cell::RefCell;
use std::rc::Rc;
use tracing::info;

use crate::audio::ClipQueue;
use crate::controllers::{GunController, LightsController, SignalClips};
use crate::core::RaceManager;
use crate::hardware::{SignalLights, ALL_OFF};
use crate::timer::TimerQueue;

/// The race plus every controller reacting to it, all on the control thread
pub struct Station {
    race: RaceManager,
    timers: TimerQueue,
    gun: Rc<RefCell<GunController>>,
    lights: Option<(Rc<RefCell<LightsController>>, Rc<dyn SignalLights>)>,
}

impl Station {
    pub fn new(
        mut race: RaceManager,
        timers: TimerQueue,
        audio: Rc<dyn ClipQueue>,
        clips: SignalClips,
        lights: Option<Rc<dyn SignalLights>>,
    ) -> Self {
        let gun = Rc::new(RefCell::new(GunController::new(timers.clone(), audio, clips)));
        GunController::wire(&gun, &mut race);

        let lights = lights.map(|output| {
            let controller = Rc::new(RefCell::new(LightsController::new(
                timers.clone(),
                output.clone(),
            )));
            LightsController::wire(&controller, &mut race);
            (controller, output)
        });

        Self {
            race,
            timers,
            gun,
            lights,
        }
    }

    /// Re-arm signals for a race restored mid-sequence. Guns already past
    /// are not sounded again; the F flag tones are not recovered.
    pub fn resume(&mut self) {
        if !self.race.has_sequence_started() {
            return;
        }
        info!("Resuming a started sequence");
        self.gun
            .borrow_mut()
            .schedule_guns_for_future_fleet_starts(&self.race);
        if let Some((lights, _)) = &self.lights {
            LightsController::update_lights(lights, &self.race);
        }
    }

    pub fn race(&self) -> &RaceManager {
        &self.race
    }

    pub fn race_mut(&mut self) -> &mut RaceManager {
        &mut self.race
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    /// Run every timer that is due
    pub fn run_due(&self) -> usize {
        self.timers.run_due(&self.race)
    }

    pub fn fire_gun(&self) {
        self.gun.borrow().fire_gun();
    }

    /// Stop every timer and darken the lamps
    pub fn shutdown(&mut self) {
        self.gun.borrow_mut().cancel_schedules();
        self.timers.shutdown();
        if let Some((_, output)) = &self.lights {
            output.set_outputs(ALL_OFF);
        }
        info!("Station stopped");
    }
}
