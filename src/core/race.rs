use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::core::events::ChangeBus;
use crate::core::snapshot::SNAPSHOT_VERSION;
use crate::core::{
    EventKind, Finish, FinishId, Fleet, FleetId, RaceError, RaceEvent, RaceResult, RaceSnapshot,
    SequenceTiming,
};
use crate::timer::Clock;

/// Virtual seconds after a start during which a general recall may still be called
const GENERAL_RECALL_WINDOW_SECS: f64 = 30.0;

/// Where the start sequence is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceState {
    NotStarted,
    StartedWithWarning,
    StartedWithoutWarning,
    GeneralRecall,
}

/// Authoritative state of one race day and its only mutator.
///
/// Every mutator validates first, mutates, and only then publishes the
/// matching [`RaceEvent`], so subscribers never observe a half-applied change.
pub struct RaceManager {
    fleets: Vec<Fleet>,
    finishes: Vec<Finish>,
    sequence_state: SequenceState,
    timing: SequenceTiming,
    next_fleet_id: u32,
    next_finish_id: u32,
    clock: Rc<dyn Clock>,
    bus: ChangeBus,
}

impl RaceManager {
    pub fn new(timing: SequenceTiming, clock: Rc<dyn Clock>) -> RaceResult<Self> {
        timing.validate()?;
        Ok(Self {
            fleets: Vec::new(),
            finishes: Vec::new(),
            sequence_state: SequenceState::NotStarted,
            timing,
            next_fleet_id: 1,
            next_finish_id: 1,
            clock,
            bus: ChangeBus::new(),
        })
    }

    /// Rebuild a race from a recovery snapshot. Subscribers are not restored.
    pub fn from_snapshot(snapshot: RaceSnapshot, clock: Rc<dyn Clock>) -> RaceResult<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RaceError::Configuration(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        snapshot.timing.validate()?;

        let RaceSnapshot {
            timing,
            sequence_state,
            next_fleet_id,
            next_finish_id,
            fleets,
            mut finishes,
            ..
        } = snapshot;

        for finish in &mut finishes {
            if let Some(fleet_id) = finish.fleet {
                if !fleets.iter().any(|f| f.fleet_id == fleet_id) {
                    warn!(
                        "finish {} refers to unknown fleet {}, unlinking",
                        finish.finish_id, fleet_id
                    );
                    finish.fleet = None;
                }
            }
        }

        // never hand out an id that is already in use
        let max_fleet = fleets.iter().map(|f| f.fleet_id.0).max().unwrap_or(0);
        let max_finish = finishes.iter().map(|f| f.finish_id.0).max().unwrap_or(0);

        Ok(Self {
            next_fleet_id: next_fleet_id.max(max_fleet + 1),
            next_finish_id: next_finish_id.max(max_finish + 1),
            fleets,
            finishes,
            sequence_state,
            timing,
            clock,
            bus: ChangeBus::new(),
        })
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        RaceSnapshot {
            version: SNAPSHOT_VERSION,
            timing: self.timing,
            sequence_state: self.sequence_state,
            next_fleet_id: self.next_fleet_id,
            next_finish_id: self.next_finish_id,
            fleets: self.fleets.clone(),
            finishes: self.finishes.clone(),
        }
    }

    /// Subscribe to one kind of event, or to all of them with `None`
    pub fn subscribe<F>(&mut self, kind: Option<EventKind>, name: &'static str, callback: F)
    where
        F: Fn(&RaceEvent, &RaceManager) -> anyhow::Result<()> + 'static,
    {
        self.bus.connect(kind, name, callback);
    }

    fn publish(&self, event: RaceEvent) {
        debug!("publishing {}", event.kind().as_str());
        self.bus.fire(&event, self);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn timing(&self) -> &SequenceTiming {
        &self.timing
    }

    pub fn test_speed_ratio(&self) -> u32 {
        self.timing.test_speed_ratio
    }

    pub fn fleets(&self) -> &[Fleet] {
        &self.fleets
    }

    pub fn finishes(&self) -> &[Finish] {
        &self.finishes
    }

    pub fn sequence_state(&self) -> SequenceState {
        self.sequence_state
    }

    // ----- fleets -----

    pub fn create_fleet(&mut self, name: &str) -> RaceResult<FleetId> {
        if self.has_sequence_started() {
            return Err(RaceError::invalid_state(
                "fleets cannot be added once the start sequence has begun",
            ));
        }
        let fleet_id = FleetId(self.next_fleet_id);
        self.next_fleet_id += 1;
        self.fleets.push(Fleet::new(fleet_id, name));
        info!("Added fleet {} '{}'", fleet_id, name);

        self.publish(RaceEvent::FleetAdded(fleet_id));
        Ok(fleet_id)
    }

    pub fn remove_fleet(&mut self, fleet_id: FleetId) -> RaceResult<Fleet> {
        let index = self.fleet_index(fleet_id)?;
        if self.has_sequence_started() {
            return Err(RaceError::invalid_state(
                "fleets cannot be removed once the start sequence has begun",
            ));
        }
        let fleet = self.fleets.remove(index);
        for finish in self.finishes.iter_mut().filter(|f| f.fleet == Some(fleet_id)) {
            finish.fleet = None;
        }
        info!("Removed fleet {} '{}'", fleet_id, fleet.name);

        self.publish(RaceEvent::FleetRemoved(fleet.clone()));
        Ok(fleet)
    }

    pub fn rename_fleet(&mut self, fleet_id: FleetId, name: &str) -> RaceResult<()> {
        let index = self.fleet_index(fleet_id)?;
        self.fleets[index].name = name.to_string();

        self.publish(RaceEvent::FleetChanged(fleet_id));
        Ok(())
    }

    // ----- start sequence -----

    pub fn start_race_sequence_with_warning(&mut self) -> RaceResult<()> {
        self.start_sequence(true)
    }

    pub fn start_race_sequence_without_warning(&mut self) -> RaceResult<()> {
        self.start_sequence(false)
    }

    fn start_sequence(&mut self, with_warning: bool) -> RaceResult<()> {
        if self.sequence_state != SequenceState::NotStarted {
            return Err(RaceError::invalid_state("start sequence already running"));
        }
        if !self.has_fleets() {
            return Err(RaceError::invalid_state("no fleets to start"));
        }

        let first_gun = self.now() + self.timing.countdown();
        for (index, fleet) in self.fleets.iter_mut().enumerate() {
            let start = first_gun + self.timing.fleet_start_offset(index, with_warning);
            debug!("Fleet '{}' starts at {}", fleet.name, start);
            fleet.start_time = Some(start);
        }

        let (state, event) = if with_warning {
            (SequenceState::StartedWithWarning, RaceEvent::SequenceStartedWithWarning)
        } else {
            (SequenceState::StartedWithoutWarning, RaceEvent::SequenceStartedWithoutWarning)
        };
        self.sequence_state = state;
        info!(
            "Start sequence {:?} for {} fleets at speed ratio {}",
            state,
            self.fleets.len(),
            self.timing.test_speed_ratio
        );

        self.publish(event);
        Ok(())
    }

    /// Void the start of the most recently started fleet and reschedule it
    /// one stagger after the last planned start.
    pub fn general_recall(&mut self) -> RaceResult<FleetId> {
        if !self.has_sequence_started() {
            return Err(RaceError::invalid_state("no start sequence to recall"));
        }
        let now = self.now();
        let index = self
            .last_fleet_started_index(now)
            .ok_or_else(|| RaceError::invalid_state("no fleet has started yet"))?;

        let latest = self
            .fleets
            .iter()
            .filter_map(|f| f.start_time)
            .max()
            .unwrap_or(now)
            .max(now);

        let mut fleet = self.fleets.remove(index);
        let restart = latest + self.timing.stagger();
        info!("General recall of fleet '{}', restarting at {}", fleet.name, restart);
        fleet.start_time = Some(restart);
        let fleet_id = fleet.fleet_id;
        // keep the list in start order
        self.fleets.push(fleet);
        self.sequence_state = SequenceState::GeneralRecall;

        self.publish(RaceEvent::GeneralRecall(fleet_id));
        Ok(fleet_id)
    }

    /// Back to square one: no start times, no finishes
    pub fn reset_start_sequence(&mut self) {
        for fleet in &mut self.fleets {
            fleet.start_time = None;
        }
        self.finishes.clear();
        self.sequence_state = SequenceState::NotStarted;
        info!("Start sequence reset");

        self.publish(RaceEvent::StartSequenceReset);
    }

    // ----- finishes -----

    /// Record a finish at the true wall-clock time, whatever the speed ratio
    pub fn create_finish(&mut self) -> FinishId {
        let finish_id = FinishId(self.next_finish_id);
        self.next_finish_id += 1;
        let finish = Finish::new(finish_id, self.now());
        info!("Finish {} at {}", finish_id, finish.finish_time);
        self.finishes.push(finish);

        self.publish(RaceEvent::FinishAdded(finish_id));
        finish_id
    }

    pub fn remove_finish(&mut self, finish_id: FinishId) -> RaceResult<Finish> {
        let index = self.finish_index(finish_id)?;
        let finish = self.finishes.remove(index);

        self.publish(RaceEvent::FinishRemoved(finish.clone()));
        Ok(finish)
    }

    /// Attach (or detach with `None`) the fleet of a recorded finish
    pub fn update_finish(&mut self, finish_id: FinishId, fleet: Option<FleetId>) -> RaceResult<()> {
        let index = self.finish_index(finish_id)?;
        if let Some(fleet_id) = fleet {
            self.fleet_index(fleet_id)?;
        }
        self.finishes[index].fleet = fleet;

        self.publish(RaceEvent::FinishChanged(finish_id));
        Ok(())
    }

    // ----- queries -----

    fn fleet_index(&self, fleet_id: FleetId) -> RaceResult<usize> {
        self.fleets
            .iter()
            .position(|f| f.fleet_id == fleet_id)
            .ok_or(RaceError::FleetNotFound(fleet_id))
    }

    fn finish_index(&self, finish_id: FinishId) -> RaceResult<usize> {
        self.finishes
            .iter()
            .position(|f| f.finish_id == finish_id)
            .ok_or(RaceError::FinishNotFound(finish_id))
    }

    fn last_fleet_started_index(&self, now: DateTime<Utc>) -> Option<usize> {
        self.fleets
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_started(now))
            .max_by_key(|(_, f)| f.start_time)
            .map(|(index, _)| index)
    }

    /// Earliest future start; on equal start times the earlier fleet in the list wins
    pub fn next_fleet_to_start(&self) -> Option<&Fleet> {
        let now = self.now();
        self.fleets
            .iter()
            .filter(|f| f.start_time.map_or(false, |start| start > now))
            .min_by_key(|f| f.start_time)
    }

    pub fn has_sequence_started(&self) -> bool {
        self.sequence_state != SequenceState::NotStarted
    }

    pub fn has_started_fleet(&self) -> bool {
        let now = self.now();
        self.fleets.iter().any(|f| f.is_started(now))
    }

    pub fn last_fleet_started(&self) -> Option<&Fleet> {
        self.last_fleet_started_index(self.now())
            .map(|index| &self.fleets[index])
    }

    pub fn has_fleets(&self) -> bool {
        !self.fleets.is_empty()
    }

    pub fn fleet_with_id(&self, fleet_id: FleetId) -> Option<&Fleet> {
        self.fleets.iter().find(|f| f.fleet_id == fleet_id)
    }

    pub fn finish_with_id(&self, finish_id: FinishId) -> Option<&Finish> {
        self.finishes.iter().find(|f| f.finish_id == finish_id)
    }

    /// Finish time minus the start of its fleet, once both are known
    pub fn elapsed_finish_time(&self, finish_id: FinishId) -> Option<Duration> {
        let finish = self.finish_with_id(finish_id)?;
        let start = self.fleet_with_id(finish.fleet?)?.start_time?;
        Some(finish.elapsed_finish_time_delta(start))
    }

    /// First finish after `finish_id` still waiting for a fleet
    pub fn next_finish_without_fleet_after(&self, finish_id: FinishId) -> Option<FinishId> {
        let index = self.finish_index(finish_id).ok()?;
        self.finishes[index + 1..]
            .iter()
            .find(|f| !f.has_fleet())
            .map(|f| f.finish_id)
    }

    /// A fleet started less than 30 virtual seconds ago
    pub fn general_recall_available(&self) -> bool {
        let now = self.now();
        self.last_fleet_started()
            .and_then(|f| f.adjusted_delta_seconds_to_start_time(now, self.timing.test_speed_ratio))
            .map_or(false, |since_start| since_start < GENERAL_RECALL_WINDOW_SECS)
    }
}
