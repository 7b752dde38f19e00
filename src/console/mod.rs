//! Line based operator console.
//!
//! Commands are parsed from stdin by the binary and handed to
//! [`Console::handle`], which applies them to the station and returns the
//! text to show. Destructive commands ask for a `y`/`n` answer first.

pub mod command;
pub mod render;

pub use command::{parse_command, Command, CommandError, HELP};
pub use render::render_status;

use std::rc::Rc;
use tracing::{info, warn};

use crate::audio::ClipQueue;
use crate::controllers::Station;
use crate::core::RaceManager;
use crate::hardware::RelayStatus;
use crate::persistence::export_finishes;

/// What the binary should do after a line was handled
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue(Vec<String>),
    Quit,
}

pub struct Console {
    audio: Rc<dyn ClipQueue>,
    relay_status: Box<dyn Fn() -> Option<RelayStatus>>,
    default_fleet_names: Vec<String>,
    /// Command waiting for the operator to confirm it
    pending: Option<Command>,
}

impl Console {
    pub fn new(
        audio: Rc<dyn ClipQueue>,
        relay_status: Box<dyn Fn() -> Option<RelayStatus>>,
        default_fleet_names: Vec<String>,
    ) -> Self {
        Self {
            audio,
            relay_status,
            default_fleet_names,
            pending: None,
        }
    }

    pub fn status(&self, race: &RaceManager) -> String {
        render_status(race, self.audio.queue_length(), (self.relay_status)())
    }

    pub fn handle(&mut self, line: &str, station: &mut Station) -> Outcome {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Outcome::Continue(Vec::new()),
            Err(e) => return Outcome::Continue(vec![e.to_string()]),
        };

        if let Some(pending) = self.pending.take() {
            return match command {
                Command::Answer(true) => self.execute(pending, station),
                Command::Answer(false) => Outcome::Continue(vec!["Cancelled".to_string()]),
                other => {
                    // any other command abandons the question
                    self.handle_command(other, station)
                }
            };
        }
        self.handle_command(command, station)
    }

    fn handle_command(&mut self, command: Command, station: &mut Station) -> Outcome {
        match command {
            Command::Reset => {
                self.pending = Some(Command::Reset);
                say("Reset the start sequence? This will remove any finishes. (y/n)")
            }
            Command::Quit => {
                self.pending = Some(Command::Quit);
                say("Shut the station down? (y/n)")
            }
            Command::Answer(_) => say("Nothing to answer"),
            other => self.execute(other, station),
        }
    }

    fn next_default_fleet_name(&self, race: &RaceManager) -> Option<String> {
        self.default_fleet_names
            .iter()
            .find(|name| !race.fleets().iter().any(|f| &f.name == *name))
            .cloned()
    }

    fn execute(&mut self, command: Command, station: &mut Station) -> Outcome {
        info!("Operator command: {:?}", command);
        let race = station.race_mut();
        let result: anyhow::Result<String> = match command {
            Command::AddFleet(name) => {
                match name.or_else(|| self.next_default_fleet_name(race)) {
                    Some(name) => race
                        .create_fleet(&name)
                        .map(|id| format!("Added fleet {} '{}'", id, name))
                        .map_err(Into::into),
                    None => Ok("Give the fleet a name: fleet add <name>".to_string()),
                }
            }
            Command::RemoveFleet(id) => race
                .remove_fleet(id)
                .map(|fleet| format!("Removed fleet {} '{}'", id, fleet.name))
                .map_err(Into::into),
            Command::RenameFleet(id, name) => race
                .rename_fleet(id, &name)
                .map(|()| format!("Fleet {} is now '{}'", id, name))
                .map_err(Into::into),
            Command::StartWithWarning => race
                .start_race_sequence_with_warning()
                .map(|()| "Sequence started with F flag warning".to_string())
                .map_err(Into::into),
            Command::StartWithoutWarning => race
                .start_race_sequence_without_warning()
                .map(|()| "Sequence started".to_string())
                .map_err(Into::into),
            Command::GeneralRecall => {
                if !race.general_recall_available() {
                    warn!("General recall requested outside the recall window");
                }
                race.general_recall()
                    .map(|id| format!("General recall, fleet {} restarts last", id))
                    .map_err(Into::into)
            }
            Command::Reset => {
                race.reset_start_sequence();
                Ok("Start sequence reset".to_string())
            }
            Command::Finish => {
                let id = race.create_finish();
                Ok(format!("Finish {} recorded", id))
            }
            Command::Gun => {
                station.fire_gun();
                Ok("Bang".to_string())
            }
            Command::Assign(finish, fleet) => race
                .update_finish(finish, Some(fleet))
                .map(|()| match race.next_finish_without_fleet_after(finish) {
                    Some(next) => format!("Finish {} in fleet {}, next unassigned is {}", finish, fleet, next),
                    None => format!("Finish {} in fleet {}", finish, fleet),
                })
                .map_err(Into::into),
            Command::Unfinish(finish) => race
                .remove_finish(finish)
                .map(|_| format!("Removed finish {}", finish))
                .map_err(Into::into),
            Command::Status => Ok(self.status(station.race())),
            Command::Export(path) => export_finishes(station.race(), &path)
                .map(|count| format!("Wrote {} finishes to {}", count, path.display())),
            Command::Help => Ok(HELP.to_string()),
            Command::Quit => return Outcome::Quit,
            Command::Answer(_) => Ok(String::new()),
        };

        match result {
            Ok(message) => Outcome::Continue(vec![message]),
            Err(e) => {
                warn!("Command failed: {:#}", e);
                Outcome::Continue(vec![format!("Error: {:#}", e)])
            }
        }
    }
}

fn say(message: &str) -> Outcome {
    Outcome::Continue(vec![message.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RecordingClips;
    use crate::controllers::SignalClips;
    use crate::core::SequenceTiming;
    use crate::timer::{ManualClock, TimerQueue};
    use chrono::Duration;

    struct Rig {
        clock: ManualClock,
        clips: Rc<RecordingClips>,
        station: Station,
        console: Console,
    }

    impl Rig {
        fn new() -> Self {
            let clock = ManualClock::default();
            let race = RaceManager::new(SequenceTiming::default(), Rc::new(clock.clone())).unwrap();
            let clips = Rc::new(RecordingClips::default());
            let station = Station::new(
                race,
                TimerQueue::new(Rc::new(clock.clone())),
                clips.clone(),
                SignalClips::default(),
                None,
            );
            let console = Console::new(
                clips.clone(),
                Box::new(|| None),
                vec!["Lasers".to_string(), "Toppers".to_string()],
            );
            Self { clock, clips, station, console }
        }

        fn say(&mut self, line: &str) -> String {
            match self.console.handle(line, &mut self.station) {
                Outcome::Continue(lines) => lines.join("\n"),
                Outcome::Quit => "QUIT".to_string(),
            }
        }
    }

    #[test]
    fn test_default_fleet_names() {
        let mut rig = Rig::new();
        assert_eq!(rig.say("fleet add"), "Added fleet 1 'Lasers'");
        assert_eq!(rig.say("fleet add"), "Added fleet 2 'Toppers'");
        assert_eq!(rig.say("fleet add"), "Give the fleet a name: fleet add <name>");
        assert_eq!(rig.say("fleet add Handicap"), "Added fleet 3 'Handicap'");
        assert_eq!(rig.station.race().fleets().len(), 3);
    }

    #[test]
    fn test_errors_are_reported_not_fatal() {
        let mut rig = Rig::new();
        assert_eq!(rig.say("start plain"), "Error: invalid state: no fleets to start");
        assert!(rig.say("fleet remove 9").starts_with("Error: fleet 9 not found"));
        assert!(rig.say("bogus").starts_with("unknown command"));
    }

    #[test]
    fn test_reset_needs_confirmation() {
        let mut rig = Rig::new();
        rig.say("fleet add");
        rig.say("start warning");
        assert!(rig.station.race().has_sequence_started());

        assert!(rig.say("reset").ends_with("(y/n)"));
        assert_eq!(rig.say("n"), "Cancelled");
        assert!(rig.station.race().has_sequence_started());

        rig.say("reset");
        assert_eq!(rig.say("y"), "Start sequence reset");
        assert!(!rig.station.race().has_sequence_started());
        assert_eq!(rig.say("y"), "Nothing to answer");
    }

    #[test]
    fn test_quit_needs_confirmation() {
        let mut rig = Rig::new();
        rig.say("quit");
        assert_eq!(rig.say("status").lines().next().map(|l| l.starts_with("Clock")), Some(true));
        rig.say("quit");
        assert_eq!(rig.say("yes"), "QUIT");
    }

    #[test]
    fn test_finishing_flow() {
        let mut rig = Rig::new();
        rig.say("fleet add");
        rig.say("fleet add");
        rig.say("start plain");
        rig.clips.take();

        rig.clock.advance(Duration::seconds(900));
        assert_eq!(rig.say("finish"), "Finish 1 recorded");
        assert_eq!(rig.say("f"), "Finish 2 recorded");
        assert_eq!(rig.clips.take(), vec!["gun", "gun"]);

        assert_eq!(rig.say("assign 1 2"), "Finish 1 in fleet 2, next unassigned is 2");
        assert_eq!(rig.say("assign 2 1"), "Finish 2 in fleet 1");
        assert_eq!(rig.say("unfinish 1"), "Removed finish 1");
        assert_eq!(rig.station.race().finishes().len(), 1);

        assert_eq!(rig.say("gun"), "Bang");
        assert_eq!(rig.clips.take(), vec!["gun"]);
    }
}
