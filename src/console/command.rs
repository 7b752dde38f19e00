use std::path::PathBuf;
use thiserror::Error;

use crate::core::{FinishId, FleetId};

/// One operator command, parsed from a console line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Add a fleet; without a name the next unused default name is taken
    AddFleet(Option<String>),
    RemoveFleet(FleetId),
    RenameFleet(FleetId, String),
    StartWithWarning,
    StartWithoutWarning,
    GeneralRecall,
    Reset,
    /// Sound the gun and record a finish
    Finish,
    Gun,
    Assign(FinishId, FleetId),
    Unfinish(FinishId),
    Status,
    Export(PathBuf),
    Help,
    Quit,
    /// Answer to a confirmation question
    Answer(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a valid number")]
    BadNumber(String),
}

pub const HELP: &str = "\
fleet add [name]            add a fleet
fleet remove <fleet>        remove a fleet
fleet rename <fleet> <name> rename a fleet
start warning               start the sequence with an F flag warning
start plain                 start the sequence without a warning
recall                      general recall of the last fleet started
reset                       reset the start sequence, removing finishes
finish | f                  gun and record a finish
gun | g                     sound the gun
assign <finish> <fleet>     put a finish in a fleet
unfinish <finish>           remove a finish
status | s                  show fleets and finishes
export <file.csv>           write finishes to a CSV file
quit                        shut the station down";

fn number(word: Option<&str>, usage: &'static str) -> Result<u32, CommandError> {
    let word = word.ok_or(CommandError::Usage(usage))?;
    word.parse()
        .map_err(|_| CommandError::BadNumber(word.to_string()))
}

/// Parse one line. Empty lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "fleet" => match words.next() {
            Some("add") => {
                let name = words.collect::<Vec<_>>().join(" ");
                Command::AddFleet((!name.is_empty()).then_some(name))
            }
            Some("remove") => {
                Command::RemoveFleet(FleetId(number(words.next(), "fleet remove <fleet>")?))
            }
            Some("rename") => {
                const USAGE: &str = "fleet rename <fleet> <name>";
                let fleet = FleetId(number(words.next(), USAGE)?);
                let name = words.collect::<Vec<_>>().join(" ");
                if name.is_empty() {
                    return Err(CommandError::Usage(USAGE));
                }
                Command::RenameFleet(fleet, name)
            }
            _ => return Err(CommandError::Usage("fleet add|remove|rename ...")),
        },
        "start" => match words.next() {
            Some("warning") => Command::StartWithWarning,
            Some("plain") => Command::StartWithoutWarning,
            _ => return Err(CommandError::Usage("start warning|plain")),
        },
        "recall" => Command::GeneralRecall,
        "reset" => Command::Reset,
        "finish" | "f" => Command::Finish,
        "gun" | "g" => Command::Gun,
        "assign" => {
            const USAGE: &str = "assign <finish> <fleet>";
            let finish = FinishId(number(words.next(), USAGE)?);
            let fleet = FleetId(number(words.next(), USAGE)?);
            Command::Assign(finish, fleet)
        }
        "unfinish" => Command::Unfinish(FinishId(number(words.next(), "unfinish <finish>")?)),
        "status" | "s" => Command::Status,
        "export" => {
            let path = words.collect::<Vec<_>>().join(" ");
            if path.is_empty() {
                return Err(CommandError::Usage("export <file.csv>"));
            }
            Command::Export(PathBuf::from(path))
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "y" | "yes" => Command::Answer(true),
        "n" | "no" => Command::Answer(false),
        _ => return Err(CommandError::Unknown(verb.to_string())),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn test_fleet_commands() {
        assert_eq!(parse("fleet add"), Command::AddFleet(None));
        assert_eq!(
            parse("fleet add  Solo  Fleet "),
            Command::AddFleet(Some("Solo Fleet".to_string()))
        );
        assert_eq!(parse("fleet remove 3"), Command::RemoveFleet(FleetId(3)));
        assert_eq!(
            parse("fleet rename 2 Fast Handicap"),
            Command::RenameFleet(FleetId(2), "Fast Handicap".to_string())
        );
    }

    #[test]
    fn test_race_commands() {
        assert_eq!(parse("start warning"), Command::StartWithWarning);
        assert_eq!(parse("START plain"), Command::StartWithoutWarning);
        assert_eq!(parse("recall"), Command::GeneralRecall);
        assert_eq!(parse("f"), Command::Finish);
        assert_eq!(parse("assign 4 1"), Command::Assign(FinishId(4), FleetId(1)));
        assert_eq!(parse("unfinish 4"), Command::Unfinish(FinishId(4)));
        assert_eq!(
            parse("export results/sat.csv"),
            Command::Export(PathBuf::from("results/sat.csv"))
        );
        assert_eq!(parse("y"), Command::Answer(true));
        assert_eq!(parse("no"), Command::Answer(false));
    }

    #[test]
    fn test_bad_input() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(
            parse_command("launch"),
            Err(CommandError::Unknown("launch".to_string()))
        );
        assert_eq!(
            parse_command("fleet remove"),
            Err(CommandError::Usage("fleet remove <fleet>"))
        );
        assert_eq!(
            parse_command("assign 1 x"),
            Err(CommandError::BadNumber("x".to_string()))
        );
        assert!(parse_command("fleet rename 1").is_err());
        assert!(parse_command("start").is_err());
        assert!(parse_command("export").is_err());
    }
}
