use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::core::RaceManager;

/// One row of the finish sheet
#[derive(Debug, Serialize)]
struct FinishRow<'a> {
    finish: u32,
    clock_time: String,
    fleet: &'a str,
    /// Empty until the finish is assigned to a started fleet
    elapsed_seconds: Option<i64>,
}

/// Write every finish, in finish order, as CSV
pub fn write_finishes<W: Write>(race: &RaceManager, out: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    for finish in race.finishes() {
        let fleet = finish
            .fleet
            .and_then(|id| race.fleet_with_id(id))
            .map_or("", |f| f.name.as_str());
        let row = FinishRow {
            finish: finish.finish_id.0,
            clock_time: finish.finish_time.format("%H:%M:%S").to_string(),
            fleet,
            elapsed_seconds: race
                .elapsed_finish_time(finish.finish_id)
                .map(|elapsed| elapsed.num_seconds()),
        };
        writer.serialize(row).context("Failed to write finish row")?;
    }
    writer.flush().context("Failed to flush finishes")?;
    Ok(race.finishes().len())
}

pub fn export_finishes(race: &RaceManager, path: &Path) -> Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_finishes(race, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SequenceTiming;
    use crate::timer::ManualClock;
    use chrono::Duration;
    use std::rc::Rc;

    #[test]
    fn test_finish_sheet() {
        let clock = ManualClock::default();
        let mut race = RaceManager::new(SequenceTiming::default(), Rc::new(clock.clone())).unwrap();
        let lasers = race.create_fleet("Lasers").unwrap();
        race.create_fleet("Toppers").unwrap();
        race.start_race_sequence_without_warning().unwrap();

        // Lasers start 310s after noon
        clock.advance(Duration::seconds(310 + 1_234));
        let first = race.create_finish();
        clock.advance(Duration::seconds(5));
        race.create_finish();
        race.update_finish(first, Some(lasers)).unwrap();

        let mut out = Vec::new();
        assert_eq!(write_finishes(&race, &mut out).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "finish,clock_time,fleet,elapsed_seconds\n\
             1,12:25:44,Lasers,1234\n\
             2,12:25:49,,\n"
        );
    }
}
