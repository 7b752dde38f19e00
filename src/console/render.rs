use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::core::{Finish, Fleet, RaceManager};
use crate::hardware::RelayStatus;

/// Whole virtual seconds relative to the start, shown a second early so the
/// display reads 0:00:00 as the gun goes
pub fn integer_adjusted_delta(fleet: &Fleet, now: DateTime<Utc>, test_speed_ratio: u32) -> Option<i64> {
    fleet
        .adjusted_delta_seconds_to_start_time(now, test_speed_ratio)
        .map(|delta| (delta - 1.0).trunc() as i64)
}

/// `H:MM:SS`, negative while counting down; `-` without a start time
pub fn render_delta_to_start_time(fleet: &Fleet, now: DateTime<Utc>, test_speed_ratio: u32) -> String {
    match integer_adjusted_delta(fleet, now, test_speed_ratio) {
        Some(delta) => {
            let secs = delta.abs();
            let hms = format!("{}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60);
            if delta < 0 {
                format!("-{}", hms)
            } else {
                hms
            }
        }
        None => "-".to_string(),
    }
}

pub fn render_finish_fleet(race: &RaceManager, finish: &Finish) -> String {
    finish
        .fleet
        .and_then(|id| race.fleet_with_id(id))
        .map_or_else(|| "-".to_string(), |f| f.name.clone())
}

pub fn render_finish_elapsed_time(race: &RaceManager, finish: &Finish) -> String {
    race.elapsed_finish_time(finish.finish_id)
        .map_or_else(|| "-".to_string(), |elapsed| elapsed.num_seconds().to_string())
}

pub fn render_relay_status(status: Option<RelayStatus>) -> &'static str {
    match status {
        None => "not fitted",
        Some(RelayStatus::Disconnected) => "disconnected",
        Some(RelayStatus::Connecting) => "connecting",
        Some(RelayStatus::Connected) => "connected",
        Some(RelayStatus::Error) => "error",
    }
}

/// Full status screen
pub fn render_status(race: &RaceManager, gun_queue: usize, relay: Option<RelayStatus>) -> String {
    let now = race.now();
    let ratio = race.test_speed_ratio();
    let mut out = String::new();

    let _ = writeln!(out, "Clock {}   Gun Q : {}   Lights: {}", now.format("%H:%M:%S"), gun_queue, render_relay_status(relay));
    if ratio > 1 {
        let _ = writeln!(out, "TRAINING MODE x{}", ratio);
    }

    let _ = writeln!(out, "{:<4} {:<20} {:>10} {:>8}  {}", "Id", "Fleet", "Start", "Seconds", "Status");
    for fleet in race.fleets() {
        let seconds = integer_adjusted_delta(fleet, now, ratio)
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        let _ = writeln!(
            out,
            "{:<4} {:<20} {:>10} {:>8}  {}",
            fleet.fleet_id,
            fleet.name,
            render_delta_to_start_time(fleet, now, ratio),
            seconds,
            fleet.status(now)
        );
    }
    if race.general_recall_available() {
        let _ = writeln!(out, "General recall available");
    }

    if !race.finishes().is_empty() {
        let _ = writeln!(out, "{:<4} {:<10} {:<20} {:>8}", "Id", "Time", "Fleet", "Elapsed");
        for finish in race.finishes() {
            let _ = writeln!(
                out,
                "{:<4} {:<10} {:<20} {:>8}",
                finish.finish_id,
                finish.finish_time.format("%H:%M:%S"),
                render_finish_fleet(race, finish),
                render_finish_elapsed_time(race, finish)
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FleetId, SequenceTiming};
    use crate::timer::{Clock, ManualClock};
    use chrono::Duration;
    use std::rc::Rc;

    #[test]
    fn test_render_delta() {
        let clock = ManualClock::default();
        let mut fleet = Fleet::new(FleetId(1), "Lasers");
        assert_eq!(render_delta_to_start_time(&fleet, clock.now(), 1), "-");

        fleet.start_time = Some(clock.now() + Duration::seconds(310));
        // -310 - 1
        assert_eq!(render_delta_to_start_time(&fleet, clock.now(), 1), "-0:05:11");
        clock.advance_millis(309_500);
        // -0.5 - 1 truncates to -1
        assert_eq!(render_delta_to_start_time(&fleet, clock.now(), 1), "-0:00:01");
        clock.advance_millis(1_000);
        // 0.5 - 1 truncates to 0
        assert_eq!(render_delta_to_start_time(&fleet, clock.now(), 1), "0:00:00");
        clock.advance(Duration::seconds(3_700));
        assert_eq!(render_delta_to_start_time(&fleet, clock.now(), 1), "1:01:39");
    }

    #[test]
    fn test_render_delta_in_training() {
        let clock = ManualClock::default();
        let mut fleet = Fleet::new(FleetId(1), "Lasers");
        fleet.start_time = Some(clock.now() + Duration::seconds(62));
        // 62 real seconds are 310 virtual at ratio 5
        assert_eq!(render_delta_to_start_time(&fleet, clock.now(), 5), "-0:05:11");
    }

    #[test]
    fn test_status_screen() {
        let clock = ManualClock::default();
        let mut race = RaceManager::new(SequenceTiming::default(), Rc::new(clock.clone())).unwrap();
        let lasers = race.create_fleet("Lasers").unwrap();
        race.create_fleet("Toppers").unwrap();
        race.start_race_sequence_without_warning().unwrap();
        clock.advance(Duration::seconds(320));
        let finish = race.create_finish();
        race.create_finish();
        race.update_finish(finish, Some(lasers)).unwrap();

        let status = render_status(&race, 2, Some(RelayStatus::Connected));
        assert!(status.starts_with("Clock 12:05:20   Gun Q : 2   Lights: connected"));
        assert!(status.contains("0:00:09"));
        assert!(status.contains("Started"));
        assert!(status.contains("-0:04:51"));
        assert!(status.contains("General recall available"));
        assert!(!status.contains("TRAINING"));
        let last = status.lines().last().unwrap();
        assert!(last.starts_with("2 "));
        assert!(last.trim_end().ends_with('-'));
    }
}
