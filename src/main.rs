mod audio;
mod config;
mod console;
mod controllers;
mod core;
mod hardware;
mod persistence;
mod timer;

use anyhow::Context;
use clap::Parser;
use std::rc::Rc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use audio::{AudioManager, CommandPlayer};
use config::{CliOptions, StationConfig};
use console::{Console, Outcome};
use controllers::{SignalClips, Station};
use crate::core::RaceManager;
use hardware::{EasyDaqRelay, LightsManager, MockRelay, RelayInterface, SignalLights};
use persistence::{recover_race, RecoveryManager};
use timer::{Clock, SystemClock, TimerQueue};

/// Longest the control loop sleeps, so relay notices show up promptly
const MAX_IDLE: Duration = Duration::from_millis(250);

type InputLines = Lines<BufReader<Stdin>>;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = CliOptions::parse();
    if options.list_ports {
        for port in EasyDaqRelay::list_serial_ports() {
            println!("{}", port);
        }
        return Ok(());
    }
    let config = StationConfig::from_cli(&options).context("Failed to load configuration")?;
    let mock_lights = options.mock_lights;
    if config.training.enabled {
        info!("Running in training mode at speed {}", config.speed_ratio());
    } else {
        info!("Running in race mode at standard speed");
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    rt.block_on(run(config, mock_lights))
}

/// Ask whether to pick up a race left behind by a crash
async fn load_race(
    config: &StationConfig,
    clock: Rc<dyn Clock>,
    lines: &mut InputLines,
) -> anyhow::Result<RaceManager> {
    let timing = config.sequence_timing();
    let path = &config.persistence.recovery_file;
    if config.persistence.enabled && path.exists() {
        println!("Crash detected: {} is still present.", path.display());
        println!("Do you want to recover? (y/n)");
        let answer = lines.next_line().await?.unwrap_or_default();
        if matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            if let Some(race) = recover_race(path, clock.clone(), &timing) {
                return Ok(race);
            }
            println!("The recovery file could not be used, starting a fresh race.");
        }
    }
    Ok(RaceManager::new(timing, clock)?)
}

async fn run(config: StationConfig, mock_lights: bool) -> anyhow::Result<()> {
    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let race = load_race(&config, clock.clone(), &mut lines).await?;

    let audio = Rc::new(AudioManager::spawn(
        config.audio.clips.clone(),
        Box::new(CommandPlayer::new(
            &config.audio.player,
            config.audio.player_args.clone(),
        )),
    ));

    let lights = config.lights.enabled.then(|| {
        let relay: Box<dyn RelayInterface> = if mock_lights {
            Box::new(MockRelay::new("mock relay"))
        } else {
            Box::new(EasyDaqRelay::new(&config.lights.port))
        };
        info!("Lights enabled on {}", relay.name());
        Rc::new(LightsManager::spawn(relay, config.relay_config()))
    });

    let recovery = config
        .persistence
        .enabled
        .then(|| RecoveryManager::spawn(config.persistence.recovery_file.clone()));

    let clips = SignalClips {
        gun: config.audio.gun_clip.clone(),
        warning: config.audio.warning_clip.clone(),
    };
    let mut station = Station::new(
        race,
        TimerQueue::new(clock.clone()),
        audio.clone(),
        clips,
        lights.clone().map(|l| l as Rc<dyn SignalLights>),
    );

    if let Some(recovery) = &recovery {
        recovery.wire(station.race_mut());
        if let Err(e) = recovery.save(station.race()) {
            warn!("Failed to save initial snapshot: {:#}", e);
        }
    }
    station.resume();

    let relay = lights.clone();
    let mut console = Console::new(
        audio.clone(),
        Box::new(move || relay.as_ref().map(|l| l.status())),
        config.console.default_fleet_names.clone(),
    );
    println!("{}", console.status(station.race()));
    println!("Type 'help' for commands.");

    loop {
        let idle = station
            .timers()
            .time_until_next()
            .map_or(MAX_IDLE, |wait| wait.min(MAX_IDLE));

        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read console input")? {
                    Some(line) => match console.handle(&line, &mut station) {
                        Outcome::Continue(output) => {
                            for text in output {
                                println!("{}", text);
                            }
                        }
                        Outcome::Quit => break,
                    },
                    None => {
                        info!("Console input closed");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(idle) => {
                station.run_due();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }

        if let Some(lights) = &lights {
            for notice in lights.drain_notices() {
                println!("{}", notice);
            }
        }
    }

    info!("Shutting down");
    station.shutdown();
    if let Some(lights) = &lights {
        lights.shutdown().await;
    }
    if let Some(recovery) = &recovery {
        recovery.stop().await;
    }
    audio.shutdown().await;
    Ok(())
}
