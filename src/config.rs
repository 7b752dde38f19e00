//! Station configuration: a JSON file plus a few command line overrides.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::{RaceError, SequenceTiming};
use crate::hardware::RelayConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "startline", version, about = "Start line signals for dinghy racing")]
pub struct CliOptions {
    /// Path to the station configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run in training mode, speeding the sequence up by this ratio
    #[arg(short, long)]
    pub training_speed: Option<u32>,

    /// Leave the signal lights alone even if the configuration enables them
    #[arg(long, conflicts_with = "mock_lights")]
    pub no_lights: bool,

    /// Drive a simulated relay board instead of the serial one
    #[arg(long)]
    pub mock_lights: bool,

    /// Print the serial ports a relay board could be on, then exit
    #[arg(long)]
    pub list_ports: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Timing(#[from] RaceError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub enabled: bool,
    pub speed_ratio: u32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            speed_ratio: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub countdown_secs: u32,
    pub stagger_secs: u32,
    pub warning_lead_secs: u32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        let timing = SequenceTiming::default();
        Self {
            countdown_secs: timing.countdown_secs,
            stagger_secs: timing.stagger_secs,
            warning_lead_secs: timing.warning_lead_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightsConfig {
    pub enabled: bool,
    /// Serial port of the EasyDAQ card
    pub port: String,
    pub baud_rate: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for LightsConfig {
    fn default() -> Self {
        let relay = RelayConfig::default();
        Self {
            enabled: false,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: relay.baud_rate,
            reconnect_delay_ms: relay.reconnect_delay_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Program that plays one wav file and exits
    pub player: String,
    pub player_args: Vec<String>,
    /// Clip name to wav file
    pub clips: HashMap<String, PathBuf>,
    pub gun_clip: String,
    pub warning_clip: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            player: "aplay".to_string(),
            player_args: vec!["-q".to_string()],
            clips: HashMap::from([
                ("gun".to_string(), PathBuf::from("sounds/gun.wav")),
                ("warning".to_string(), PathBuf::from("sounds/warning.wav")),
            ]),
            gun_clip: "gun".to_string(),
            warning_clip: "warning".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub recovery_file: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            enabled: true,
            recovery_file: base.join("startline").join("recovery.json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Names offered when adding a fleet without a name
    pub default_fleet_names: Vec<String>,
}

/// Everything one start line station needs to know
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub training: TrainingConfig,
    pub sequence: SequenceConfig,
    pub lights: LightsConfig,
    pub audio: AudioConfig,
    pub persistence: PersistenceConfig,
    pub console: ConsoleConfig,
}

impl StationConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("startline").join("startline.json"))
    }

    /// Load the file at `path`; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the configuration for this run: file, then command line overrides
    pub fn from_cli(options: &CliOptions) -> Result<Self, ConfigError> {
        let mut config = match options.config.clone().or_else(Self::default_path) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        if let Some(speed) = options.training_speed {
            config.training.enabled = true;
            config.training.speed_ratio = speed;
        }
        if options.no_lights {
            config.lights.enabled = false;
        }
        if options.mock_lights {
            config.lights.enabled = true;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sequence_timing().validate()?;
        if self.lights.enabled && self.lights.port.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "lights are enabled but no serial port is set".to_string(),
            ));
        }
        for clip in [&self.audio.gun_clip, &self.audio.warning_clip] {
            if !self.audio.clips.contains_key(clip) {
                warn!("No wav file configured for clip '{}'", clip);
            }
        }
        Ok(())
    }

    pub fn speed_ratio(&self) -> u32 {
        if self.training.enabled {
            self.training.speed_ratio
        } else {
            1
        }
    }

    pub fn sequence_timing(&self) -> SequenceTiming {
        SequenceTiming {
            test_speed_ratio: self.speed_ratio(),
            countdown_secs: self.sequence.countdown_secs,
            stagger_secs: self.sequence.stagger_secs,
            warning_lead_secs: self.sequence.warning_lead_secs,
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            baud_rate: self.lights.baud_rate,
            reconnect_delay_ms: self.lights.reconnect_delay_ms,
        }
    }
}
