pub mod relay_interface;
pub mod easydaq;
pub mod mock;
pub mod lights_manager;

pub use relay_interface::{RelayConfig, RelayInterface, RelayStatus};
pub use easydaq::EasyDaqRelay;
pub use mock::MockRelay;
pub use lights_manager::{LightsCommand, LightsManager};

/// State of the five signal lamps, lamp 0 first
pub type LampOutputs = [bool; 5];

pub const ALL_OFF: LampOutputs = [false; 5];

/// Contract used by the light display policy. Never blocks.
pub trait SignalLights {
    fn set_outputs(&self, outputs: LampOutputs);
}

#[cfg(test)]
pub use recording::RecordingLights;
