use async_trait::async_trait;
use std::error::Error;

use crate::hardware::LampOutputs;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Serial settings for a relay board
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Baud rate of the USB serial link
    pub baud_rate: u32,
    /// Time to wait before reopening a port that failed
    pub reconnect_delay_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            reconnect_delay_ms: 2000,
        }
    }
}

/// Status of a relay interface
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelayStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Trait for relay boards driving the signal lamps
///
/// Implemented by:
/// - EasyDAQ USB relay cards
/// - Mock boards for testing
#[async_trait]
pub trait RelayInterface: Send {
    /// Name of the interface (serial port path for real boards)
    fn name(&self) -> &str;

    fn status(&self) -> RelayStatus;

    /// Open the board and configure its lamp outputs
    async fn connect(&mut self, config: RelayConfig) -> RelayResult<()>;

    async fn disconnect(&mut self) -> RelayResult<()>;

    /// Switch the five lamps; index 0 is the first lamp
    async fn set_outputs(&mut self, outputs: LampOutputs) -> RelayResult<()>;
}

/// Pack lamp states into a relay bit mask, lamp 0 in bit 0
pub fn outputs_to_mask(outputs: LampOutputs) -> u8 {
    outputs
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .fold(0u8, |mask, (bit, _)| mask | (1 << bit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_to_mask() {
        assert_eq!(outputs_to_mask([false; 5]), 0x00);
        assert_eq!(outputs_to_mask([true; 5]), 0x1F);
        assert_eq!(outputs_to_mask([true, false, false, false, false]), 0x01);
        assert_eq!(outputs_to_mask([true, true, true, false, false]), 0x07);
        assert_eq!(outputs_to_mask([false, false, false, false, true]), 0x10);
    }
}
