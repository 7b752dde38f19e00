use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::hardware::relay_interface::{
    outputs_to_mask, RelayConfig, RelayInterface, RelayResult, RelayStatus,
};
use crate::hardware::LampOutputs;

/// EasyDAQ USB relay card (USB8PR / USB4PR style boards)
///
/// The card speaks a two byte protocol on its virtual serial port: a command
/// letter followed by a value. `B` sets the direction of port B (0 = all
/// outputs) and `C` writes the port B relay mask.
pub struct EasyDaqRelay {
    /// Serial port path
    name: String,
    status: RelayStatus,
    port: Option<tokio_serial::SerialStream>,
}

impl EasyDaqRelay {
    pub fn new(port_name: &str) -> Self {
        debug!("Creating EasyDaqRelay for port: {}", port_name);
        Self {
            name: port_name.to_string(),
            status: RelayStatus::Disconnected,
            port: None,
        }
    }

    /// Serial ports present on this machine
    pub fn list_serial_ports() -> Vec<String> {
        let ports = tokio_serial::available_ports().unwrap_or_default();
        debug!("Found {} serial ports", ports.len());
        ports.into_iter().map(|p| p.port_name).collect()
    }

    /// Configure every line of port B as an output
    fn build_configure_command() -> Vec<u8> {
        vec![b'B', 0x00]
    }

    fn build_write_command(outputs: LampOutputs) -> Vec<u8> {
        vec![b'C', outputs_to_mask(outputs)]
    }

    async fn write_command(port: &mut tokio_serial::SerialStream, cmd: &[u8]) -> RelayResult<()> {
        debug!("Sending relay command: {:02X?}", cmd);
        port.write_all(cmd)
            .await
            .map_err(|e| format!("Failed to write command: {}", e))?;
        port.flush()
            .await
            .map_err(|e| format!("Failed to flush command: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl RelayInterface for EasyDaqRelay {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> RelayStatus {
        self.status
    }

    async fn connect(&mut self, config: RelayConfig) -> RelayResult<()> {
        info!("Connecting to relay on {} at {} baud", self.name, config.baud_rate);
        self.status = RelayStatus::Connecting;

        let mut port = match tokio_serial::new(&self.name, config.baud_rate)
            .timeout(Duration::from_millis(500))
            .open_native_async()
        {
            Ok(port) => port,
            Err(e) => {
                self.status = RelayStatus::Error;
                return Err(format!("Failed to open serial port {}: {}", self.name, e).into());
            }
        };

        if let Err(e) = Self::write_command(&mut port, &Self::build_configure_command()).await {
            self.status = RelayStatus::Error;
            return Err(e);
        }
        // the card needs a moment after a direction change
        tokio::time::sleep(Duration::from_millis(50)).await;

        self.port = Some(port);
        self.status = RelayStatus::Connected;
        info!("Relay on {} ready", self.name);
        Ok(())
    }

    async fn disconnect(&mut self) -> RelayResult<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = Self::write_command(&mut port, &Self::build_write_command([false; 5])).await {
                warn!("Could not switch lamps off before closing {}: {}", self.name, e);
            }
        }
        self.status = RelayStatus::Disconnected;
        info!("Relay on {} closed", self.name);
        Ok(())
    }

    async fn set_outputs(&mut self, outputs: LampOutputs) -> RelayResult<()> {
        let port = self.port.as_mut().ok_or("Not connected")?;
        if let Err(e) = Self::write_command(port, &Self::build_write_command(outputs)).await {
            self.status = RelayStatus::Error;
            self.port = None;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_encoding() {
        assert_eq!(EasyDaqRelay::build_configure_command(), vec![b'B', 0]);
        assert_eq!(
            EasyDaqRelay::build_write_command([true, true, false, false, false]),
            vec![b'C', 0x03]
        );
        assert_eq!(EasyDaqRelay::build_write_command([false; 5]), vec![b'C', 0]);
    }

    #[tokio::test]
    async fn test_set_outputs_requires_connection() {
        let mut relay = EasyDaqRelay::new("/dev/ttyUSB-missing");
        assert_eq!(relay.status(), RelayStatus::Disconnected);
        assert!(relay.set_outputs([true; 5]).await.is_err());
    }
}
