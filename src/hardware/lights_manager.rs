use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hardware::relay_interface::{RelayConfig, RelayInterface, RelayStatus};
use crate::hardware::{LampOutputs, SignalLights, ALL_OFF};

/// Command processed by the relay task
#[derive(Debug, Clone, PartialEq)]
pub enum LightsCommand {
    SetOutputs(LampOutputs),
    Stop,
}

/// Relay hardware manager: owns the relay board in a background task, keeps
/// it connected and mirrors the latest lamp pattern onto it
pub struct LightsManager {
    sender: mpsc::UnboundedSender<LightsCommand>,
    status: Arc<Mutex<RelayStatus>>,
    /// Human readable connection notices for the operator
    notices: Mutex<mpsc::UnboundedReceiver<String>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct RelayWorker {
    interface: Box<dyn RelayInterface>,
    config: RelayConfig,
    receiver: mpsc::UnboundedReceiver<LightsCommand>,
    status: Arc<Mutex<RelayStatus>>,
    notices: mpsc::UnboundedSender<String>,
    /// Pattern to show; replayed after every reconnect
    last: LampOutputs,
    connected: bool,
}

impl LightsManager {
    /// Spawn the relay task on the current tokio runtime
    pub fn spawn(interface: Box<dyn RelayInterface>, config: RelayConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (notice_sender, notice_receiver) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(RelayStatus::Disconnected));

        let worker = RelayWorker {
            interface,
            config,
            receiver,
            status: status.clone(),
            notices: notice_sender,
            last: ALL_OFF,
            connected: false,
        };
        let worker = tokio::spawn(worker.run());

        Self {
            sender,
            status,
            notices: Mutex::new(notice_receiver),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn status(&self) -> RelayStatus {
        self.status
            .lock()
            .map(|s| *s)
            .unwrap_or(RelayStatus::Error)
    }

    /// Connection notices published since the last call
    pub fn drain_notices(&self) -> Vec<String> {
        let mut drained = Vec::new();
        if let Ok(mut notices) = self.notices.lock() {
            while let Ok(notice) = notices.try_recv() {
                drained.push(notice);
            }
        }
        drained
    }

    /// Switch the lamps off, close the board and wait for the task to end
    pub async fn shutdown(&self) {
        if self.sender.send(LightsCommand::Stop).is_err() {
            debug!("Relay task already stopped");
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Relay task ended abnormally: {}", e);
            }
        }
    }
}

impl SignalLights for LightsManager {
    fn set_outputs(&self, outputs: LampOutputs) {
        if self.sender.send(LightsCommand::SetOutputs(outputs)).is_err() {
            warn!("Relay task is not running, dropping lamp pattern");
        }
    }
}

impl RelayWorker {
    async fn run(mut self) {
        info!("Relay task started for {}", self.interface.name());
        loop {
            if !self.connected && !self.reconnect().await {
                break;
            }
            match self.receiver.recv().await {
                Some(LightsCommand::SetOutputs(outputs)) => {
                    self.last = outputs;
                    self.write_last().await;
                }
                Some(LightsCommand::Stop) | None => break,
            }
        }
        self.close().await;
        info!("Relay task stopped");
    }

    fn set_status(&self, status: RelayStatus) {
        if let Ok(mut s) = self.status.lock() {
            *s = status;
        }
    }

    fn notify(&self, notice: String) {
        // nobody listening is fine
        let _ = self.notices.send(notice);
    }

    /// Connect, retrying until it works. Returns false if asked to stop meanwhile.
    async fn reconnect(&mut self) -> bool {
        loop {
            self.set_status(RelayStatus::Connecting);
            let name = self.interface.name().to_string();
            match self.interface.connect(self.config.clone()).await {
                Ok(()) => {
                    self.connected = true;
                    self.set_status(RelayStatus::Connected);
                    self.notify(format!("Lights connected on {}", name));
                    self.write_last().await;
                    if self.connected {
                        return true;
                    }
                    if !self.wait_before_retry().await {
                        return false;
                    }
                }
                Err(e) => {
                    warn!("Relay {} unavailable: {}", name, e);
                    self.set_status(RelayStatus::Error);
                    self.notify(format!("Lights unavailable on {}: {}", name, e));
                    if !self.wait_before_retry().await {
                        return false;
                    }
                }
            }
        }
    }

    /// Sleep for the reconnect delay while still taking in new patterns
    async fn wait_before_retry(&mut self) -> bool {
        let retry = tokio::time::sleep(Duration::from_millis(self.config.reconnect_delay_ms));
        tokio::pin!(retry);
        loop {
            tokio::select! {
                _ = &mut retry => return true,
                command = self.receiver.recv() => match command {
                    Some(LightsCommand::SetOutputs(outputs)) => self.last = outputs,
                    Some(LightsCommand::Stop) | None => return false,
                },
            }
        }
    }

    async fn write_last(&mut self) {
        if let Err(e) = self.interface.set_outputs(self.last).await {
            warn!("Failed to switch lamps: {}", e);
            self.connected = false;
            self.set_status(RelayStatus::Error);
            self.notify(format!("Lights lost on {}: {}", self.interface.name(), e));
        }
    }

    async fn close(&mut self) {
        if self.connected {
            self.last = ALL_OFF;
            self.write_last().await;
            if let Err(e) = self.interface.disconnect().await {
                warn!("Failed to close relay: {}", e);
            }
        }
        self.connected = false;
        self.set_status(RelayStatus::Disconnected);
        self.notify(format!("Lights disconnected from {}", self.interface.name()));
    }
}
