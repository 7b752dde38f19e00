use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::hardware::relay_interface::{RelayConfig, RelayInterface, RelayResult, RelayStatus};
use crate::hardware::LampOutputs;

/// Relay board that only records what it was told to do
///
/// Clones share the recorded writes, so a test can keep one clone while the
/// lights manager owns the other.
#[derive(Clone)]
pub struct MockRelay {
    name: String,
    status: RelayStatus,
    writes: Arc<Mutex<Vec<LampOutputs>>>,
    /// Number of upcoming `connect` calls that fail
    failing_connects: Arc<Mutex<u32>>,
    /// Number of upcoming `set_outputs` calls that fail
    failing_writes: Arc<Mutex<u32>>,
}

impl MockRelay {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: RelayStatus::Disconnected,
            writes: Arc::new(Mutex::new(Vec::new())),
            failing_connects: Arc::new(Mutex::new(0)),
            failing_writes: Arc::new(Mutex::new(0)),
        }
    }

    /// Make the next `count` connection attempts fail
    pub fn fail_connects(&self, count: u32) {
        if let Ok(mut n) = self.failing_connects.lock() {
            *n = count;
        }
    }

    /// Make the next `count` writes fail, as if the cable was pulled
    pub fn fail_writes(&self, count: u32) {
        if let Ok(mut n) = self.failing_writes.lock() {
            *n = count;
        }
    }

    /// Every pattern written so far
    pub fn writes(&self) -> Vec<LampOutputs> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn take_failure(counter: &Mutex<u32>) -> bool {
        match counter.lock() {
            Ok(mut n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl RelayInterface for MockRelay {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> RelayStatus {
        self.status
    }

    async fn connect(&mut self, _config: RelayConfig) -> RelayResult<()> {
        if Self::take_failure(&self.failing_connects) {
            self.status = RelayStatus::Error;
            return Err(format!("No such device: {}", self.name).into());
        }
        self.status = RelayStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> RelayResult<()> {
        self.status = RelayStatus::Disconnected;
        Ok(())
    }

    async fn set_outputs(&mut self, outputs: LampOutputs) -> RelayResult<()> {
        if self.status != RelayStatus::Connected {
            return Err("Not connected".into());
        }
        if Self::take_failure(&self.failing_writes) {
            self.status = RelayStatus::Error;
            return Err("Write failed".into());
        }
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(outputs);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_relay_connect() {
        let mut relay = MockRelay::new("mock0");
        assert_eq!(relay.status(), RelayStatus::Disconnected);

        relay.connect(RelayConfig::default()).await.unwrap();
        assert_eq!(relay.status(), RelayStatus::Connected);

        relay.disconnect().await.unwrap();
        assert_eq!(relay.status(), RelayStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_mock_relay_records_writes() {
        let mut relay = MockRelay::new("mock0");
        let probe = relay.clone();
        assert!(relay.set_outputs([true; 5]).await.is_err());

        relay.connect(RelayConfig::default()).await.unwrap();
        relay.set_outputs([true; 5]).await.unwrap();
        relay.set_outputs([false; 5]).await.unwrap();
        assert_eq!(probe.writes(), vec![[true; 5], [false; 5]]);
    }

    #[tokio::test]
    async fn test_mock_relay_failures() {
        let mut relay = MockRelay::new("mock0");
        relay.fail_connects(1);
        assert!(relay.connect(RelayConfig::default()).await.is_err());
        assert_eq!(relay.status(), RelayStatus::Error);
        relay.connect(RelayConfig::default()).await.unwrap();

        relay.fail_writes(1);
        assert!(relay.set_outputs([true; 5]).await.is_err());
        assert_eq!(relay.status(), RelayStatus::Error);
        assert!(relay.writes().is_empty());
    }
}
