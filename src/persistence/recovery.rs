use anyhow::Context;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::{RaceManager, RaceSnapshot, SequenceTiming};
use crate::timer::Clock;

#[derive(Debug, Clone, PartialEq)]
enum RecoveryCommand {
    Save(String),
    /// Delete the snapshot and exit once everything before it is written
    Stop,
}

/// Keeps a crash recovery snapshot of the race on disk.
///
/// Every race event queues the full state; a background task writes it
/// through a temporary file and a rename, so a crash mid-write leaves the
/// previous snapshot intact. A snapshot still present at startup means the
/// last session did not shut down cleanly.
pub struct RecoveryManager {
    sender: mpsc::UnboundedSender<RecoveryCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RecoveryManager {
    pub fn spawn(path: PathBuf) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(Self::run(path, receiver));
        Self {
            sender,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Save a snapshot after every race event
    pub fn wire(&self, race: &mut RaceManager) {
        let sender = self.sender.clone();
        race.subscribe(None, "recovery", move |_, race| {
            let json = race.snapshot().to_json()?;
            sender
                .send(RecoveryCommand::Save(json))
                .map_err(|_| anyhow::anyhow!("recovery worker has stopped"))?;
            Ok(())
        });
    }

    /// Queue a snapshot outside of any event, e.g. right after a restore
    pub fn save(&self, race: &RaceManager) -> anyhow::Result<()> {
        let json = race.snapshot().to_json()?;
        self.sender
            .send(RecoveryCommand::Save(json))
            .map_err(|_| anyhow::anyhow!("recovery worker has stopped"))
    }

    /// Clean shutdown: remove the snapshot and wait for the worker
    pub async fn stop(&self) {
        if self.sender.send(RecoveryCommand::Stop).is_err() {
            debug!("Recovery worker already stopped");
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Recovery worker ended abnormally: {}", e);
            }
        }
    }

    async fn run(path: PathBuf, mut receiver: mpsc::UnboundedReceiver<RecoveryCommand>) {
        info!("Recovery snapshots go to {}", path.display());
        while let Some(command) = receiver.recv().await {
            match command {
                RecoveryCommand::Save(mut json) => {
                    // only the newest pending snapshot matters
                    let mut stop = false;
                    while let Ok(next) = receiver.try_recv() {
                        match next {
                            RecoveryCommand::Save(newer) => json = newer,
                            RecoveryCommand::Stop => {
                                stop = true;
                                break;
                            }
                        }
                    }
                    if let Err(e) = write_atomically(&path, &json).await {
                        error!("Failed to write recovery snapshot: {:#}", e);
                    }
                    if stop {
                        delete_snapshot(&path).await;
                        break;
                    }
                }
                RecoveryCommand::Stop => {
                    delete_snapshot(&path).await;
                    break;
                }
            }
        }
        info!("Recovery worker stopped");
    }
}

async fn write_atomically(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;
    debug!("Wrote recovery snapshot ({} bytes)", contents.len());
    Ok(())
}

async fn delete_snapshot(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Removed recovery snapshot {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove recovery snapshot: {}", e),
    }
}

/// Read a snapshot left behind by an earlier session, if there is one
pub fn load_snapshot(path: &Path) -> anyhow::Result<Option<RaceSnapshot>> {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    let snapshot = RaceSnapshot::from_json(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(snapshot))
}

/// Rebuild the race stored at `path`. Unreadable or invalid snapshots are
/// logged and give `None`, so the caller starts a fresh race.
pub fn recover_race(
    path: &Path,
    clock: Rc<dyn Clock>,
    configured: &SequenceTiming,
) -> Option<RaceManager> {
    let snapshot = match load_snapshot(path) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => return None,
        Err(e) => {
            warn!("Ignoring recovery snapshot: {:#}", e);
            return None;
        }
    };
    if snapshot.timing != *configured {
        warn!(
            "Recovered race uses {:?}, configuration says {:?}; keeping the recovered timing",
            snapshot.timing, configured
        );
    }
    match RaceManager::from_snapshot(snapshot, clock) {
        Ok(race) => {
            info!(
                "Recovered race with {} fleets and {} finishes",
                race.fleets().len(),
                race.finishes().len()
            );
            Some(race)
        }
        Err(e) => {
            warn!("Ignoring recovery snapshot: {}", e);
            None
        }
    }
}
