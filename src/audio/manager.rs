use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{AudioCommand, ClipQueue};

/// Plays one audio file to completion
#[async_trait]
pub trait ClipPlayer: Send {
    async fn play(&mut self, path: &Path) -> anyhow::Result<()>;
}

/// Plays clips through an external program, e.g. `aplay horn.wav`
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }
}

#[async_trait]
impl ClipPlayer for CommandPlayer {
    async fn play(&mut self, path: &Path) -> anyhow::Result<()> {
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()
            .await?;
        if !status.success() {
            anyhow::bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}

/// Audio worker: a background task playing queued clips one after another
pub struct AudioManager {
    sender: mpsc::UnboundedSender<AudioCommand>,
    /// Commands sent but not yet completed
    queued: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AudioManager {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// `clips` maps symbolic names such as "gun" to wav files.
    pub fn spawn(clips: HashMap<String, PathBuf>, player: Box<dyn ClipPlayer>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));

        let worker = tokio::spawn(Self::run(receiver, clips, player, queued.clone()));

        Self {
            sender,
            queued,
            worker: Mutex::new(Some(worker)),
        }
    }

    async fn run(
        mut receiver: mpsc::UnboundedReceiver<AudioCommand>,
        clips: HashMap<String, PathBuf>,
        mut player: Box<dyn ClipPlayer>,
        queued: Arc<AtomicUsize>,
    ) {
        info!("Audio worker started with {} clips", clips.len());
        while let Some(command) = receiver.recv().await {
            match command {
                AudioCommand::PlayClip(name) => {
                    match clips.get(&name) {
                        Some(path) => {
                            debug!("Playing clip '{}'", name);
                            if let Err(e) = player.play(path).await {
                                warn!("Failed to play clip '{}': {:#}", name, e);
                            }
                        }
                        None => warn!("No audio file configured for clip '{}'", name),
                    }
                    queued.fetch_sub(1, Ordering::SeqCst);
                }
                AudioCommand::Stop => {
                    queued.fetch_sub(1, Ordering::SeqCst);
                    break;
                }
            }
        }
        info!("Audio worker stopped");
    }

    fn send(&self, command: AudioCommand) {
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(command).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            warn!("Audio worker is not running, dropping command");
        }
    }

    /// Let queued clips finish, then stop the worker
    pub async fn shutdown(&self) {
        self.send(AudioCommand::Stop);
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Audio worker ended abnormally: {}", e);
            }
        }
    }
}

impl ClipQueue for AudioManager {
    fn enqueue_clip(&self, name: &str) {
        self.send(AudioCommand::PlayClip(name.to_string()));
    }

    fn queue_length(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}
