pub mod manager;

pub use manager::{AudioManager, ClipPlayer, CommandPlayer};

/// Contract used by the signal policy to sound a clip.
///
/// Enqueueing never blocks; clips play one at a time in FIFO order.
pub trait ClipQueue {
    fn enqueue_clip(&self, name: &str);

    /// Clips waiting or playing
    fn queue_length(&self) -> usize;
}

/// Command processed by the audio worker
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    PlayClip(String),
    Stop,
}

#[cfg(test)]
pub use recording::RecordingClips;

#[cfg(test)]
mod recording {
    use super::ClipQueue;
    use std::cell::RefCell;

    /// Clip queue that only remembers what it was asked to play
    #[derive(Default)]
    pub struct RecordingClips {
        clips: RefCell<Vec<String>>,
    }

    impl RecordingClips {
        pub fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.clips.borrow_mut())
        }
    }

    impl ClipQueue for RecordingClips {
        fn enqueue_clip(&self, name: &str) {
            self.clips.borrow_mut().push(name.to_string());
        }

        fn queue_length(&self) -> usize {
            self.clips.borrow().len()
        }
    }
}
