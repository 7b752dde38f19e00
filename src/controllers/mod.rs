pub mod gun;
pub mod lights;
pub mod station;

pub use gun::{GunController, SignalClips};
pub use lights::LightsController;
pub use station::Station;
