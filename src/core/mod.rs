pub mod error;
pub mod events;
pub mod finish;
pub mod fleet;
pub mod race;
pub mod snapshot;
pub mod timing;

pub use error::{RaceError, RaceResult};
pub use events::{ChangeBus, EventKind, RaceEvent};
pub use finish::{Finish, FinishId};
pub use fleet::{Fleet, FleetId};
pub use race::{RaceManager, SequenceState};
pub use snapshot::RaceSnapshot;
pub use timing::SequenceTiming;
