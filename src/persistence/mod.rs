pub mod export;
pub mod recovery;

pub use export::{export_finishes, write_finishes};
pub use recovery::{load_snapshot, recover_race, RecoveryManager};
