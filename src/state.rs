pub mod generation;
pub mod session;
pub mod snapshots;
pub mod versioned;

pub use generation::{
    EpochCounter, GenerationHandle, GenerationState, GenerationUpdate, ResponseAggregator,
};
pub use session::{EditSession, SessionMode};
pub use snapshots::{HistoryError, Snapshot, SnapshotStore};
pub use versioned::{HistoryStatus, VersionedBuffer};
