pub mod engine;
pub mod memory;
pub mod persistence;

pub use engine::EpgStore;
pub use memory::{MemoryEpgStore, StoreStats};
pub use persistence::{SnapshotManager, StoreSnapshot};
