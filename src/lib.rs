// ============================================================================
// EPG Timeline Library
// ============================================================================

pub mod config;
pub mod core;
pub mod storage;
pub mod timeline;

// Re-export main types for convenience
pub use config::EpgConfig;
pub use core::{ChannelData, EpgError, ProgramDetails, ProgramEntry, Result, SharedEntry, Timestamp};
pub use storage::{EpgStore, MemoryEpgStore};
pub use timeline::{ActiveTagCache, TagsCache, TimelineContainer};
