// ============================================================================
// Timeline Container
// ============================================================================
//
// Per-timeline view over an EpgStore with a dirty overlay:
// - container: overlays, updates, deletes, batch merge, lookups
// - assembler: gapless timeline and full entry listing
// - writeback: flush / discard / purge
// - reconcile: interval conflict resolution shared by all of the above
// - cache: now / last / next entries
//
// ============================================================================

mod assembler;
pub mod cache;
mod container;
pub mod reconcile;
mod writeback;

pub use cache::{ActiveTagCache, ActiveTagSource, TagsCache};
pub use container::TimelineContainer;
