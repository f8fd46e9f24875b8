use crate::core::{ProgramEntry, Result, SharedEntry, Timestamp};

/// Backing store for program entries, keyed by timeline id.
///
/// Range queries are inclusive on both bounds:
/// - "min end / max start": `end >= min_end && start <= max_start`
/// - "min start / max end": `start >= min_start && end <= max_end`
///
/// Results are ordered by start time. `queue_*` operations may be deferred
/// until [`EpgStore::unlock`] when issued inside a `lock`/`unlock` batch;
/// readers must never observe half of a batch.
pub trait EpgStore: Send + Sync {
    /// Entries intersecting `[min_end, max_start]`.
    fn entries_by_min_end_max_start(
        &self,
        timeline_id: i32,
        min_end: Timestamp,
        max_start: Timestamp,
    ) -> Result<Vec<SharedEntry>>;

    /// Entries lying fully inside `[min_start, max_end]`.
    fn entries_by_min_start_max_end(
        &self,
        timeline_id: i32,
        min_start: Timestamp,
        max_end: Timestamp,
    ) -> Result<Vec<SharedEntry>>;

    fn all_entries(&self, timeline_id: i32) -> Result<Vec<SharedEntry>>;

    fn entry_by_start(&self, timeline_id: i32, start: Timestamp) -> Result<Option<SharedEntry>>;

    fn entry_by_broadcast_id(&self, timeline_id: i32, unique_broadcast_id: u32)
    -> Result<Option<SharedEntry>>;

    fn entry_by_persisted_id(&self, timeline_id: i32, persisted_id: i64)
    -> Result<Option<SharedEntry>>;

    /// Entry with `start <= time < end`.
    fn entry_by_active_time(&self, timeline_id: i32, time: Timestamp)
    -> Result<Option<SharedEntry>>;

    /// Latest-ending entry with `end <= max_end`.
    fn entry_by_max_end_time(&self, timeline_id: i32, max_end: Timestamp)
    -> Result<Option<SharedEntry>>;

    /// Earliest-starting entry with `start >= min_start`.
    fn entry_by_min_start_time(
        &self,
        timeline_id: i32,
        min_start: Timestamp,
    ) -> Result<Option<SharedEntry>>;

    fn has_entries(&self, timeline_id: i32) -> Result<bool>;

    /// Latest end time of any entry of the timeline.
    fn last_end_time(&self, timeline_id: i32) -> Result<Option<Timestamp>>;

    /// Greatest end time `<= max_end`.
    fn max_end_time(&self, timeline_id: i32, max_end: Timestamp) -> Result<Option<Timestamp>>;

    /// Smallest start time `>= min_start`.
    fn min_start_time(&self, timeline_id: i32, min_start: Timestamp) -> Result<Option<Timestamp>>;

    /// Remove every entry ending before `cutoff`. Applied immediately.
    fn delete_entries_before(&self, timeline_id: i32, cutoff: Timestamp) -> Result<()>;

    fn queue_delete_by_min_end_max_start(
        &self,
        timeline_id: i32,
        min_end: Timestamp,
        max_start: Timestamp,
    ) -> Result<()>;

    /// Delete by persisted id. Entries without one are ignored.
    fn queue_delete_entry(&self, entry: &ProgramEntry) -> Result<()>;

    fn queue_delete_all(&self, timeline_id: i32) -> Result<()>;

    /// Insert or replace. Assigns a persisted id when the entry has none.
    fn queue_upsert(&self, entry: &ProgramEntry) -> Result<()>;

    /// Begin an exclusive batch. Blocks while another batch is open.
    fn lock(&self) -> Result<()>;

    /// Apply everything queued since [`EpgStore::lock`] and end the batch.
    fn unlock(&self) -> Result<()>;
}
