use super::container::TimelineContainer;
use super::reconcile::fix_overlapping_map;
use crate::core::{ONE_SECOND, Result, Timestamp};
use crate::storage::EpgStore;
use log::debug;
use tracing::{Level, event, info_span};

impl TimelineContainer {
    /// Write pending deletions and changes to the store as one batch.
    ///
    /// Each dirty entry first evicts the stored rows inside its interval
    /// (narrowed by a second on both sides so neighbours survive) and is then
    /// upserted. The store's batch lock is released even when queueing
    /// fails; the first error is returned and nothing is rolled back.
    pub fn flush(&mut self) -> Result<()> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        if !self.needs_save() {
            return Ok(());
        }

        let span = info_span!(
            "timeline.flush",
            timeline_id = self.timeline_id,
            changed = self.changed.len(),
            deleted = self.deleted.len()
        );
        let _enter = span.enter();

        store.lock()?;
        let queued = self.queue_persist(store.as_ref());
        let released = store.unlock();

        if let Err(err) = &queued {
            event!(Level::ERROR, error = %err, "timeline flush failed");
        } else if let Err(err) = &released {
            event!(Level::ERROR, error = %err, "timeline flush unlock failed");
        } else {
            event!(Level::DEBUG, "timeline flushed");
        }

        queued.and(released)
    }

    fn queue_persist(&mut self, store: &dyn EpgStore) -> Result<()> {
        for entry in self.deleted.values() {
            store.queue_delete_entry(entry)?;
        }
        self.deleted.clear();

        if fix_overlapping_map(&mut self.changed) {
            self.tags_cache.invalidate();
        }

        for entry in self.changed.values() {
            store.queue_delete_by_min_end_max_start(
                self.timeline_id,
                entry.start() + ONE_SECOND,
                entry.end() - ONE_SECOND,
            )?;
            store.queue_upsert(entry)?;
        }

        self.changed.clear();
        self.tags_cache.invalidate();
        Ok(())
    }

    /// Drop every pending change and deletion without touching the store.
    pub fn discard(&mut self) {
        self.changed.clear();
        self.deleted.clear();
        self.tags_cache.invalidate();
    }

    /// Forget entries that ended before `cutoff`, in memory and in the store.
    pub fn purge_before(&mut self, cutoff: Timestamp) -> Result<()> {
        let expired: Vec<Timestamp> = self
            .changed
            .values()
            .filter(|e| e.end() < cutoff)
            .map(|e| e.start())
            .collect();

        if !expired.is_empty() {
            debug!(
                "Purging {} unsaved entries of timeline {} ending before {}",
                expired.len(),
                self.timeline_id,
                cutoff
            );
            for start in &expired {
                self.changed.remove(start);
                self.deleted.remove(start);
            }
            self.tags_cache.invalidate();
        }

        match &self.store {
            Some(store) => store.delete_entries_before(self.timeline_id, cutoff),
            None => Ok(()),
        }
    }

    /// Queue removal of every stored entry of this timeline and drop the
    /// overlays.
    pub fn queue_delete_all(&mut self) -> Result<()> {
        if let Some(store) = &self.store {
            store.queue_delete_all(self.timeline_id)?;
        }
        self.discard();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::{ChannelData, ProgramEntry, Timestamp};
    use crate::storage::{EpgStore, MemoryEpgStore, StoreStats};
    use crate::timeline::TimelineContainer;
    use chrono::DateTime;
    use std::sync::Arc;

    fn t(secs: i64) -> Timestamp {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn entry(start: i64, end: i64) -> ProgramEntry {
        ProgramEntry::new(1, t(start), t(end)).unwrap()
    }

    fn backed() -> (Arc<MemoryEpgStore>, TimelineContainer) {
        let store = Arc::new(MemoryEpgStore::new());
        let channel = Arc::new(ChannelData::new(10, "Ten"));
        let container = TimelineContainer::new(1, Some(channel), Some(store.clone()));
        (store, container)
    }

    #[test]
    fn test_flush_writes_and_clears() {
        let (store, mut container) = backed();
        container.apply_update(entry(0, 10).title("A")).unwrap();
        container.apply_update(entry(10, 20).title("B")).unwrap();

        container.flush().unwrap();
        assert!(!container.needs_save());

        let all = store.all_entries(1).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].details().title, "B");
        // stored rows carry no channel
        assert!(all[0].channel().is_none());
        assert_eq!(store.stats().batches, 1);
    }

    #[test]
    fn test_flush_clean_container_is_noop() {
        let (store, mut container) = backed();
        container.flush().unwrap();
        assert_eq!(store.stats(), StoreStats::default());

        let mut unbacked = TimelineContainer::unbacked(1, None);
        unbacked.apply_update(entry(0, 10)).unwrap();
        unbacked.flush().unwrap();
        assert!(unbacked.needs_save());
    }

    #[test]
    fn test_flush_evicts_overlapped_rows_keeps_neighbours() {
        let (store, mut container) = backed();
        for (s, e) in [(0, 10), (10, 20), (20, 30), (30, 40)] {
            store.queue_upsert(&entry(s, e)).unwrap();
        }

        container.apply_update(entry(12, 28).title("new")).unwrap();
        container.flush().unwrap();

        let spans: Vec<(i64, i64)> = store
            .all_entries(1)
            .unwrap()
            .iter()
            .map(|e| (e.start().timestamp(), e.end().timestamp()))
            .collect();
        assert_eq!(spans, vec![(0, 10), (12, 28), (30, 40)]);
    }

    #[test]
    fn test_flush_applies_deletions() {
        let (store, mut container) = backed();
        store.queue_upsert(&entry(0, 10)).unwrap();
        store.queue_upsert(&entry(10, 20)).unwrap();

        let stored = container.get_by_start(t(0)).unwrap().unwrap();
        container.apply_delete(stored);
        container.flush().unwrap();

        assert!(store.entry_by_start(1, t(0)).unwrap().is_none());
        assert!(store.entry_by_start(1, t(10)).unwrap().is_some());
    }

    #[test]
    fn test_flush_fixes_overlapping_overlay() {
        let (store, mut container) = backed();
        container.apply_update(entry(0, 20)).unwrap();
        container.apply_update(entry(10, 30)).unwrap();
        container.apply_update(entry(12, 18)).unwrap();
        container.flush().unwrap();

        let spans: Vec<(i64, i64)> = store
            .all_entries(1)
            .unwrap()
            .iter()
            .map(|e| (e.start().timestamp(), e.end().timestamp()))
            .collect();
        assert_eq!(spans, vec![(0, 10), (10, 30)]);
    }

    #[test]
    fn test_flush_rejected_upsert_still_unlocks() {
        let (store, mut container) = backed();
        container.apply_update(ProgramEntry::filler(None, 1, t(0), t(10))).unwrap();

        assert!(container.flush().is_err());
        // the batch was released
        store.lock().unwrap();
        store.unlock().unwrap();
    }

    #[test]
    fn test_discard_clears_both_overlays() {
        let (store, mut container) = backed();
        container.apply_update(entry(0, 10)).unwrap();
        container.apply_delete(entry(20, 30));

        container.discard();
        assert!(!container.needs_save());
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[test]
    fn test_purge_before() {
        let (store, mut container) = backed();
        store.queue_upsert(&entry(0, 10)).unwrap();
        store.queue_upsert(&entry(50, 60)).unwrap();
        container.apply_update(entry(10, 20)).unwrap();
        container.apply_update(entry(40, 50)).unwrap();

        container.purge_before(t(30)).unwrap();

        let dirty: Vec<_> = container.changed_entries().map(|e| e.start()).collect();
        assert_eq!(dirty, vec![t(40)]);
        assert!(store.entry_by_start(1, t(0)).unwrap().is_none());
        assert!(store.entry_by_start(1, t(50)).unwrap().is_some());
    }

    #[test]
    fn test_purge_drops_pending_deletion_at_purged_key() {
        let (_, mut container) = backed();
        container.apply_delete(entry(10, 20));
        container.apply_update(entry(10, 20).title("re-added")).unwrap();
        container.apply_delete(entry(0, 5));
        container.apply_delete(entry(40, 50));

        container.purge_before(t(30)).unwrap();

        assert_eq!(container.changed_entries().count(), 0);
        // deletions without a purged dirty entry stay queued
        let deleted: Vec<_> = container.deleted_entries().map(|e| e.start()).collect();
        assert_eq!(deleted, vec![t(0), t(40)]);
    }

    #[test]
    fn test_queue_delete_all() {
        let (store, mut container) = backed();
        store.queue_upsert(&entry(0, 10)).unwrap();
        container.apply_update(entry(10, 20)).unwrap();

        container.queue_delete_all().unwrap();
        assert!(!container.needs_save());
        assert!(container.is_empty().unwrap());
        assert!(!store.has_entries(1).unwrap());
    }
}
