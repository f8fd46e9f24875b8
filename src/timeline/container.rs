use super::cache::{ActiveTagCache, ActiveTagSource, TagsCache};
use super::reconcile::resolve_conflict;
use crate::core::{ChannelData, ONE_SECOND, Result, SharedEntry, Timestamp};
use crate::storage::EpgStore;
use log::warn;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Entries of one timeline: the store's rows plus an in-memory overlay of
/// changes and deletions not yet written back.
///
/// One writer at a time: mutating operations take `&mut self`. Without a
/// store the container works from its overlay alone and serves no
/// timelines.
pub struct TimelineContainer {
    pub(super) timeline_id: i32,
    pub(super) channel: Option<Arc<ChannelData>>,
    pub(super) store: Option<Arc<dyn EpgStore>>,
    pub(super) tags_cache: Arc<dyn ActiveTagCache>,
    /// Created or modified entries, keyed by start
    pub(super) changed: BTreeMap<Timestamp, SharedEntry>,
    /// Entries awaiting deletion from the store, keyed by start
    pub(super) deleted: BTreeMap<Timestamp, SharedEntry>,
}

impl TimelineContainer {
    pub fn new(
        timeline_id: i32,
        channel: Option<Arc<ChannelData>>,
        store: Option<Arc<dyn EpgStore>>,
    ) -> Self {
        let tags_cache = Arc::new(TagsCache::new(channel.clone()));
        Self {
            timeline_id,
            channel,
            store,
            tags_cache,
            changed: BTreeMap::new(),
            deleted: BTreeMap::new(),
        }
    }

    /// Memory-only container, e.g. to collect a batch for [`Self::merge_batch`].
    pub fn unbacked(timeline_id: i32, channel: Option<Arc<ChannelData>>) -> Self {
        Self::new(timeline_id, channel, None)
    }

    pub fn with_tags_cache(mut self, tags_cache: Arc<dyn ActiveTagCache>) -> Self {
        tags_cache.set_channel_data(self.channel.clone());
        self.tags_cache = tags_cache;
        self
    }

    pub fn timeline_id(&self) -> i32 {
        self.timeline_id
    }

    pub fn channel(&self) -> Option<&Arc<ChannelData>> {
        self.channel.as_ref()
    }

    pub fn is_backed(&self) -> bool {
        self.store.is_some()
    }

    pub fn tags_cache(&self) -> &Arc<dyn ActiveTagCache> {
        &self.tags_cache
    }

    /// Dirty entries in start order.
    pub fn changed_entries(&self) -> impl Iterator<Item = &SharedEntry> {
        self.changed.values()
    }

    /// Entries queued for deletion in start order.
    pub fn deleted_entries(&self) -> impl Iterator<Item = &SharedEntry> {
        self.deleted.values()
    }

    /// Move the container and its unsaved entries to another timeline id.
    pub fn set_timeline_id(&mut self, timeline_id: i32) {
        self.timeline_id = timeline_id;
        for entry in self.changed.values_mut().chain(self.deleted.values_mut()) {
            Arc::make_mut(entry).set_timeline_id(timeline_id);
        }
    }

    pub fn set_channel_data(&mut self, channel: Option<Arc<ChannelData>>) {
        self.channel = channel;
        self.tags_cache.set_channel_data(self.channel.clone());
        for entry in self.changed.values_mut() {
            Arc::make_mut(entry).set_channel(self.channel.clone());
        }
    }

    pub(super) fn stamp(&self, entry: &mut SharedEntry) {
        if entry.channel() != self.channel.as_ref() {
            Arc::make_mut(entry).set_channel(self.channel.clone());
        }
    }

    fn stamp_owned(&self, entry: &mut SharedEntry) {
        self.stamp(entry);
        if entry.timeline_id() != self.timeline_id {
            Arc::make_mut(entry).set_timeline_id(self.timeline_id);
        }
    }

    fn stamped(&self, entry: Option<SharedEntry>) -> Option<SharedEntry> {
        entry.map(|mut e| {
            self.stamp(&mut e);
            e
        })
    }

    // ========================================================================
    // Dirty state
    // ========================================================================

    /// Merge one incoming entry with whatever exists at its start time.
    ///
    /// Returns whether the overlay changed. An update identical in content to
    /// the existing entry leaves everything untouched.
    pub fn apply_update(&mut self, entry: impl Into<SharedEntry>) -> Result<bool> {
        let mut entry = entry.into();
        self.stamp_owned(&mut entry);
        let start = entry.start();

        if let Some(existing) = self.changed.get_mut(&start) {
            let changed = Arc::make_mut(existing).update(&entry, false);
            if changed {
                self.tags_cache.invalidate();
            }
            return Ok(changed);
        }

        let persisted = match &self.store {
            Some(store) => store.entry_by_start(self.timeline_id, start)?,
            None => None,
        };

        match persisted {
            Some(mut existing) => {
                self.stamp_owned(&mut existing);
                if !Arc::make_mut(&mut existing).update(&entry, false) {
                    return Ok(false);
                }
                self.changed.insert(start, existing);
            }
            None => {
                // new entries always need persisting
                self.changed.insert(start, entry);
            }
        }

        self.tags_cache.invalidate();
        Ok(true)
    }

    /// Queue `entry` for deletion, dropping any pending change at its start.
    pub fn apply_delete(&mut self, entry: impl Into<SharedEntry>) {
        let entry = entry.into();
        let start = entry.start();
        self.changed.remove(&start);
        self.deleted.entry(start).or_insert(entry);
        self.tags_cache.invalidate();
    }

    /// Apply the dirty entries of `other` as a batch.
    ///
    /// Against a store, existing rows covering the batch are loaded once and
    /// our own dirty entries in that range are reconciled into them first, so
    /// earlier in-memory edits win over stale rows. Returns whether anything
    /// changed.
    pub fn merge_batch(&mut self, other: &TimelineContainer) -> Result<bool> {
        let (Some(first), Some(last)) =
            (other.changed.values().next(), other.changed.values().next_back())
        else {
            return Ok(false);
        };

        let Some(store) = self.store.clone() else {
            let mut changed = false;
            for entry in other.changed.values() {
                changed |= self.apply_update(Arc::clone(entry))?;
            }
            return Ok(changed);
        };

        let min_end = first.start() + ONE_SECOND;
        let max_start = last.end();

        let mut existing =
            store.entries_by_min_end_max_start(self.timeline_id, min_end, max_start)?;
        for dirty in self.changed.values() {
            if dirty.end() > min_end && dirty.start() < max_start {
                resolve_conflict(dirty, &mut existing);
            }
        }

        let mut changed = false;
        for incoming in other.changed.values() {
            let mut incoming = Arc::clone(incoming);
            self.stamp_owned(&mut incoming);

            match existing.iter_mut().find(|e| e.start() == incoming.start()) {
                Some(found) => {
                    self.stamp_owned(found);
                    if Arc::make_mut(found).update(&incoming, false) {
                        self.changed.insert(found.start(), Arc::clone(found));
                        changed = true;
                    }
                }
                None => {
                    self.changed.insert(incoming.start(), incoming);
                    changed = true;
                }
            }
        }

        if changed {
            self.tags_cache.invalidate();
        }
        Ok(changed)
    }

    /// Whether there are changes or deletions not yet written back.
    pub fn needs_save(&self) -> bool {
        !self.changed.is_empty() || !self.deleted.is_empty()
    }

    /// Nothing dirty and nothing stored for this timeline.
    pub fn is_empty(&self) -> Result<bool> {
        if !self.changed.is_empty() {
            return Ok(false);
        }
        match &self.store {
            Some(store) => Ok(!store.has_entries(self.timeline_id)?),
            None => Ok(true),
        }
    }

    /// Start of the first and end of the last dirty entry.
    pub fn first_and_last_uncommitted(&self) -> Option<(Timestamp, Timestamp)> {
        let first = self.changed.values().next()?;
        let last = self.changed.values().next_back()?;
        Some((first.start(), last.end()))
    }

    // ========================================================================
    // Lookups: overlay first, then store
    // ========================================================================

    pub fn get_by_start(&self, start: Timestamp) -> Result<Option<SharedEntry>> {
        if let Some(entry) = self.changed.get(&start) {
            return Ok(Some(Arc::clone(entry)));
        }
        match &self.store {
            Some(store) => Ok(self.stamped(store.entry_by_start(self.timeline_id, start)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_broadcast_id(&self, unique_broadcast_id: u32) -> Result<Option<SharedEntry>> {
        if unique_broadcast_id == 0 {
            return Ok(None);
        }
        if let Some(entry) = self
            .changed
            .values()
            .find(|e| e.unique_broadcast_id() == Some(unique_broadcast_id))
        {
            return Ok(Some(Arc::clone(entry)));
        }
        match &self.store {
            Some(store) => {
                let found = store.entry_by_broadcast_id(self.timeline_id, unique_broadcast_id)?;
                Ok(self.stamped(found))
            }
            None => Ok(None),
        }
    }

    pub fn get_by_persisted_id(&self, persisted_id: i64) -> Result<Option<SharedEntry>> {
        if persisted_id <= 0 {
            return Ok(None);
        }
        if let Some(entry) = self
            .changed
            .values()
            .find(|e| e.persisted_id() == Some(persisted_id))
        {
            return Ok(Some(Arc::clone(entry)));
        }
        match &self.store {
            Some(store) => {
                let found = store.entry_by_persisted_id(self.timeline_id, persisted_id)?;
                Ok(self.stamped(found))
            }
            None => Ok(None),
        }
    }

    /// The single entry lying within `[start, end]`.
    pub fn get_between(&self, start: Timestamp, end: Timestamp) -> Result<Option<SharedEntry>> {
        // only the first dirty entry starting at or after `start` can qualify
        if let Some((_, entry)) = self.changed.range(start..).next()
            && entry.end() <= end
        {
            return Ok(Some(Arc::clone(entry)));
        }

        let Some(store) = &self.store else {
            return Ok(None);
        };

        let mut entries = store.entries_by_min_start_max_end(self.timeline_id, start, end)?;
        if entries.len() > 1 {
            warn!("Got multiple tags. Picking up the first.");
        }
        if entries.is_empty() {
            return Ok(None);
        }
        Ok(self.stamped(Some(entries.swap_remove(0))))
    }

    // ========================================================================
    // Active tag
    // ========================================================================

    /// Refresh the cached now/last/next entries for `now`.
    ///
    /// Returns whether the active entry changed.
    pub fn update_active_tag(&self, now: Timestamp) -> Result<bool> {
        self.tags_cache.refresh(now, self)
    }

    pub fn active_entry(&self) -> Option<SharedEntry> {
        self.tags_cache.now_active()
    }

    pub fn last_ended_entry(&self) -> Option<SharedEntry> {
        self.tags_cache.last_ended()
    }

    pub fn next_starting_entry(&self) -> Option<SharedEntry> {
        self.tags_cache.next_starting()
    }
}

impl ActiveTagSource for TimelineContainer {
    fn entry_active_at(&self, time: Timestamp) -> Result<Option<SharedEntry>> {
        if let Some((_, entry)) = self.changed.range(..=time).next_back()
            && entry.is_active_at(time)
        {
            return Ok(Some(Arc::clone(entry)));
        }
        match &self.store {
            Some(store) => Ok(self.stamped(store.entry_by_active_time(self.timeline_id, time)?)),
            None => Ok(None),
        }
    }

    fn last_ending_at_or_before(&self, time: Timestamp) -> Result<Option<SharedEntry>> {
        let dirty = self
            .changed
            .range(..time)
            .map(|(_, e)| e)
            .filter(|e| e.end() <= time)
            .max_by_key(|e| e.end())
            .cloned();
        let stored = match &self.store {
            Some(store) => self.stamped(store.entry_by_max_end_time(self.timeline_id, time)?),
            None => None,
        };

        Ok(match (dirty, stored) {
            (Some(d), Some(s)) => Some(if s.end() > d.end() { s } else { d }),
            (d, s) => d.or(s),
        })
    }

    fn first_starting_at_or_after(&self, time: Timestamp) -> Result<Option<SharedEntry>> {
        let dirty = self.changed.range(time..).next().map(|(_, e)| Arc::clone(e));
        let stored = match &self.store {
            Some(store) => self.stamped(store.entry_by_min_start_time(self.timeline_id, time)?),
            None => None,
        };

        Ok(match (dirty, stored) {
            (Some(d), Some(s)) => Some(if s.start() < d.start() { s } else { d }),
            (d, s) => d.or(s),
        })
    }
}
