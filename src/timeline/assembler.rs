use super::container::TimelineContainer;
use super::reconcile::{fix_overlapping_entries, resolve_conflict};
use crate::core::{ONE_SECOND, ProgramEntry, Result, SharedEntry, Timestamp};
use crate::storage::EpgStore;
use std::sync::Arc;

impl TimelineContainer {
    /// Gapless, non-overlapping view of `[min_end, max_start]`.
    ///
    /// Holes of a second or more become filler entries. Leading and trailing
    /// fillers reach towards the nearest stored entries, clamped to
    /// `[window_start, window_end]`. An unbacked container has no timeline.
    pub fn get_timeline(
        &self,
        window_start: Timestamp,
        window_end: Timestamp,
        min_end: Timestamp,
        max_start: Timestamp,
    ) -> Result<Vec<SharedEntry>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };

        let overlay_only = !self.changed.is_empty()
            && store
                .last_end_time(self.timeline_id)?
                .is_none_or(|last_end| last_end < min_end);

        let mut entries = if overlay_only {
            let mut entries: Vec<SharedEntry> = self
                .changed
                .values()
                .filter(|e| e.end() > min_end && e.start() < max_start)
                .cloned()
                .collect();
            self.merge_fixed(&mut entries);
            entries
        } else {
            let mut entries =
                store.entries_by_min_end_max_start(self.timeline_id, min_end, max_start)?;
            let fetched_end = entries.last().map_or(min_end, |e| e.end());

            for dirty in self.changed.values() {
                if dirty.end() > min_end && dirty.start() < max_start {
                    resolve_conflict(dirty, &mut entries);
                }
            }
            // dirty entries past the stored range
            for dirty in self.changed.values() {
                if dirty.end() > fetched_end
                    && dirty.start() < max_start
                    && !entries.iter().any(|e| Arc::ptr_eq(e, dirty))
                {
                    entries.push(Arc::clone(dirty));
                }
            }
            entries.sort_by_key(|e| e.start());
            self.merge_fixed(&mut entries);
            entries
        };

        for entry in &mut entries {
            self.stamp(entry);
        }

        let mut timeline = Vec::with_capacity(entries.len() * 2);
        for entry in entries {
            if let Some(previous) = timeline.last().map(|e: &SharedEntry| e.end())
                && entry.start() - previous >= ONE_SECOND
            {
                timeline.push(self.filler(previous, entry.start()));
            }
            timeline.push(entry);
        }

        let lead_start = match store.max_end_time(self.timeline_id, min_end)? {
            Some(end) => end.max(window_start),
            None => window_start,
        };
        let trail_end = match store.min_start_time(self.timeline_id, max_start)? {
            Some(start) => start.min(window_end),
            None => window_end,
        };

        let (Some(first_start), Some(last_end)) =
            (timeline.first().map(|e| e.start()), timeline.last().map(|e| e.end()))
        else {
            if lead_start < trail_end {
                timeline.push(self.filler(lead_start, trail_end));
            }
            return Ok(timeline);
        };

        if first_start > min_end && lead_start < first_start {
            timeline.insert(0, self.filler(lead_start, first_start));
        }
        if last_end < max_start && last_end < trail_end {
            timeline.push(self.filler(last_end, trail_end));
        }

        Ok(timeline)
    }

    /// Every entry of the timeline with the overlay applied.
    pub fn get_all_entries(&self) -> Result<Vec<SharedEntry>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };

        let mut entries = if !self.changed.is_empty() && !store.has_entries(self.timeline_id)? {
            let mut entries: Vec<SharedEntry> = self.changed.values().cloned().collect();
            self.merge_fixed(&mut entries);
            entries
        } else {
            let mut entries = store.all_entries(self.timeline_id)?;
            for dirty in self.changed.values() {
                resolve_conflict(dirty, &mut entries);
            }
            // stored rows may overlap by less than the flush narrowing
            self.merge_fixed(&mut entries);
            entries
        };

        for entry in &mut entries {
            self.stamp(entry);
        }
        Ok(entries)
    }

    fn merge_fixed(&self, entries: &mut Vec<SharedEntry>) {
        if fix_overlapping_entries(entries) {
            self.tags_cache.invalidate();
        }
    }

    fn filler(&self, start: Timestamp, end: Timestamp) -> SharedEntry {
        Arc::new(ProgramEntry::filler(self.channel.clone(), self.timeline_id, start, end))
    }
}
