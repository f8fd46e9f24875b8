use super::EpgStore;
use super::persistence::{SnapshotManager, StoreSnapshot};
use crate::config::EpgConfig;
use crate::core::{EpgError, ProgramEntry, Result, SharedEntry, Timestamp};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

type TimelineRows = BTreeMap<Timestamp, SharedEntry>;

/// Operation deferred until the open batch is released.
#[derive(Debug, Clone)]
enum StoreOp {
    DeleteRange { timeline_id: i32, min_end: Timestamp, max_start: Timestamp },
    DeleteEntry { persisted_id: i64 },
    DeleteAll { timeline_id: i32 },
    Upsert(ProgramEntry),
}

#[derive(Default)]
struct StoreState {
    timelines: BTreeMap<i32, TimelineRows>,
    /// persisted id -> (timeline, start) of the row holding it
    ids: HashMap<i64, (i32, Timestamp)>,
    next_id: i64,
}

#[derive(Default)]
struct BatchState {
    locked: bool,
    pending: Vec<StoreOp>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub upserts: u64,
    pub deletes: u64,
    pub batches: u64,
}

#[derive(Default)]
struct StoreCounters {
    upserts: AtomicU64,
    deletes: AtomicU64,
    batches: AtomicU64,
}

/// Reference [`EpgStore`] keeping every timeline in ordered maps.
///
/// Rows are held as shared entries; callers receive clones of the handles and
/// any mutation on their side copies the entry first.
pub struct MemoryEpgStore {
    state: RwLock<StoreState>,
    batch: Mutex<BatchState>,
    batch_released: Condvar,
    counters: StoreCounters,
    snapshot: Option<SnapshotManager>,
}

impl MemoryEpgStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState { next_id: 1, ..StoreState::default() }),
            batch: Mutex::new(BatchState::default()),
            batch_released: Condvar::new(),
            counters: StoreCounters::default(),
            snapshot: None,
        }
    }

    /// Open a store using the config's snapshot path, restoring it if present.
    pub fn with_config(config: &EpgConfig) -> Result<Self> {
        let mut store = Self::new();
        if let Some(path) = &config.snapshot_path {
            let manager = SnapshotManager::new(path);
            if let Some(snapshot) = manager.load()? {
                store.restore(snapshot)?;
            }
            store.snapshot = Some(manager);
        }
        Ok(store)
    }

    /// Write the committed rows to the configured snapshot file.
    pub fn save_snapshot(&self) -> Result<()> {
        let manager = self
            .snapshot
            .as_ref()
            .ok_or_else(|| EpgError::NotFound("no snapshot path configured".to_string()))?;

        let state = self.state.read()?;
        let timelines = state
            .timelines
            .iter()
            .map(|(id, rows)| (*id, rows.values().map(|e| ProgramEntry::clone(e)).collect()))
            .collect();
        manager.save(&StoreSnapshot::new(timelines, state.next_id))
    }

    fn restore(&mut self, snapshot: StoreSnapshot) -> Result<()> {
        let state = self.state.get_mut()?;
        state.timelines.clear();
        state.ids.clear();
        state.next_id = snapshot.next_id.max(1);

        for (timeline_id, entries) in snapshot.timelines {
            let rows = state.timelines.entry(timeline_id).or_default();
            for entry in entries {
                let start = entry.start();
                let id = entry.persisted_id();
                rows.insert(start, Arc::new(entry));
                if let Some(id) = id {
                    state.ids.insert(id, (timeline_id, start));
                }
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            upserts: self.counters.upserts.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            batches: self.counters.batches.load(Ordering::Relaxed),
        }
    }

    pub fn entry_count(&self, timeline_id: i32) -> Result<usize> {
        let state = self.state.read()?;
        Ok(state.timelines.get(&timeline_id).map_or(0, BTreeMap::len))
    }

    pub fn timeline_ids(&self) -> Result<Vec<i32>> {
        let state = self.state.read()?;
        Ok(state.timelines.keys().copied().collect())
    }

    fn with_rows<T>(
        &self,
        timeline_id: i32,
        f: impl FnOnce(&TimelineRows) -> T,
    ) -> Result<Option<T>> {
        let state = self.state.read()?;
        Ok(state.timelines.get(&timeline_id).map(f))
    }

    fn submit(&self, op: StoreOp) -> Result<()> {
        let mut batch = self.batch.lock()?;
        if batch.locked {
            batch.pending.push(op);
            return Ok(());
        }
        let mut state = self.state.write()?;
        self.apply(&mut state, op);
        Ok(())
    }

    fn apply(&self, state: &mut StoreState, op: StoreOp) {
        match op {
            StoreOp::DeleteRange { timeline_id, min_end, max_start } => {
                let doomed: Vec<Timestamp> = state
                    .timelines
                    .get(&timeline_id)
                    .map(|rows| {
                        rows.range(..=max_start)
                            .filter(|(_, e)| e.end() >= min_end)
                            .map(|(start, _)| *start)
                            .collect()
                    })
                    .unwrap_or_default();
                for start in doomed {
                    remove_row(state, timeline_id, start);
                    self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                }
            }
            StoreOp::DeleteEntry { persisted_id } => {
                if let Some((timeline_id, start)) = state.ids.get(&persisted_id).copied() {
                    remove_row(state, timeline_id, start);
                    self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                }
            }
            StoreOp::DeleteAll { timeline_id } => {
                if let Some(rows) = state.timelines.remove(&timeline_id) {
                    for entry in rows.values() {
                        if let Some(id) = entry.persisted_id() {
                            state.ids.remove(&id);
                        }
                    }
                    self.counters.deletes.fetch_add(rows.len() as u64, Ordering::Relaxed);
                }
            }
            StoreOp::Upsert(mut entry) => {
                let timeline_id = entry.timeline_id();
                let start = entry.start();

                // a known id moves with its entry
                let id = match entry.persisted_id() {
                    Some(id) => {
                        if let Some((old_timeline, old_start)) = state.ids.get(&id).copied() {
                            remove_row(state, old_timeline, old_start);
                        }
                        id
                    }
                    None => {
                        let id = state.next_id;
                        state.next_id += 1;
                        id
                    }
                };
                state.next_id = state.next_id.max(id + 1);

                if let Some(replaced) = state
                    .timelines
                    .get(&timeline_id)
                    .and_then(|rows| rows.get(&start))
                    .and_then(|e| e.persisted_id())
                {
                    state.ids.remove(&replaced);
                }

                entry.set_persisted_id(Some(id));
                entry.set_channel(None);
                state
                    .timelines
                    .entry(timeline_id)
                    .or_default()
                    .insert(start, Arc::new(entry));
                state.ids.insert(id, (timeline_id, start));
                self.counters.upserts.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Default for MemoryEpgStore {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_row(state: &mut StoreState, timeline_id: i32, start: Timestamp) {
    let Some(rows) = state.timelines.get_mut(&timeline_id) else {
        return;
    };
    if let Some(entry) = rows.remove(&start)
        && let Some(id) = entry.persisted_id()
    {
        state.ids.remove(&id);
    }
    if rows.is_empty() {
        state.timelines.remove(&timeline_id);
    }
}

impl EpgStore for MemoryEpgStore {
    fn entries_by_min_end_max_start(
        &self,
        timeline_id: i32,
        min_end: Timestamp,
        max_start: Timestamp,
    ) -> Result<Vec<SharedEntry>> {
        Ok(self
            .with_rows(timeline_id, |rows| {
                rows.range(..=max_start)
                    .map(|(_, e)| e)
                    .filter(|e| e.end() >= min_end)
                    .cloned()
                    .collect()
            })?
            .unwrap_or_default())
    }

    fn entries_by_min_start_max_end(
        &self,
        timeline_id: i32,
        min_start: Timestamp,
        max_end: Timestamp,
    ) -> Result<Vec<SharedEntry>> {
        Ok(self
            .with_rows(timeline_id, |rows| {
                rows.range(min_start..)
                    .map(|(_, e)| e)
                    .filter(|e| e.end() <= max_end)
                    .cloned()
                    .collect()
            })?
            .unwrap_or_default())
    }

    fn all_entries(&self, timeline_id: i32) -> Result<Vec<SharedEntry>> {
        Ok(self
            .with_rows(timeline_id, |rows| rows.values().cloned().collect())?
            .unwrap_or_default())
    }

    fn entry_by_start(&self, timeline_id: i32, start: Timestamp) -> Result<Option<SharedEntry>> {
        Ok(self
            .with_rows(timeline_id, |rows| rows.get(&start).cloned())?
            .flatten())
    }

    fn entry_by_broadcast_id(
        &self,
        timeline_id: i32,
        unique_broadcast_id: u32,
    ) -> Result<Option<SharedEntry>> {
        Ok(self
            .with_rows(timeline_id, |rows| {
                rows.values()
                    .find(|e| e.unique_broadcast_id() == Some(unique_broadcast_id))
                    .cloned()
            })?
            .flatten())
    }

    fn entry_by_persisted_id(
        &self,
        timeline_id: i32,
        persisted_id: i64,
    ) -> Result<Option<SharedEntry>> {
        let state = self.state.read()?;
        Ok(match state.ids.get(&persisted_id) {
            Some((owner, start)) if *owner == timeline_id => state
                .timelines
                .get(owner)
                .and_then(|rows| rows.get(start))
                .cloned(),
            _ => None,
        })
    }

    fn entry_by_active_time(
        &self,
        timeline_id: i32,
        time: Timestamp,
    ) -> Result<Option<SharedEntry>> {
        Ok(self
            .with_rows(timeline_id, |rows| {
                rows.range(..=time)
                    .next_back()
                    .map(|(_, e)| e)
                    .filter(|e| e.is_active_at(time))
                    .cloned()
            })?
            .flatten())
    }

    fn entry_by_max_end_time(
        &self,
        timeline_id: i32,
        max_end: Timestamp,
    ) -> Result<Option<SharedEntry>> {
        Ok(self
            .with_rows(timeline_id, |rows| {
                rows.range(..max_end)
                    .map(|(_, e)| e)
                    .filter(|e| e.end() <= max_end)
                    .max_by_key(|e| e.end())
                    .cloned()
            })?
            .flatten())
    }

    fn entry_by_min_start_time(
        &self,
        timeline_id: i32,
        min_start: Timestamp,
    ) -> Result<Option<SharedEntry>> {
        Ok(self
            .with_rows(timeline_id, |rows| rows.range(min_start..).next().map(|(_, e)| e.clone()))?
            .flatten())
    }

    fn has_entries(&self, timeline_id: i32) -> Result<bool> {
        Ok(self
            .with_rows(timeline_id, |rows| !rows.is_empty())?
            .unwrap_or(false))
    }

    fn last_end_time(&self, timeline_id: i32) -> Result<Option<Timestamp>> {
        Ok(self
            .with_rows(timeline_id, |rows| rows.values().map(|e| e.end()).max())?
            .flatten())
    }

    fn max_end_time(&self, timeline_id: i32, max_end: Timestamp) -> Result<Option<Timestamp>> {
        Ok(self
            .with_rows(timeline_id, |rows| {
                rows.range(..max_end)
                    .map(|(_, e)| e.end())
                    .filter(|end| *end <= max_end)
                    .max()
            })?
            .flatten())
    }

    fn min_start_time(&self, timeline_id: i32, min_start: Timestamp) -> Result<Option<Timestamp>> {
        Ok(self
            .with_rows(timeline_id, |rows| rows.range(min_start..).next().map(|(start, _)| *start))?
            .flatten())
    }

    fn delete_entries_before(&self, timeline_id: i32, cutoff: Timestamp) -> Result<()> {
        let mut state = self.state.write()?;
        let doomed: Vec<Timestamp> = state
            .timelines
            .get(&timeline_id)
            .map(|rows| {
                rows.range(..cutoff)
                    .filter(|(_, e)| e.end() < cutoff)
                    .map(|(start, _)| *start)
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            "Deleting {} entries of timeline {} ending before {}",
            doomed.len(),
            timeline_id,
            cutoff
        );
        for start in doomed {
            remove_row(&mut state, timeline_id, start);
            self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn queue_delete_by_min_end_max_start(
        &self,
        timeline_id: i32,
        min_end: Timestamp,
        max_start: Timestamp,
    ) -> Result<()> {
        self.submit(StoreOp::DeleteRange { timeline_id, min_end, max_start })
    }

    fn queue_delete_entry(&self, entry: &ProgramEntry) -> Result<()> {
        match entry.persisted_id() {
            Some(persisted_id) => self.submit(StoreOp::DeleteEntry { persisted_id }),
            None => {
                debug!("Ignoring delete of unpersisted entry ({})", entry);
                Ok(())
            }
        }
    }

    fn queue_delete_all(&self, timeline_id: i32) -> Result<()> {
        self.submit(StoreOp::DeleteAll { timeline_id })
    }

    fn queue_upsert(&self, entry: &ProgramEntry) -> Result<()> {
        if entry.is_filler() {
            return Err(EpgError::InvalidEntry(format!(
                "filler entries are never persisted ({})",
                entry
            )));
        }
        self.submit(StoreOp::Upsert(entry.clone()))
    }

    fn lock(&self) -> Result<()> {
        let mut batch = self.batch.lock()?;
        while batch.locked {
            batch = self.batch_released.wait(batch)?;
        }
        batch.locked = true;
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        let mut batch = self.batch.lock()?;
        if !batch.locked {
            return Err(EpgError::LockError("unlock without matching lock".to_string()));
        }

        let pending = std::mem::take(&mut batch.pending);
        let applied = self.state.write().map(|mut state| {
            for op in pending {
                self.apply(&mut state, op);
            }
        });

        batch.locked = false;
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        drop(batch);
        self.batch_released.notify_one();

        applied.map_err(EpgError::from)
    }
}
