use crate::core::{ChannelData, Result, SharedEntry, Timestamp};
use std::sync::{Arc, Mutex, PoisonError};

/// Lookups a cache needs to work out what is on air.
pub trait ActiveTagSource {
    /// Entry with `start <= time < end`.
    fn entry_active_at(&self, time: Timestamp) -> Result<Option<SharedEntry>>;

    /// Latest-ending entry with `end <= time`.
    fn last_ending_at_or_before(&self, time: Timestamp) -> Result<Option<SharedEntry>>;

    /// Earliest-starting entry with `start >= time`.
    fn first_starting_at_or_after(&self, time: Timestamp) -> Result<Option<SharedEntry>>;
}

/// Tracks the current, previous and next entry of one timeline.
///
/// Shared between a container and whoever displays "now playing". The
/// container never locks it; it only invalidates it whenever an overlay
/// change could alter what is current.
pub trait ActiveTagCache: Send + Sync {
    /// Forget everything. Idempotent.
    fn invalidate(&self);

    /// Recompute for `now` unless the cached answer still holds.
    ///
    /// Returns whether the active entry changed.
    fn refresh(&self, now: Timestamp, source: &dyn ActiveTagSource) -> Result<bool>;

    fn now_active(&self) -> Option<SharedEntry>;

    fn last_ended(&self) -> Option<SharedEntry>;

    fn next_starting(&self) -> Option<SharedEntry>;

    fn set_channel_data(&self, channel: Option<Arc<ChannelData>>);
}

#[derive(Default)]
struct CacheState {
    channel: Option<Arc<ChannelData>>,
    now_active: Option<SharedEntry>,
    last_ended: Option<SharedEntry>,
    next_starting: Option<SharedEntry>,
    // [valid_from, valid_until) in which the cached answer holds; None = open
    valid_from: Option<Timestamp>,
    valid_until: Option<Timestamp>,
    valid: bool,
}

impl CacheState {
    fn covers(&self, now: Timestamp) -> bool {
        self.valid
            && self.valid_from.is_none_or(|from| from <= now)
            && self.valid_until.is_none_or(|until| now < until)
    }

    fn clear(&mut self) {
        self.now_active = None;
        self.last_ended = None;
        self.next_starting = None;
        self.valid_from = None;
        self.valid_until = None;
        self.valid = false;
    }
}

/// Default [`ActiveTagCache`].
#[derive(Default)]
pub struct TagsCache {
    state: Mutex<CacheState>,
}

impl TagsCache {
    pub fn new(channel: Option<Arc<ChannelData>>) -> Self {
        Self {
            state: Mutex::new(CacheState { channel, ..CacheState::default() }),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).valid
    }
}

fn same_entry(a: &Option<SharedEntry>, b: &Option<SharedEntry>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b) || (a.start() == b.start() && a.end() == b.end()),
        _ => false,
    }
}

fn stamped(entry: Option<SharedEntry>, channel: &Option<Arc<ChannelData>>) -> Option<SharedEntry> {
    entry.map(|mut e| {
        if e.channel() != channel.as_ref() {
            Arc::make_mut(&mut e).set_channel(channel.clone());
        }
        e
    })
}

impl ActiveTagCache for TagsCache {
    fn invalidate(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn refresh(&self, now: Timestamp, source: &dyn ActiveTagSource) -> Result<bool> {
        let mut state = self.state.lock()?;
        if state.covers(now) {
            return Ok(false);
        }

        let previous = state.now_active.take();
        let active = source.entry_active_at(now)?;

        let before = active.as_ref().map_or(now, |a| a.start());
        let after = active.as_ref().map_or(now, |a| a.end());
        let last_ended = source.last_ending_at_or_before(before)?;
        let next_starting = source.first_starting_at_or_after(after)?;

        state.valid_from = active
            .as_ref()
            .map(|a| a.start())
            .or_else(|| last_ended.as_ref().map(|e| e.end()));
        state.valid_until = active
            .as_ref()
            .map(|a| a.end())
            .or_else(|| next_starting.as_ref().map(|e| e.start()));

        let channel = state.channel.clone();
        state.now_active = stamped(active, &channel);
        state.last_ended = stamped(last_ended, &channel);
        state.next_starting = stamped(next_starting, &channel);
        state.valid = true;

        Ok(!same_entry(&previous, &state.now_active))
    }

    fn now_active(&self) -> Option<SharedEntry> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).now_active.clone()
    }

    fn last_ended(&self) -> Option<SharedEntry> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).last_ended.clone()
    }

    fn next_starting(&self) -> Option<SharedEntry> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).next_starting.clone()
    }

    fn set_channel_data(&self, channel: Option<Arc<ChannelData>>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.now_active = stamped(state.now_active.take(), &channel);
        state.last_ended = stamped(state.last_ended.take(), &channel);
        state.next_starting = stamped(state.next_starting.take(), &channel);
        state.channel = channel;
    }
}
