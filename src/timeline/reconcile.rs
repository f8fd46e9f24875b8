// ============================================================================
// Interval Reconciliation
// ============================================================================
//
// Pure functions restoring the non-overlap invariant of a timeline:
// - resolve_conflict: insert one entry, evicting everything it overlaps
// - fix_overlapping_*: left-to-right pass where earlier entries win, later
//   ones are dropped (fully covered) or their predecessor is trimmed
//
// ============================================================================

use crate::core::{SharedEntry, Timestamp};
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Insert `candidate` into the start-ordered `entries`, removing every entry
/// whose interval overlaps it.
///
/// The candidate lands right before the first remaining entry starting at or
/// after its end, or at the end of the sequence.
pub fn resolve_conflict(candidate: &SharedEntry, entries: &mut Vec<SharedEntry>) {
    let mut index = 0;
    while index < entries.len() {
        let existing = &entries[index];
        if candidate.overlaps(existing.start(), existing.end()) {
            entries.remove(index);
        } else if existing.start() >= candidate.end() {
            break;
        } else {
            index += 1;
        }
    }
    entries.insert(index, Arc::clone(candidate));
}

/// Reconcile one adjacent pair. Returns `false` when `current` must be dropped.
///
/// A partially overlapped `previous` is trimmed to end where `current` starts.
pub fn fix_pair_overlap(previous: Option<&mut SharedEntry>, current: &SharedEntry) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    if previous.end() >= current.end() {
        debug!(
            "Erasing completely overlapped event from EPG timeline ({}) ({}).",
            previous, current
        );
        return false;
    }

    if previous.end() > current.start() {
        debug!(
            "Fixing partly overlapped event in EPG timeline ({}) ({}).",
            previous, current
        );
        Arc::make_mut(previous).set_end(current.start());
    }

    true
}

/// Apply [`fix_pair_overlap`] across a start-ordered vector.
///
/// Returns whether any entry was dropped.
pub fn fix_overlapping_entries(entries: &mut Vec<SharedEntry>) -> bool {
    let before = entries.len();
    let mut kept: Vec<SharedEntry> = Vec::with_capacity(before);

    for current in entries.drain(..) {
        if fix_pair_overlap(kept.last_mut(), &current) {
            kept.push(current);
        }
    }

    let dropped = kept.len() != before;
    *entries = kept;
    dropped
}

/// Apply [`fix_pair_overlap`] across an overlay in key order, in place.
///
/// Returns whether any entry was dropped.
pub fn fix_overlapping_map(entries: &mut BTreeMap<Timestamp, SharedEntry>) -> bool {
    let before = entries.len();

    for (start, current) in std::mem::take(entries) {
        // keys ascend, so the last kept value is the predecessor
        if fix_pair_overlap(entries.values_mut().next_back(), &current) {
            entries.insert(start, current);
        }
    }

    entries.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProgramEntry;
    use chrono::DateTime;

    fn t(secs: i64) -> Timestamp {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn shared(start: i64, end: i64) -> SharedEntry {
        Arc::new(ProgramEntry::new(1, t(start), t(end)).unwrap())
    }

    fn spans(entries: &[SharedEntry]) -> Vec<(i64, i64)> {
        entries
            .iter()
            .map(|e| (e.start().timestamp(), e.end().timestamp()))
            .collect()
    }

    #[test]
    fn test_resolve_conflict_evicts_all_overlapping() {
        let mut entries = vec![shared(10, 20), shared(20, 30), shared(25, 40)];
        resolve_conflict(&shared(15, 35), &mut entries);
        assert_eq!(spans(&entries), vec![(15, 35)]);
    }

    #[test]
    fn test_resolve_conflict_inserts_in_order() {
        let mut entries = vec![shared(0, 10), shared(30, 40)];
        resolve_conflict(&shared(10, 30), &mut entries);
        assert_eq!(spans(&entries), vec![(0, 10), (10, 30), (30, 40)]);
    }

    #[test]
    fn test_resolve_conflict_appends_after_last() {
        let mut entries = vec![shared(0, 10)];
        resolve_conflict(&shared(20, 30), &mut entries);
        assert_eq!(spans(&entries), vec![(0, 10), (20, 30)]);

        let mut empty = Vec::new();
        resolve_conflict(&shared(20, 30), &mut empty);
        assert_eq!(spans(&empty), vec![(20, 30)]);
    }

    #[test]
    fn test_resolve_conflict_keeps_neighbours() {
        let mut entries = vec![shared(0, 10), shared(10, 20), shared(20, 30)];
        resolve_conflict(&shared(12, 18), &mut entries);
        assert_eq!(spans(&entries), vec![(0, 10), (12, 18), (20, 30)]);
    }

    #[test]
    fn test_fix_pair_partial_trim() {
        let mut previous = shared(0, 10);
        let current = shared(5, 15);
        assert!(fix_pair_overlap(Some(&mut previous), &current));
        assert_eq!(previous.end(), t(5));
        assert_eq!(current.end(), t(15));
    }

    #[test]
    fn test_fix_pair_full_containment_drops_current() {
        let mut previous = shared(0, 20);
        let current = shared(5, 10);
        assert!(!fix_pair_overlap(Some(&mut previous), &current));
        assert_eq!(previous.end(), t(20));
    }

    #[test]
    fn test_fix_pair_without_previous_keeps() {
        assert!(fix_pair_overlap(None, &shared(5, 10)));
    }

    #[test]
    fn test_trim_does_not_touch_other_holders() {
        let mut previous = shared(0, 10);
        let held_elsewhere = Arc::clone(&previous);
        fix_pair_overlap(Some(&mut previous), &shared(5, 15));
        assert_eq!(previous.end(), t(5));
        assert_eq!(held_elsewhere.end(), t(10));
    }

    #[test]
    fn test_fix_overlapping_entries() {
        let mut entries = vec![shared(0, 10), shared(5, 15), shared(6, 12), shared(15, 20)];
        assert!(fix_overlapping_entries(&mut entries));
        assert_eq!(spans(&entries), vec![(0, 5), (5, 15), (15, 20)]);

        let mut clean = vec![shared(0, 10), shared(10, 20)];
        assert!(!fix_overlapping_entries(&mut clean));
        assert_eq!(spans(&clean), vec![(0, 10), (10, 20)]);
    }

    #[test]
    fn test_fix_overlapping_map() {
        let mut map = BTreeMap::new();
        for (s, e) in [(0, 30), (10, 20), (25, 40), (40, 50)] {
            map.insert(t(s), shared(s, e));
        }

        assert!(fix_overlapping_map(&mut map));
        let values: Vec<SharedEntry> = map.values().cloned().collect();
        assert_eq!(spans(&values), vec![(0, 25), (25, 40), (40, 50)]);
    }
}
