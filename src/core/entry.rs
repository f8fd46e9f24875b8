use super::types::intervals_overlap;
use super::{ChannelData, EpgError, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared handle to an entry.
///
/// The container, the active tag cache and callers may all hold the same
/// entry. Mutation goes through `Arc::make_mut`, so a holder never sees an
/// entry change underneath it.
pub type SharedEntry = Arc<ProgramEntry>;

/// Descriptive fields of a broadcast. Compared as a whole when merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDetails {
    pub title: String,
    pub plot_outline: String,
    pub plot: String,
    pub original_title: String,
    pub cast: String,
    pub director: String,
    pub writer: String,
    pub year: Option<i32>,
    pub imdb_number: String,
    pub icon_path: String,
    pub genre_type: i32,
    pub genre_sub_type: i32,
    pub genre_description: String,
    pub parental_rating: Option<i32>,
    pub star_rating: Option<i32>,
    pub series_number: Option<i32>,
    pub episode_number: Option<i32>,
    pub episode_part: Option<i32>,
    pub episode_name: String,
    pub first_aired: Option<Timestamp>,
    pub series_link: String,
    pub flags: u32,
}

/// A scheduled broadcast interval `[start, end)` on one timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramEntry {
    start: Timestamp,
    end: Timestamp,
    unique_broadcast_id: Option<u32>,
    persisted_id: Option<i64>,
    timeline_id: i32,
    is_filler: bool,
    #[serde(skip)]
    channel: Option<Arc<ChannelData>>,
    details: ProgramDetails,
}

impl ProgramEntry {
    pub fn new(timeline_id: i32, start: Timestamp, end: Timestamp) -> Result<Self> {
        if start >= end {
            return Err(EpgError::InvalidEntry(format!(
                "start {} is not before end {}",
                start, end
            )));
        }

        Ok(Self {
            start,
            end,
            unique_broadcast_id: None,
            persisted_id: None,
            timeline_id,
            is_filler: false,
            channel: None,
            details: ProgramDetails::default(),
        })
    }

    /// Synthetic entry covering a hole in a timeline. Never persisted.
    pub fn filler(
        channel: Option<Arc<ChannelData>>,
        timeline_id: i32,
        start: Timestamp,
        end: Timestamp,
    ) -> Self {
        debug_assert!(start < end, "filler must cover a non-empty interval");
        Self {
            start,
            end,
            unique_broadcast_id: None,
            persisted_id: None,
            timeline_id,
            is_filler: true,
            channel,
            details: ProgramDetails::default(),
        }
    }

    pub fn broadcast_id(mut self, id: u32) -> Self {
        // 0 is the source's "no id" marker
        self.unique_broadcast_id = (id != 0).then_some(id);
        self
    }

    pub fn with_persisted_id(mut self, id: i64) -> Self {
        self.persisted_id = (id > 0).then_some(id);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.details.title = title.into();
        self
    }

    pub fn plot(mut self, plot: impl Into<String>) -> Self {
        self.details.plot = plot.into();
        self
    }

    pub fn with_details(mut self, details: ProgramDetails) -> Self {
        self.details = details;
        self
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn unique_broadcast_id(&self) -> Option<u32> {
        self.unique_broadcast_id
    }

    pub fn persisted_id(&self) -> Option<i64> {
        self.persisted_id
    }

    pub fn timeline_id(&self) -> i32 {
        self.timeline_id
    }

    pub fn is_filler(&self) -> bool {
        self.is_filler
    }

    pub fn channel(&self) -> Option<&Arc<ChannelData>> {
        self.channel.as_ref()
    }

    pub fn details(&self) -> &ProgramDetails {
        &self.details
    }

    pub fn details_mut(&mut self) -> &mut ProgramDetails {
        &mut self.details
    }

    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        intervals_overlap(self.start, self.end, start, end)
    }

    pub fn is_active_at(&self, time: Timestamp) -> bool {
        self.start <= time && self.end > time
    }

    pub(crate) fn set_end(&mut self, end: Timestamp) {
        debug_assert!(self.start < end, "end must stay after start");
        self.end = end;
    }

    pub fn set_timeline_id(&mut self, timeline_id: i32) {
        self.timeline_id = timeline_id;
    }

    pub fn set_channel(&mut self, channel: Option<Arc<ChannelData>>) {
        self.channel = channel;
    }

    pub(crate) fn set_persisted_id(&mut self, id: Option<i64>) {
        self.persisted_id = id;
    }

    /// Merge `other` into `self`.
    ///
    /// Copies the end time, broadcast id and details (and the persisted id
    /// when `update_persisted_id` is set). Nothing is written unless
    /// something differs. Start times are never touched; callers pair entries
    /// by start before merging.
    pub fn update(&mut self, other: &ProgramEntry, update_persisted_id: bool) -> bool {
        let changed = self.end != other.end
            || self.unique_broadcast_id != other.unique_broadcast_id
            || self.details != other.details
            || (update_persisted_id && self.persisted_id != other.persisted_id);

        if changed {
            self.end = other.end;
            self.unique_broadcast_id = other.unique_broadcast_id;
            self.details = other.details.clone();
            if update_persisted_id {
                self.persisted_id = other.persisted_id;
            }
        }

        changed
    }
}

impl fmt::Display for ProgramEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uid = self
            .unique_broadcast_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        write!(
            f,
            "{} - {} - {} - {}",
            uid,
            self.details.title,
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn t(secs: i64) -> Timestamp {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_interval() {
        assert!(ProgramEntry::new(1, t(10), t(10)).is_err());
        assert!(ProgramEntry::new(1, t(20), t(10)).is_err());
        assert!(ProgramEntry::new(1, t(10), t(11)).is_ok());
    }

    #[test]
    fn test_zero_ids_are_invalid() {
        let entry = ProgramEntry::new(1, t(0), t(10))
            .unwrap()
            .broadcast_id(0)
            .with_persisted_id(0);
        assert_eq!(entry.unique_broadcast_id(), None);
        assert_eq!(entry.persisted_id(), None);
    }

    #[test]
    fn test_update_identical_reports_no_change() {
        let mut existing = ProgramEntry::new(1, t(0), t(10)).unwrap().title("News");
        let incoming = ProgramEntry::new(1, t(0), t(10)).unwrap().title("News");
        assert!(!existing.update(&incoming, false));
    }

    #[test]
    fn test_update_copies_changed_fields() {
        let mut existing = ProgramEntry::new(1, t(0), t(10))
            .unwrap()
            .title("News")
            .with_persisted_id(4);
        let incoming = ProgramEntry::new(1, t(0), t(15))
            .unwrap()
            .title("Late News")
            .broadcast_id(99);

        assert!(existing.update(&incoming, false));
        assert_eq!(existing.end(), t(15));
        assert_eq!(existing.details().title, "Late News");
        assert_eq!(existing.unique_broadcast_id(), Some(99));
        // persisted id survives unless asked for
        assert_eq!(existing.persisted_id(), Some(4));
    }

    #[test]
    fn test_update_persisted_id_only_when_requested() {
        let mut existing = ProgramEntry::new(1, t(0), t(10)).unwrap();
        let incoming = ProgramEntry::new(1, t(0), t(10)).unwrap().with_persisted_id(8);

        assert!(!existing.update(&incoming, false));
        assert!(existing.update(&incoming, true));
        assert_eq!(existing.persisted_id(), Some(8));
    }

    #[test]
    fn test_filler_flag() {
        let filler = ProgramEntry::filler(None, 3, t(0), t(5));
        assert!(filler.is_filler());
        assert_eq!(filler.timeline_id(), 3);
        assert_eq!(filler.persisted_id(), None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "non-empty interval")]
    fn test_filler_rejects_empty_interval() {
        ProgramEntry::filler(None, 3, t(5), t(5));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "end must stay after start")]
    fn test_set_end_before_start_panics() {
        let mut entry = ProgramEntry::new(1, t(10), t(20)).unwrap();
        entry.set_end(t(10));
    }
}
