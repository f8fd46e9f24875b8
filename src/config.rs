use crate::core::{EpgError, Result, Timestamp};
use chrono::TimeDelta;
use std::path::PathBuf;

/// Timeline retention and display configuration
#[derive(Debug, Clone)]
pub struct EpgConfig {
    /// Days of past entries kept before purge
    pub past_days_to_keep: u32,

    /// Days ahead of now covered by the display window
    pub future_days_to_display: u32,

    /// Extra time an ended entry survives purge beyond the past days
    pub lingering_window: TimeDelta,

    /// Snapshot file of the in-memory store
    pub snapshot_path: Option<PathBuf>,
}

impl EpgConfig {
    pub fn new() -> Self {
        Self {
            past_days_to_keep: 1,
            future_days_to_display: 3,
            lingering_window: TimeDelta::zero(),
            snapshot_path: None,
        }
    }

    /// Set days of past entries to keep
    pub fn past_days_to_keep(mut self, days: u32) -> Self {
        self.past_days_to_keep = days;
        self
    }

    /// Set days ahead to display
    pub fn future_days_to_display(mut self, days: u32) -> Self {
        self.future_days_to_display = days;
        self
    }

    /// Set lingering window
    pub fn lingering_window(mut self, window: TimeDelta) -> Self {
        self.lingering_window = window;
        self
    }

    /// Set snapshot path
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Parse from a `key=value;key=value` string
    ///
    /// Keys: `past_days`, `future_days`, `lingering_minutes`, `snapshot`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use epg_timeline::EpgConfig;
    /// let config = EpgConfig::from_pairs("past_days=2;future_days=7").unwrap();
    /// assert_eq!(config.past_days_to_keep, 2);
    /// assert_eq!(config.future_days_to_display, 7);
    /// ```
    pub fn from_pairs(input: &str) -> Result<Self> {
        let mut config = Self::new();

        for pair in input.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| EpgError::Config(format!("Expected key=value, got '{}'", pair)))?;
            let value = value.trim();

            match key.trim() {
                "past_days" => config.past_days_to_keep = parse_number(key, value)?,
                "future_days" => config.future_days_to_display = parse_number(key, value)?,
                "lingering_minutes" => {
                    let minutes: i64 = parse_number(key, value)?;
                    config.lingering_window = TimeDelta::try_minutes(minutes).ok_or_else(|| {
                        EpgError::Config(format!("lingering_minutes out of range: {}", minutes))
                    })?;
                }
                "snapshot" => config.snapshot_path = Some(PathBuf::from(value)),
                other => return Err(EpgError::Config(format!("Unknown key '{}'", other))),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.future_days_to_display == 0 {
            return Err(EpgError::Config("future_days_to_display must be > 0".to_string()));
        }

        if self.lingering_window < TimeDelta::zero() {
            return Err(EpgError::Config("lingering_window cannot be negative".to_string()));
        }

        Ok(())
    }

    /// Bounds of the timeline shown around `now`
    pub fn display_window(&self, now: Timestamp) -> (Timestamp, Timestamp) {
        (
            now - TimeDelta::days(i64::from(self.past_days_to_keep)),
            now + TimeDelta::days(i64::from(self.future_days_to_display)),
        )
    }

    /// Entries ending before this instant may be purged
    pub fn cleanup_cutoff(&self, now: Timestamp) -> Timestamp {
        now - TimeDelta::days(i64::from(self.past_days_to_keep)) - self.lingering_window
    }
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| EpgError::Config(format!("Invalid value for '{}': '{}'", key, value)))
}
