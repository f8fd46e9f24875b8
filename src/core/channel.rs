use serde::{Deserialize, Serialize};

/// Channel metadata shared by every entry of a timeline.
///
/// Entries hold it behind an `Arc` and never own it; the container re-stamps
/// the current value whenever it hands an entry out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelData {
    pub channel_id: i32,
    pub client_id: i32,
    pub channel_name: String,
    pub icon_path: String,
    pub is_radio: bool,
    pub is_hidden: bool,
    pub is_locked: bool,
    pub is_epg_enabled: bool,
}

impl ChannelData {
    pub fn new(channel_id: i32, channel_name: impl Into<String>) -> Self {
        Self {
            channel_id,
            client_id: -1,
            channel_name: channel_name.into(),
            icon_path: String::new(),
            is_radio: false,
            is_hidden: false,
            is_locked: false,
            is_epg_enabled: true,
        }
    }

    pub fn client_id(mut self, client_id: i32) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn icon_path(mut self, icon_path: impl Into<String>) -> Self {
        self.icon_path = icon_path.into();
        self
    }

    pub fn radio(mut self, is_radio: bool) -> Self {
        self.is_radio = is_radio;
        self
    }

    pub fn hidden(mut self, is_hidden: bool) -> Self {
        self.is_hidden = is_hidden;
        self
    }

    pub fn locked(mut self, is_locked: bool) -> Self {
        self.is_locked = is_locked;
        self
    }

    pub fn epg_enabled(mut self, enabled: bool) -> Self {
        self.is_epg_enabled = enabled;
        self
    }
}
