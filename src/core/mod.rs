pub mod channel;
pub mod entry;
pub mod error;
pub mod types;

pub use channel::ChannelData;
pub use entry::{ProgramDetails, ProgramEntry, SharedEntry};
pub use error::{EpgError, Result};
pub use types::{ONE_SECOND, Timestamp, intervals_overlap};
