//! Chat messages as they appear in the conversation log.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One user-visible entry of the conversation log.
///
/// Control frames never become a `Message`; only `UserText` frames do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    /// `true` for messages typed on this peer, `false` for the remote peer's.
    pub originated_locally: bool,
    /// Microseconds since the Unix epoch when the message was sent or received.
    pub timestamp_us: u64,
}

impl Message {
    /// A message typed locally, stamped with the current time.
    pub fn local(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            originated_locally: true,
            timestamp_us: current_timestamp_us(),
        }
    }

    /// A message received from the peer, stamped with the current time.
    pub fn remote(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            originated_locally: false,
            timestamp_us: current_timestamp_us(),
        }
    }

    /// Wall-clock `HH:MM` (UTC) of the timestamp, for compact display.
    pub fn clock_time(&self) -> String {
        let minutes_of_day = (self.timestamp_us / 60_000_000) % (24 * 60);
        format!("{:02}:{:02}", minutes_of_day / 60, minutes_of_day % 60)
    }
}

/// Returns the current time as microseconds since the Unix epoch.
pub fn current_timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
