use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven states a device moves through during one crawl.
///
/// See `spec.md` §4.2 for the full semantics of each state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    Queued,
    Connecting,
    Collecting,
    Discovered,
    Enriched,
    Done,
    Error,
}

impl DeviceState {
    pub const ALL: &'static [DeviceState] = &[
        DeviceState::Queued,
        DeviceState::Connecting,
        DeviceState::Collecting,
        DeviceState::Discovered,
        DeviceState::Enriched,
        DeviceState::Done,
        DeviceState::Error,
    ];

    /// The lowercase form stored in the `devices.state` column.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DeviceState::Queued => "queued",
            DeviceState::Connecting => "connecting",
            DeviceState::Collecting => "collecting",
            DeviceState::Discovered => "discovered",
            DeviceState::Enriched => "enriched",
            DeviceState::Done => "done",
            DeviceState::Error => "error",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => DeviceState::Queued,
            "connecting" => DeviceState::Connecting,
            "collecting" => DeviceState::Collecting,
            "discovered" => DeviceState::Discovered,
            "enriched" => DeviceState::Enriched,
            "done" => DeviceState::Done,
            "error" => DeviceState::Error,
            _ => return None,
        })
    }

    /// A claim is only legal while a device is in one of the "working" states.
    pub fn is_working_state(&self) -> bool {
        matches!(
            self,
            DeviceState::Connecting
                | DeviceState::Collecting
                | DeviceState::Discovered
                | DeviceState::Enriched
        )
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}
