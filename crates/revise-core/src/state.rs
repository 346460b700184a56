//! Shared cross-client state types.

use std::fmt;

/// Phase of the sync client, published to whoever renders sync status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Idle,
    InFlight,
    Succeeded,
    Failed,
}

impl SyncState {
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::InFlight)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::InFlight => "syncing",
            Self::Succeeded => "synced",
            Self::Failed => "error",
        })
    }
}
