//! Messages pushed to dashboard clients.

use serde::{Deserialize, Serialize};

/// A dashboard update, tagged on `type` for the browser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DashboardEvent {
    /// A player joined the race.
    NewPlayer {
        /// Display name.
        user: String,
        /// Player id assigned at registration.
        uuid: String,
    },
    /// A player left or was removed.
    RemovePlayer {
        /// Display name.
        user: String,
    },
    /// A player checked in at a station.
    Visitation {
        /// Display name.
        user: String,
        /// Station code.
        station: String,
    },
    /// A player finished the race.
    Completion {
        /// Display name.
        username: String,
        /// Finishing position, starting at 1.
        place: u32,
    },
    /// The station list changed; clients refetch it.
    StationChange,
    /// Keep-alive frame.
    Ping,
}

impl DashboardEvent {
    /// The wire `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewPlayer { .. } => "newPlayer",
            Self::RemovePlayer { .. } => "removePlayer",
            Self::Visitation { .. } => "visitation",
            Self::Completion { .. } => "completion",
            Self::StationChange => "stationChange",
            Self::Ping => "ping",
        }
    }
}
