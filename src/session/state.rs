//! Client liveness state machine
//!
//! A client decays ACTIVE -> STANDBY -> INACTIVE -> DISCONNECTED as time
//! passes without a sign of life. A fresh sign of life moves it straight back
//! to ACTIVE on the next evaluation; DISCONNECTED is terminal.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::LivenessConfig;

/// Client liveness state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientState {
    /// Recently heard from
    Active,
    /// Quiet for longer than the standby threshold
    Standby,
    /// Quiet for longer than the inactive threshold
    Inactive,
    /// Quiet for longer than the disconnect threshold; the client is torn down
    Disconnected,
}

impl ClientState {
    /// Classify a client by the time elapsed since its last sign of life
    pub fn classify(elapsed: Duration, config: &LivenessConfig) -> Self {
        if elapsed > config.disconnect_after {
            ClientState::Disconnected
        } else if elapsed > config.inactive_after {
            ClientState::Inactive
        } else if elapsed > config.standby_after {
            ClientState::Standby
        } else {
            ClientState::Active
        }
    }

    /// Whether a probe should go out at this elapsed time
    pub fn needs_probe(elapsed: Duration, config: &LivenessConfig) -> bool {
        elapsed > config.ping_after
    }

    /// DISCONNECTED is the only terminal state
    pub fn is_terminal(self) -> bool {
        self == ClientState::Disconnected
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Active => "ACTIVE",
            ClientState::Standby => "STANDBY",
            ClientState::Inactive => "INACTIVE",
            ClientState::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}
