//! Liveness configuration

use std::time::Duration;

use crate::error::ConfigError;

/// Thresholds driving the client state machine
///
/// Each threshold is compared against the time elapsed since the client's
/// last sign of life; they must satisfy
/// `ping_after < standby_after < inactive_after < disconnect_after`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Probe the client once this much time has passed without a sign of life
    pub ping_after: Duration,

    /// Enter STANDBY after this long
    pub standby_after: Duration,

    /// Enter INACTIVE after this long
    pub inactive_after: Duration,

    /// Enter DISCONNECTED (and deactivate) after this long
    pub disconnect_after: Duration,

    /// Period of the liveness timer
    pub tick_interval: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_after: Duration::from_secs(1),
            standby_after: Duration::from_secs(3),
            inactive_after: Duration::from_secs(10),
            disconnect_after: Duration::from_secs(15),
            tick_interval: Duration::from_millis(500),
        }
    }
}

impl LivenessConfig {
    /// Set the ping threshold
    pub fn ping_after(mut self, threshold: Duration) -> Self {
        self.ping_after = threshold;
        self
    }

    /// Set the standby threshold
    pub fn standby_after(mut self, threshold: Duration) -> Self {
        self.standby_after = threshold;
        self
    }

    /// Set the inactive threshold
    pub fn inactive_after(mut self, threshold: Duration) -> Self {
        self.inactive_after = threshold;
        self
    }

    /// Set the disconnect threshold
    pub fn disconnect_after(mut self, threshold: Duration) -> Self {
        self.disconnect_after = threshold;
        self
    }

    /// Set the timer period
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Check threshold ordering and tick period
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTick);
        }

        let ordered = self.ping_after < self.standby_after
            && self.standby_after < self.inactive_after
            && self.inactive_after < self.disconnect_after;
        if !ordered {
            return Err(ConfigError::ThresholdOrder {
                ping: self.ping_after,
                standby: self.standby_after,
                inactive: self.inactive_after,
                disconnect: self.disconnect_after,
            });
        }

        Ok(())
    }
}
