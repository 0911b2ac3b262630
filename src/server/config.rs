//! Broker configuration

use std::time::Duration;

use crate::error::ConfigError;
use crate::registry::StaleClientPolicy;
use crate::session::LivenessConfig;

/// Broker configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Liveness thresholds applied to every client
    pub liveness: LivenessConfig,

    /// How long an unanswered probe is kept before it is reclaimed
    pub probe_expiry: Duration,

    /// Period of the expired-probe sweeper
    pub probe_sweep_interval: Duration,

    /// Treatment of a stale client replaced by a re-registration
    pub reregistration: StaleClientPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let liveness = LivenessConfig::default();
        Self {
            probe_expiry: liveness.disconnect_after,
            liveness,
            probe_sweep_interval: Duration::from_secs(5),
            reregistration: StaleClientPolicy::default(),
        }
    }
}

impl BrokerConfig {
    /// Create a config around custom liveness thresholds
    ///
    /// Probe expiry follows the disconnect threshold.
    pub fn with_liveness(liveness: LivenessConfig) -> Self {
        Self {
            probe_expiry: liveness.disconnect_after,
            liveness,
            ..Default::default()
        }
    }

    /// Set the probe expiry
    pub fn probe_expiry(mut self, expiry: Duration) -> Self {
        self.probe_expiry = expiry;
        self
    }

    /// Set the sweeper period
    pub fn probe_sweep_interval(mut self, interval: Duration) -> Self {
        self.probe_sweep_interval = interval;
        self
    }

    /// Set the re-registration policy
    pub fn reregistration(mut self, policy: StaleClientPolicy) -> Self {
        self.reregistration = policy;
        self
    }

    /// Validate liveness thresholds and the sweeper period
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.liveness.validate()?;
        if self.probe_sweep_interval.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();

        assert_eq!(config.liveness, LivenessConfig::default());
        assert_eq!(config.probe_expiry, Duration::from_secs(15));
        assert_eq!(config.probe_sweep_interval, Duration::from_secs(5));
        assert_eq!(config.reregistration, StaleClientPolicy::Deactivate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_liveness_tracks_disconnect() {
        let liveness = LivenessConfig::default().disconnect_after(Duration::from_secs(60));
        let config = BrokerConfig::with_liveness(liveness);

        assert_eq!(config.probe_expiry, Duration::from_secs(60));
    }

    #[test]
    fn test_builder() {
        let config = BrokerConfig::default()
            .probe_expiry(Duration::from_secs(2))
            .probe_sweep_interval(Duration::from_millis(250))
            .reregistration(StaleClientPolicy::Detach);

        assert_eq!(config.probe_expiry, Duration::from_secs(2));
        assert_eq!(config.probe_sweep_interval, Duration::from_millis(250));
        assert_eq!(config.reregistration, StaleClientPolicy::Detach);
    }

    #[test]
    fn test_validate_rejects_bad_liveness() {
        let liveness = LivenessConfig::default().standby_after(Duration::from_secs(20));
        let config = BrokerConfig::with_liveness(liveness);

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOrder { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_sweep() {
        let config = BrokerConfig::default().probe_sweep_interval(Duration::ZERO);

        assert_eq!(config.validate(), Err(ConfigError::ZeroTick));
    }
}
