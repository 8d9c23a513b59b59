//! Supervisor configuration.
//!
//! A single [`SupervisorConfig`] is built at startup and shared (behind an
//! `Arc`) with the supervisor. Nothing in the crate reads process-wide state.

use std::time::Duration;

/// Every tunable of the bridge.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SupervisorConfig {
    /// BLE address of the heater, e.g. `"AA:BB:CC:DD:EE:FF"`.
    pub ble_address: String,
    /// Device passkey (decimal, split into two key bytes).
    pub passkey: u16,
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Deadline for establishing the BLE link.
    pub connect_timeout: Duration,
    /// Pause between connect attempts inside the deadline.
    pub connect_retry_delay: Duration,
    /// How long a command waits for its status notification.
    pub response_timeout: Duration,
    /// Unanswered polls in a row before the link is declared dead.
    pub max_consecutive_failures: u32,
    /// Maximum time without a successful poll.
    pub watchdog_timeout: Duration,
    /// Backoff after a routed failure.
    pub reconnect_delay: Duration,
    /// Failed recoveries in a row before the backoff is extended.
    pub max_reconnect_attempts: u32,
    /// Multiplier applied to `reconnect_delay` once `max_reconnect_attempts` is reached.
    pub reconnect_backoff_factor: u32,
    /// Reset the adapter every N failed reconnects (0 disables).
    pub adapter_reset_every: u32,
    /// Bounded wait for the transport lock when handling a command.
    pub command_lock_timeout: Duration,
    /// Critical case temperature in °C.
    pub overheat_threshold: i16,
    /// Enable temperature-based level capping.
    pub temperature_limiting: bool,
    /// Default overheat lockout.
    pub overheat_lockout: Duration,
    /// Lockout once the temperature keeps rising during a lockout.
    pub overheat_extended_lockout: Duration,
    /// Rise in °C between polls that counts as "still rising".
    pub overheat_rise_delta: i16,
    /// Rising events that escalate the lockout.
    pub overheat_rise_escalation: u32,
}

impl SupervisorConfig {
    /// Default passkey of the heater controllers.
    pub const DEFAULT_PASSKEY: u16 = 1234;
    /// Default critical case temperature.
    pub const DEFAULT_OVERHEAT_THRESHOLD: i16 = 256;

    /// Create a configuration for a heater address with every other field defaulted.
    pub fn new(ble_address: impl Into<String>) -> Self {
        Self {
            ble_address: ble_address.into(),
            ..Self::default()
        }
    }

    /// Set the device passkey.
    pub fn with_passkey(mut self, passkey: u16) -> Self {
        self.passkey = passkey;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the critical case temperature.
    pub fn with_overheat_threshold(mut self, threshold: i16) -> Self {
        self.overheat_threshold = threshold;
        self
    }

    /// Enable or disable temperature-based level capping.
    pub fn with_temperature_limiting(mut self, enabled: bool) -> Self {
        self.temperature_limiting = enabled;
        self
    }

    /// Set the connect deadline and the pause between attempts.
    pub fn with_connect_timeouts(mut self, timeout: Duration, retry_delay: Duration) -> Self {
        self.connect_timeout = timeout;
        self.connect_retry_delay = retry_delay;
        self
    }

    /// Set the watchdog window.
    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    /// Set the base reconnect backoff.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the bounded wait for the transport lock.
    pub fn with_command_lock_timeout(mut self, timeout: Duration) -> Self {
        self.command_lock_timeout = timeout;
        self
    }

    /// Backoff to apply after a routed failure, given how many recoveries failed in a row.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt >= self.max_reconnect_attempts {
            self.reconnect_delay * self.reconnect_backoff_factor
        } else {
            self.reconnect_delay
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ble_address: String::new(),
            passkey: Self::DEFAULT_PASSKEY,
            poll_interval: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(10),
            connect_retry_delay: Duration::from_secs(1),
            response_timeout: Duration::from_secs(1),
            max_consecutive_failures: 2,
            watchdog_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            reconnect_backoff_factor: 3,
            adapter_reset_every: 5,
            command_lock_timeout: Duration::from_secs(5),
            overheat_threshold: Self::DEFAULT_OVERHEAT_THRESHOLD,
            temperature_limiting: true,
            overheat_lockout: Duration::from_secs(60),
            overheat_extended_lockout: Duration::from_secs(300),
            overheat_rise_delta: 2,
            overheat_rise_escalation: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(config.ble_address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(config.passkey, 1234);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.watchdog_timeout, Duration::from_secs(10));
        assert_eq!(config.max_consecutive_failures, 2);
        assert_eq!(config.overheat_threshold, 256);
        assert!(config.temperature_limiting);
    }

    #[test]
    fn test_builders() {
        let config = SupervisorConfig::new("x")
            .with_passkey(4321)
            .with_overheat_threshold(50)
            .with_temperature_limiting(false);
        assert_eq!(config.passkey, 4321);
        assert_eq!(config.overheat_threshold, 50);
        assert!(!config.temperature_limiting);
    }

    #[test]
    fn test_backoff_escalates() {
        let config = SupervisorConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(5));
        assert_eq!(config.backoff_for(4), Duration::from_secs(5));
        assert_eq!(config.backoff_for(5), Duration::from_secs(15));
    }
}
