//! Temperature-based level cap.

use crate::link::MAX_LEVEL_OR_TEMPERATURE;

/// Cap meaning "no restriction": the full level and setpoint range.
pub const UNRESTRICTED: u16 = MAX_LEVEL_OR_TEMPERATURE;

/// `(degrees below threshold, cap)`, hottest first.
const STEPS: [(i32, u16); 6] = [(0, 1), (1, 2), (3, 4), (5, 6), (8, 8), (11, 10)];

/// Maps case temperature to the highest level/setpoint the heater may run at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelCapPolicy {
    threshold: i16,
    enabled: bool,
}

impl LevelCapPolicy {
    /// Create a policy around a critical threshold.
    pub fn new(threshold: i16, enabled: bool) -> Self {
        Self { threshold, enabled }
    }

    /// Highest permissible level for `temperature`.
    ///
    /// Decreases stepwise as the temperature approaches the threshold and is
    /// 1 at or above it. Always [`UNRESTRICTED`] when disabled.
    pub fn max_allowed(&self, temperature: i16) -> u16 {
        if !self.enabled {
            return UNRESTRICTED;
        }
        let threshold = self.threshold as i32;
        STEPS
            .iter()
            .find(|(margin, _)| temperature as i32 >= threshold - margin)
            .map(|&(_, cap)| cap)
            .unwrap_or(UNRESTRICTED)
    }

    /// Check if a cap restricts anything.
    pub fn is_limiting(cap: u16) -> bool {
        cap < UNRESTRICTED
    }

    /// Check if the policy is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The critical threshold in °C.
    pub fn threshold(&self) -> i16 {
        self.threshold
    }
}
