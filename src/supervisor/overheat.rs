//! Overheat lockout.
//!
//! Once the case temperature reaches the critical threshold (or the heater
//! reports its own overheat fault) the guard engages and setting commands are
//! rejected until the lockout expires. A temperature that keeps climbing
//! during the lockout extends it.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::supervisor::state::OverheatStatus;

/// Result of feeding a reading to an engaged guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardUpdate {
    /// Lockout continues.
    Holding,
    /// The temperature rose by more than the configured delta since the last reading.
    StillRising {
        /// Rising events seen during this lockout.
        count: u32,
        /// This event switched to the extended lockout.
        escalated: bool,
    },
    /// The lockout expired.
    Released {
        /// How long the lockout lasted.
        elapsed: Duration,
    },
}

/// Tracks the overheat lockout.
#[derive(Debug, Clone)]
pub struct OverheatGuard {
    active: bool,
    start_time: Option<Instant>,
    last_temp: i16,
    rising_count: u32,
    lockout: Duration,
    base_lockout: Duration,
    extended_lockout: Duration,
    rise_delta: i16,
    escalation: u32,
}

impl OverheatGuard {
    /// Create an idle guard from the overheat settings.
    pub fn new(config: &SupervisorConfig) -> Self {
        Self {
            active: false,
            start_time: None,
            last_temp: 0,
            rising_count: 0,
            lockout: config.overheat_lockout,
            base_lockout: config.overheat_lockout,
            extended_lockout: config.overheat_extended_lockout,
            rise_delta: config.overheat_rise_delta,
            escalation: config.overheat_rise_escalation,
        }
    }

    /// Check if the lockout is in force.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Check if the lockout still blocks commands at `now`.
    ///
    /// The guard itself is only released by [`track`](Self::track), which
    /// needs an answered poll; this reads the clock instead.
    pub fn is_locked(&self, now: Instant) -> bool {
        self.remaining(now) > Duration::ZERO
    }

    /// Lockout length currently applied.
    pub fn lockout(&self) -> Duration {
        self.lockout
    }

    /// Engage the lockout at `temperature`.
    ///
    /// Re-engaging an active guard is a no-op so the start time is not reset.
    pub fn engage(&mut self, now: Instant, temperature: i16) {
        if self.active {
            return;
        }
        self.active = true;
        self.start_time = Some(now);
        self.last_temp = temperature;
        self.rising_count = 0;
        self.lockout = self.base_lockout;
        error!(
            "Overheat protection engaged at {}°C, lockout {}s",
            temperature,
            self.lockout.as_secs()
        );
    }

    /// Feed a reading to an engaged guard.
    ///
    /// Returns [`GuardUpdate::Holding`] on an idle guard.
    pub fn track(&mut self, now: Instant, temperature: i16) -> GuardUpdate {
        let Some(start) = self.start_time.filter(|_| self.active) else {
            return GuardUpdate::Holding;
        };

        let mut update = GuardUpdate::Holding;
        if (temperature as i32) > self.last_temp as i32 + self.rise_delta as i32 {
            self.rising_count += 1;
            let escalated =
                self.rising_count >= self.escalation && self.lockout < self.extended_lockout;
            warn!(
                "Temperature still rising during lockout: {}°C -> {}°C (count {})",
                self.last_temp, temperature, self.rising_count
            );
            if escalated {
                self.lockout = self.extended_lockout;
                error!(
                    "Temperature keeps rising, lockout extended to {}s",
                    self.lockout.as_secs()
                );
            }
            update = GuardUpdate::StillRising {
                count: self.rising_count,
                escalated,
            };
        }
        self.last_temp = temperature;

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= self.lockout {
            info!(
                "Overheat lockout expired after {:.0}s at {}°C",
                elapsed.as_secs_f64(),
                temperature
            );
            self.release();
            return GuardUpdate::Released { elapsed };
        }
        update
    }

    /// Time left until the lockout expires (zero when idle).
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.start_time {
            Some(start) if self.active => {
                self.lockout.saturating_sub(now.saturating_duration_since(start))
            }
            _ => Duration::ZERO,
        }
    }

    /// Remaining lockout in whole seconds, rounded up.
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        let remaining = self.remaining(now);
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    /// Snapshot for status reporting.
    pub fn status(&self, now: Instant) -> OverheatStatus {
        OverheatStatus {
            active: self.active,
            remaining: self.remaining(now),
            lockout: self.lockout,
            rising_count: self.rising_count,
        }
    }

    fn release(&mut self) {
        self.active = false;
        self.start_time = None;
        self.rising_count = 0;
        self.lockout = self.base_lockout;
    }
}
