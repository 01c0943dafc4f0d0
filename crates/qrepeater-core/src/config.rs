//! Chain parameters.
//!
//! Only `t_clock` and the derived attempt budget reach the protocols; the
//! probabilities are consumed by the pair-source model and are kept here so
//! one struct describes a whole run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Signal speed in fibre, km/s.
pub const FIBRE_SPEED_KM_PER_S: f64 = 200_000.0;

/// Propagation delay over `length_km` of fibre, rounded up to whole
/// nanoseconds.
pub fn fibre_delay(length_km: f64) -> Duration {
    let nanos = (length_km * (1e9 / FIBRE_SPEED_KM_PER_S)).ceil();
    if nanos.is_finite() && nanos > 0.0 {
        Duration::from_nanos(nanos as u64)
    } else {
        Duration::ZERO
    }
}

/// What a purification protocol does when the two outcome bits differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurificationPolicy {
    /// Emit `PURIFIED(false)` and leave both slots occupied.
    Report,
    /// Free both slots and regenerate both links, up to `max_rounds` rounds
    /// in total, then emit `PURIFIED(false)`.
    Retry {
        /// Total rounds, including the first
        max_rounds: u32,
    },
}

impl Default for PurificationPolicy {
    fn default() -> Self {
        Self::Retry { max_rounds: 3 }
    }
}

/// Timing parameters shared by both ends of one link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkParams {
    /// Attempts per window
    pub k_attempts: u32,
    /// Width of one attempt tick
    pub t_clock: Duration,
    /// Node-to-node fibre length
    pub link_length_km: f64,
    /// Slack added after the last tick before the window closes
    pub window_grace: Duration,
}

impl LinkParams {
    /// Time for a classical message to cross the whole link.
    pub fn propagation_delay(&self) -> Duration {
        fibre_delay(self.link_length_km)
    }

    /// Time between opening a window and its expiry timer.
    pub fn window_span(&self) -> Duration {
        self.t_clock.saturating_mul(self.k_attempts) + self.window_grace
    }
}

/// Parameters for one run of the three-node chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Length of each of the two links
    pub link_length_km: f64,
    /// Probability an arm survives its half of the link
    pub p_lr: f64,
    /// Probability a source firing produces a pair
    pub p_m: f64,
    /// Width of one attempt tick (also the source period)
    pub t_clock: Duration,
    /// Slack added after the last tick of a window
    pub window_grace: Duration,
    /// Mismatch handling for purification
    pub purification: PurificationPolicy,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            link_length_km: 30.0,
            p_lr: 0.9,
            p_m: 0.02,
            t_clock: Duration::from_nanos(10),
            window_grace: Duration::from_nanos(5),
            purification: PurificationPolicy::default(),
        }
    }
}

impl ChainConfig {
    /// Check every parameter is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("p_lr", self.p_lr), ("p_m", self.p_m)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidProbability { name, value });
            }
        }
        if !(self.link_length_km.is_finite() && self.link_length_km > 0.0) {
            return Err(ConfigError::InvalidLength(self.link_length_km));
        }
        if self.t_clock.is_zero() {
            return Err(ConfigError::ZeroClock);
        }
        if let PurificationPolicy::Retry { max_rounds: 0 } = self.purification {
            return Err(ConfigError::ZeroRounds);
        }
        Ok(())
    }

    /// Attempts per window: `ceil(1 / (p_m * p_lr))`.
    pub fn k_attempts(&self) -> u32 {
        let k = (1.0 / (self.p_m * self.p_lr)).ceil();
        if k.is_finite() && k >= 1.0 { k.min(f64::from(u32::MAX)) as u32 } else { 1 }
    }

    /// Per-link timing derived from this configuration.
    pub fn link_params(&self) -> LinkParams {
        LinkParams {
            k_attempts: self.k_attempts(),
            t_clock: self.t_clock,
            link_length_km: self.link_length_km,
            window_grace: self.window_grace,
        }
    }

    /// Delay of a classical channel between neighbouring nodes.
    pub fn classical_delay(&self) -> Duration {
        fibre_delay(self.link_length_km)
    }

    /// Delay from a mid-link source to either node.
    pub fn arm_delay(&self) -> Duration {
        fibre_delay(self.link_length_km / 2.0)
    }
}
