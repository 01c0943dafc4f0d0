//! Simulated time.
//!
//! The whole chain shares one logical clock with nanosecond resolution.
//! Instants are [`SimTime`]; spans are plain [`Duration`]s.

use std::{
    fmt,
    ops::{Add, Sub},
    time::Duration,
};

use serde::{Deserialize, Serialize};

/// An instant on the simulation timeline, in nanoseconds since the start of
/// the run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime(u64);

impl SimTime {
    /// Start of the run.
    pub const ZERO: Self = Self(0);

    /// Instant `nanos` nanoseconds after the start of the run.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since the start of the run.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Decode a timestamp carried in a classical message.
    pub fn from_wire(value: i64) -> Option<Self> {
        u64::try_from(value).ok().map(Self)
    }

    /// Encode as the integer field of a classical message.
    pub fn to_wire(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// Span elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Smallest multiple of `period` that is `>= self`.
    ///
    /// A zero period leaves the instant unchanged.
    #[must_use]
    pub fn align_up(self, period: Duration) -> Self {
        let period = duration_nanos(period);
        if period == 0 {
            return self;
        }
        match self.0 % period {
            0 => self,
            rem => Self(self.0.saturating_add(period - rem)),
        }
    }
}

/// Whole nanoseconds in `d`, saturating at `u64::MAX`.
pub fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl Add<Duration> for SimTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(duration_nanos(rhs)))
    }
}

impl Sub for SimTime {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.saturating_since(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_to_grid() {
        let period = Duration::from_nanos(10);
        assert_eq!(SimTime::from_nanos(0).align_up(period), SimTime::from_nanos(0));
        assert_eq!(SimTime::from_nanos(1).align_up(period), SimTime::from_nanos(10));
        assert_eq!(SimTime::from_nanos(10).align_up(period), SimTime::from_nanos(10));
        assert_eq!(SimTime::from_nanos(19).align_up(period), SimTime::from_nanos(20));
    }

    #[test]
    fn subtraction_saturates() {
        let early = SimTime::from_nanos(5);
        let late = SimTime::from_nanos(12);
        assert_eq!(late - early, Duration::from_nanos(7));
        assert_eq!(early - late, Duration::ZERO);
    }

    #[test]
    fn wire_rejects_negative() {
        assert_eq!(SimTime::from_wire(-1), None);
        assert_eq!(SimTime::from_wire(42), Some(SimTime::from_nanos(42)));
    }
}
