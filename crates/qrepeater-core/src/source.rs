//! Entangled-pair source abstraction.
//!
//! A source sits in the middle of a link and, while enabled, fires once per
//! period. Each firing may yield zero, one or two arms reaching the link's
//! endpoints (pair generation and per-arm loss are the source's business).
//! The scheduler turns emissions into photon arrivals on the quantum ports
//! wired to each arm.

use std::time::Duration;

use crate::{backend::Qubit, time::SimTime};

/// One arm of a pair that survived the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emission {
    /// The qubit delivered to the arm's port
    pub qubit: Qubit,
}

/// A clocked entangled-pair source.
pub trait PairSource {
    /// Interval between firings.
    fn period(&self) -> Duration;

    /// Fire once at `now` and return the arms that reach their endpoint.
    fn emit(&mut self, now: SimTime) -> Vec<Emission>;
}
