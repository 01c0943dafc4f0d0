//! Quantum backend abstraction.
//!
//! The core never manipulates quantum states. It moves opaque [`Qubit`]
//! references between ports and memory slots and asks the backend to run
//! two-qubit programs on occupied slots. Any backend failure is fatal to the
//! run: a protocol that issued an operation waits for its outcome with no
//! way to cancel it.

use std::{fmt, time::Duration};

use crate::{
    error::BackendError,
    node::{NodeId, SlotIndex},
};

/// Which end of an entangled pair a qubit is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arm {
    /// Arm travelling towards the left node of the link
    A,
    /// Arm travelling towards the right node of the link
    B,
}

/// Opaque reference to one half of an emitted pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Qubit {
    /// Identifier of the pair, unique per backend run
    pub pair: u64,
    /// Which half of the pair
    pub arm: Arm,
}

impl Qubit {
    /// Reference to `arm` of pair `pair`.
    pub fn new(pair: u64, arm: Arm) -> Self {
        Self { pair, arm }
    }
}

/// Local two-qubit programs the protocols request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantumOp {
    /// CNOT from the first slot onto the second, then measure the second.
    /// Yields one bit.
    Purify,
    /// Bell-basis measurement of both slots. Yields two bits.
    BellMeasure,
}

impl QuantumOp {
    /// Number of slots the operation acts on.
    pub fn arity(self) -> usize {
        2
    }
}

impl fmt::Display for QuantumOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Purify => f.write_str("purify"),
            Self::BellMeasure => f.write_str("bell-measure"),
        }
    }
}

/// Classical result of a completed [`QuantumOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpOutcome {
    /// Single measurement bit (0 or 1)
    Bit(u8),
    /// Bell measurement outcome (0..=3)
    Bell(u8),
}

/// Quantum memory and gate execution, provided by the embedding simulation.
pub trait QuantumBackend {
    /// Store `qubit` in an empty slot.
    ///
    /// # Errors
    ///
    /// Returns `SlotOccupied` if the slot already holds a qubit.
    fn put(&mut self, node: NodeId, slot: SlotIndex, qubit: Qubit) -> Result<(), BackendError>;

    /// Remove and return the qubit held in `slot`.
    ///
    /// # Errors
    ///
    /// Returns `SlotEmpty` if there is nothing to remove.
    fn pop(&mut self, node: NodeId, slot: SlotIndex) -> Result<Qubit, BackendError>;

    /// Inspect a slot without disturbing it. Diagnostics only.
    fn peek(&self, node: NodeId, slot: SlotIndex) -> Option<Qubit>;

    /// Run `op` on `slots` and return its classical outcome.
    fn apply_op(
        &mut self,
        node: NodeId,
        op: QuantumOp,
        slots: &[SlotIndex],
    ) -> Result<OpOutcome, BackendError>;

    /// Simulated time `op` takes to complete.
    fn op_duration(&self, op: QuantumOp) -> Duration;
}
