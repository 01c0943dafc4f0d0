//! Seeded quantum backend.
//!
//! Tracks which pair half sits in which slot and produces measurement
//! outcomes from a seeded RNG. No quantum state is simulated: a purification
//! outcome is drawn once per pair-of-pairs and the second end to measure
//! sees the same bit, flipped with probability `purify_error`. Bell
//! measurement outcomes are uniform.
//!
//! Tests can pin outcomes per `(node, op)` with [`SimBackend::script`];
//! scripted outcomes are consumed before the model is consulted.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    time::Duration,
};

use qrepeater_core::{
    BackendError, NodeId, OpOutcome, QuantumBackend, QuantumOp, Qubit, SlotIndex,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// Every operation takes one nanosecond.
pub const OP_DURATION: Duration = Duration::from_nanos(1);

/// One executed quantum operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpRecord {
    /// Node that ran it
    pub node: NodeId,
    /// Program
    pub op: QuantumOp,
    /// Slots it acted on
    pub slots: Vec<SlotIndex>,
    /// Outcome returned
    pub outcome: OpOutcome,
}

/// In-memory backend with seeded outcomes.
#[derive(Debug)]
pub struct SimBackend {
    memories: BTreeMap<NodeId, Vec<Option<Qubit>>>,
    rng: ChaCha8Rng,
    purify_error: f64,
    parities: HashMap<(u64, u64), u8>,
    scripts: HashMap<(NodeId, QuantumOp), VecDeque<OpOutcome>>,
    history: Vec<OpRecord>,
    puts: u64,
}

impl SimBackend {
    /// Backend with no nodes, drawing outcomes from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            memories: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            purify_error: 0.0,
            parities: HashMap::new(),
            scripts: HashMap::new(),
            history: Vec::new(),
            puts: 0,
        }
    }

    /// Probability that the two ends of a purification see different bits.
    /// Clamped to `[0, 1]`.
    #[must_use]
    pub fn with_purify_error(mut self, p: f64) -> Self {
        self.purify_error = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        self
    }

    /// Give `node` a memory of `slots` empty slots.
    pub fn add_node(&mut self, node: NodeId, slots: usize) {
        self.memories.insert(node, vec![None; slots]);
    }

    /// Queue outcomes returned by the next runs of `op` on `node`.
    pub fn script(
        &mut self,
        node: NodeId,
        op: QuantumOp,
        outcomes: impl IntoIterator<Item = OpOutcome>,
    ) {
        self.scripts.entry((node, op)).or_default().extend(outcomes);
    }

    /// Every operation run so far, in order.
    pub fn history(&self) -> &[OpRecord] {
        &self.history
    }

    /// Occupied slots of `node`.
    pub fn occupied(&self, node: NodeId) -> Vec<SlotIndex> {
        self.memories
            .get(&node)
            .map(|m| m.iter().enumerate().filter(|(_, q)| q.is_some()).map(|(i, _)| i).collect())
            .unwrap_or_default()
    }

    /// Number of successful `put`s.
    pub fn puts(&self) -> u64 {
        self.puts
    }

    fn slot_mut(
        &mut self,
        node: NodeId,
        slot: SlotIndex,
    ) -> Result<&mut Option<Qubit>, BackendError> {
        self.memories
            .get_mut(&node)
            .ok_or(BackendError::UnknownNode(node))?
            .get_mut(slot)
            .ok_or(BackendError::SlotOutOfRange { node, slot })
    }

    fn occupant(&self, node: NodeId, slot: SlotIndex) -> Result<Qubit, BackendError> {
        let memory = self.memories.get(&node).ok_or(BackendError::UnknownNode(node))?;
        match memory.get(slot) {
            Some(Some(qubit)) => Ok(*qubit),
            Some(None) => Err(BackendError::SlotEmpty { node, slot }),
            None => Err(BackendError::SlotOutOfRange { node, slot }),
        }
    }

    fn purify_bit(&mut self, a: Qubit, b: Qubit) -> u8 {
        let key = (a.pair.min(b.pair), a.pair.max(b.pair));
        if let Some(bit) = self.parities.remove(&key) {
            let flip = self.purify_error > 0.0 && self.rng.gen_bool(self.purify_error);
            bit ^ u8::from(flip)
        } else {
            let bit = self.rng.gen_range(0..=1u8);
            self.parities.insert(key, bit);
            bit
        }
    }
}

impl QuantumBackend for SimBackend {
    fn put(&mut self, node: NodeId, slot: SlotIndex, qubit: Qubit) -> Result<(), BackendError> {
        let cell = self.slot_mut(node, slot)?;
        if cell.is_some() {
            return Err(BackendError::SlotOccupied { node, slot });
        }
        *cell = Some(qubit);
        self.puts += 1;
        trace!(node, slot, pair = qubit.pair, "qubit stored");
        Ok(())
    }

    fn pop(&mut self, node: NodeId, slot: SlotIndex) -> Result<Qubit, BackendError> {
        self.slot_mut(node, slot)?.take().ok_or(BackendError::SlotEmpty { node, slot })
    }

    fn peek(&self, node: NodeId, slot: SlotIndex) -> Option<Qubit> {
        self.memories.get(&node)?.get(slot).copied().flatten()
    }

    fn apply_op(
        &mut self,
        node: NodeId,
        op: QuantumOp,
        slots: &[SlotIndex],
    ) -> Result<OpOutcome, BackendError> {
        let &[first, second] = slots else {
            return Err(BackendError::Arity { op, expected: op.arity(), got: slots.len() });
        };
        let a = self.occupant(node, first)?;
        let b = self.occupant(node, second)?;

        let scripted = self.scripts.get_mut(&(node, op)).and_then(VecDeque::pop_front);
        let outcome = match (scripted, op) {
            (Some(outcome), _) => outcome,
            (None, QuantumOp::Purify) => OpOutcome::Bit(self.purify_bit(a, b)),
            (None, QuantumOp::BellMeasure) => OpOutcome::Bell(self.rng.gen_range(0..4u8)),
        };

        self.history.push(OpRecord { node, op, slots: slots.to_vec(), outcome });
        Ok(outcome)
    }

    fn op_duration(&self, _op: QuantumOp) -> Duration {
        OP_DURATION
    }
}
