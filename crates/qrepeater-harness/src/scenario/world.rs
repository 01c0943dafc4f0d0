//! World state for scenario verification.
//!
//! Wraps the chain after its run and answers questions about it through the
//! journal, so oracles never reach into protocol internals.

use qrepeater_core::{JournalEntry, NodeId, ProtocolId, Report, Signal, SimTime};

use crate::{
    chain::{ChainHandles, ChainOutcome, RepeaterChain},
    sim_backend::SimBackend,
};

/// Final state of a scenario run.
pub struct World {
    chain: RepeaterChain,
}

impl World {
    /// Wrap a chain that has been run.
    pub fn new(chain: RepeaterChain) -> Self {
        Self { chain }
    }

    /// Installed handles.
    pub fn handles(&self) -> &ChainHandles {
        self.chain.handles()
    }

    /// How the run ended.
    pub fn outcome(&self) -> ChainOutcome {
        self.chain.outcome()
    }

    /// Time the run stopped at.
    pub fn now(&self) -> SimTime {
        self.chain.scheduler().now()
    }

    /// Backend after the run.
    pub fn backend(&self) -> &SimBackend {
        self.chain.scheduler().backend()
    }

    /// Every journal entry.
    pub fn entries(&self) -> &[JournalEntry] {
        self.chain.scheduler().journal().entries()
    }

    /// Handle of the protocol called `name`.
    pub fn protocol(&self, name: &str) -> Option<ProtocolId> {
        self.chain.protocol_id(name)
    }

    /// Signals emitted by `id`, with times.
    pub fn signals_from(&self, id: ProtocolId) -> Vec<(SimTime, Signal)> {
        self.chain.scheduler().journal().signals_from(id)
    }

    /// Reports made by `id`, with times.
    pub fn reports_from(&self, id: ProtocolId) -> Vec<(SimTime, Report)> {
        self.chain.scheduler().journal().reports_from(id)
    }

    /// Last `PURIFIED` result of the purification called `name`.
    pub fn purified(&self, name: &str) -> Option<bool> {
        let id = self.protocol(name)?;
        self.signals_from(id).into_iter().rev().find_map(|(_, signal)| match signal {
            Signal::Purified { success } => Some(success),
            _ => None,
        })
    }

    /// Number of windows that ended in agreement, per node.
    pub fn entanglements_on(&self, node: NodeId) -> usize {
        self.entries()
            .iter()
            .filter(|e| match e {
                JournalEntry::Signal { node: n, signal: Signal::Entangled, .. } => *n == node,
                _ => false,
            })
            .count()
    }
}
