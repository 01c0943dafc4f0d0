//! Run journal: the observable history of a scheduler run.
//!
//! Oracles and the CLI read outcomes from here instead of poking into
//! protocol internals.

use serde::{Deserialize, Serialize};

use crate::{
    node::{NodeId, ProtocolId},
    protocol::{Report, Signal},
    time::SimTime,
};

/// One recorded occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEntry {
    /// A protocol emitted a signal
    Signal {
        /// Emission time
        at: SimTime,
        /// Emitting protocol
        sender: ProtocolId,
        /// Node of the emitter
        node: NodeId,
        /// Signal and payload
        signal: Signal,
    },
    /// A protocol reported a result
    Report {
        /// Report time
        at: SimTime,
        /// Reporting protocol
        protocol: ProtocolId,
        /// Node of the reporter
        node: NodeId,
        /// Reported result
        report: Report,
    },
    /// A protocol reached its terminal state
    Finished {
        /// Completion time
        at: SimTime,
        /// Finished protocol
        protocol: ProtocolId,
    },
}

/// Append-only log of a run.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub(crate) fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    /// All entries, in recording order.
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Signals emitted by `sender`, with their times.
    pub fn signals_from(&self, sender: ProtocolId) -> Vec<(SimTime, Signal)> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Signal { at, sender: s, signal, .. } if *s == sender => {
                    Some((*at, *signal))
                },
                _ => None,
            })
            .collect()
    }

    /// Reports made by `protocol`, with their times.
    pub fn reports_from(&self, protocol: ProtocolId) -> Vec<(SimTime, Report)> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Report { at, protocol: p, report, .. } if *p == protocol => {
                    Some((*at, *report))
                },
                _ => None,
            })
            .collect()
    }

    /// Time `protocol` last finished.
    pub fn finished_at(&self, protocol: ProtocolId) -> Option<SimTime> {
        self.entries.iter().rev().find_map(|e| match e {
            JournalEntry::Finished { at, protocol: p } if *p == protocol => Some(*at),
            _ => None,
        })
    }
}
