//! Timestamp-ordered event queue.
//!
//! Events at equal timestamps pop in the order they were scheduled. Every
//! run of the same configuration therefore replays identically.

use std::{cmp::Ordering, collections::BinaryHeap};

use bytes::Bytes;

use crate::{
    backend::Qubit,
    node::{LinkId, PortId, ProtocolId},
    protocol::Signal,
    time::SimTime,
};

/// Something the scheduler must do at a point in logical time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start (or restart) a protocol
    Start(ProtocolId),
    /// Deliver an emitted signal to one awaiter
    Signal {
        /// Awaiting protocol
        to: ProtocolId,
        /// Emitting protocol
        sender: ProtocolId,
        /// Signal and payload
        signal: Signal,
    },
    /// Timer deadline of one suspension
    Timer {
        /// Timed protocol
        protocol: ProtocolId,
        /// Suspension generation the timer belongs to
        generation: u64,
        /// Deadline as requested
        deadline: SimTime,
    },
    /// Completion of a protocol's pending quantum operation
    OpComplete {
        /// Protocol that issued the operation
        protocol: ProtocolId,
        /// Suspension generation that awaits it
        generation: u64,
    },
    /// Classical frame arrives at a port
    Deliver {
        /// Receiving port
        to: PortId,
        /// Encoded message
        frame: Bytes,
    },
    /// Photon arrives at a quantum port
    Photon {
        /// Receiving port
        to: PortId,
        /// Arriving qubit
        qubit: Qubit,
    },
    /// Pair source fires
    SourceTick {
        /// Firing source
        link: LinkId,
        /// Enable generation the tick belongs to
        generation: u64,
    },
}

#[derive(Debug)]
struct Scheduled {
    at: SimTime,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed: BinaryHeap is a max-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending events ordered by `(time, scheduling order)`.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl EventQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `event` at `at`.
    pub fn push(&mut self, at: SimTime, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { at, seq, event });
    }

    /// Remove the earliest event.
    pub fn pop(&mut self) -> Option<(SimTime, Event)> {
        self.heap.pop().map(|s| (s.at, s.event))
    }

    /// Time of the earliest event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|s| s.at)
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_order() {
        let mut queue = EventQueue::new();
        queue.push(SimTime::from_nanos(30), Event::Start(ProtocolId(3)));
        queue.push(SimTime::from_nanos(10), Event::Start(ProtocolId(1)));
        queue.push(SimTime::from_nanos(20), Event::Start(ProtocolId(2)));

        let order: Vec<_> =
            std::iter::from_fn(|| queue.pop()).map(|(at, _)| at.as_nanos()).collect();
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[test]
    fn ties_pop_in_scheduling_order() {
        let mut queue = EventQueue::new();
        let at = SimTime::from_nanos(7);
        for id in [4, 1, 3, 0, 2] {
            queue.push(at, Event::Start(ProtocolId(id)));
        }

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|(_, event)| match event {
                Event::Start(ProtocolId(id)) => id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(order, vec![4, 1, 3, 0, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn peek_reports_earliest() {
        let mut queue = EventQueue::new();
        assert_eq!(queue.peek_time(), None);

        queue.push(SimTime::from_nanos(5), Event::Start(ProtocolId(0)));
        queue.push(SimTime::from_nanos(2), Event::Start(ProtocolId(1)));
        assert_eq!(queue.peek_time(), Some(SimTime::from_nanos(2)));
        assert_eq!(queue.len(), 2);
    }
}
