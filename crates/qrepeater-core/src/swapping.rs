//! Entanglement swapping protocol.
//!
//! Two instances cooperate across the chain: the `Left` side runs on the
//! repeater and owns the Bell measurement, the `Right` side runs on an
//! endpoint and interprets the forwarded outcome. Each side first waits for
//! every purification in its wait set, then the two meet at a barrier made of
//! their `READY_TO_SWAP` signals before anything quantum happens.
//!
//! The peer's `READY_TO_SWAP` is latched even while local purifications are
//! still running, so a peer that finishes early is never missed.
//!
//! A purification reporting failure aborts the swap on that side. The peer
//! then stays parked at the barrier; the run journal records the abort.

use qrepeater_proto::{BellState, ClassicalMessage, MessageTag};
use tracing::{debug, info, warn};

use crate::{
    backend::{OpOutcome, QuantumOp},
    error::ProtocolError,
    node::{NodeId, PortName, ProtocolId, SlotIndex},
    protocol::{Action, Await, Protocol, Report, Signal, SignalKind, Step, Wakeup},
    time::SimTime,
};

/// Side of the swap barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapRole {
    /// Repeater side: measures its two inner qubits and forwards the result
    Left {
        /// Slots holding the two link halves, in measurement order
        slots: [SlotIndex; 2],
    },
    /// Endpoint side: resolves the forwarded outcome into a Bell state
    Right,
}

/// Swapping stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    /// Constructed, not started
    Init,
    /// Waiting for the purifications in the wait set
    AwaitingPurifications,
    /// Local side ready, waiting for the peer's `READY_TO_SWAP`
    AwaitingPeer,
    /// Bell measurement running (left side)
    Measuring,
    /// Waiting for the `SWAP` outcome message (right side)
    AwaitingOutcome,
    /// Swap finished
    Swapped,
    /// A purification failed; terminal
    Aborted,
}

impl SwapState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::AwaitingPurifications => "awaiting purifications",
            Self::AwaitingPeer => "awaiting peer",
            Self::Measuring => "measuring",
            Self::AwaitingOutcome => "awaiting outcome",
            Self::Swapped => "swapped",
            Self::Aborted => "aborted",
        }
    }
}

/// One side of an entanglement swap.
#[derive(Debug, Clone)]
pub struct Swapping {
    name: String,
    node: NodeId,
    role: SwapRole,
    wait_set: Vec<ProtocolId>,
    peer: ProtocolId,
    cport: PortName,
    state: SwapState,
    pending: Vec<ProtocolId>,
    peer_ready: bool,
    resolved: Option<BellState>,
}

impl Swapping {
    /// Create a swap that waits for every purification in `wait_set` and then
    /// meets `peer` at the barrier. `cport` carries the `SWAP` message: it is
    /// the sending port on the left side and the receiving port on the right.
    pub fn new(
        name: impl Into<String>,
        node: NodeId,
        role: SwapRole,
        wait_set: Vec<ProtocolId>,
        peer: ProtocolId,
        cport: PortName,
    ) -> Self {
        Self {
            name: name.into(),
            node,
            role,
            wait_set,
            peer,
            cport,
            state: SwapState::Init,
            pending: Vec::new(),
            peer_ready: false,
            resolved: None,
        }
    }

    /// Current stage.
    pub fn state(&self) -> SwapState {
        self.state
    }

    /// Bell state inferred by the right side.
    pub fn resolved(&self) -> Option<BellState> {
        self.resolved
    }

    fn purification_race(&self) -> Await {
        let mut race: Vec<Await> = self
            .pending
            .iter()
            .map(|&sender| Await::Signal { sender, kind: SignalKind::Purified })
            .collect();
        if !self.peer_ready {
            race.push(Await::Signal { sender: self.peer, kind: SignalKind::ReadyToSwap });
        }
        Await::FirstOf(race)
    }

    /// Every local purification succeeded: raise the barrier.
    fn ready(&mut self) -> Step {
        debug!(swap = %self.name, node = self.node, peer_ready = self.peer_ready, "ready to swap");
        let mut step = if self.peer_ready {
            self.proceed()
        } else {
            self.state = SwapState::AwaitingPeer;
            let peer = Await::Signal { sender: self.peer, kind: SignalKind::ReadyToSwap };
            Step::awaiting(vec![], peer)
        };
        step.actions.insert(0, Action::Emit(Signal::ReadyToSwap));
        step
    }

    fn proceed(&mut self) -> Step {
        match &self.role {
            SwapRole::Left { slots } => {
                self.state = SwapState::Measuring;
                Step::awaiting(
                    vec![Action::Apply { op: QuantumOp::BellMeasure, slots: slots.to_vec() }],
                    Await::QuantumOp,
                )
            },
            SwapRole::Right => {
                self.state = SwapState::AwaitingOutcome;
                Step::awaiting(vec![], Await::Port(self.cport))
            },
        }
    }

    fn on_purified(&mut self, sender: ProtocolId, success: bool) -> Step {
        if !success {
            warn!(
                swap = %self.name,
                node = self.node,
                cause = %sender,
                "purification failed, swap aborted"
            );
            self.state = SwapState::Aborted;
            return Step::done(vec![Action::Report(Report::SwapAborted { cause: sender })]);
        }

        self.pending.retain(|&p| p != sender);
        if self.pending.is_empty() {
            self.ready()
        } else {
            Step::awaiting(vec![], self.purification_race())
        }
    }

    fn on_outcome(&mut self, message: &ClassicalMessage) -> Result<Step, ProtocolError> {
        if message.tag() != MessageTag::Swap {
            return Err(ProtocolError::UnexpectedMessage {
                protocol: self.name.clone(),
                expected: MessageTag::Swap,
                got: message.tag(),
            });
        }
        let state = BellState::from_outcome(message.value()).map_err(|_| {
            ProtocolError::InvalidValue {
                protocol: self.name.clone(),
                tag: MessageTag::Swap,
                value: message.value(),
            }
        })?;

        info!(swap = %self.name, node = self.node, state = %state, "entanglement swapped");
        self.state = SwapState::Swapped;
        self.resolved = Some(state);
        Ok(Step::done(vec![Action::Report(Report::BellStateResolved(state))]))
    }

    fn unexpected(&self, wakeup: &Wakeup) -> ProtocolError {
        ProtocolError::UnexpectedWakeup {
            protocol: self.name.clone(),
            stage: self.state.as_str(),
            wakeup: wakeup.to_string(),
        }
    }
}

impl Protocol for Swapping {
    fn name(&self) -> &str {
        &self.name
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn start(&mut self, _now: SimTime) -> Result<Step, ProtocolError> {
        self.pending = self.wait_set.clone();
        self.peer_ready = false;
        self.resolved = None;

        if self.pending.is_empty() {
            return Ok(self.ready());
        }
        self.state = SwapState::AwaitingPurifications;
        Ok(Step::awaiting(vec![], self.purification_race()))
    }

    fn resume(&mut self, wakeup: Wakeup, _now: SimTime) -> Result<Step, ProtocolError> {
        match (self.state, &wakeup) {
            (
                SwapState::AwaitingPurifications,
                Wakeup::Signal { sender, signal: Signal::Purified { success } },
            ) if self.pending.contains(sender) => Ok(self.on_purified(*sender, *success)),
            (
                SwapState::AwaitingPurifications,
                Wakeup::Signal { sender, signal: Signal::ReadyToSwap },
            ) if *sender == self.peer => {
                debug!(swap = %self.name, node = self.node, "peer ready early");
                self.peer_ready = true;
                Ok(Step::awaiting(vec![], self.purification_race()))
            },
            (SwapState::AwaitingPeer, Wakeup::Signal { sender, signal: Signal::ReadyToSwap })
                if *sender == self.peer =>
            {
                self.peer_ready = true;
                Ok(self.proceed())
            },
            (SwapState::Measuring, Wakeup::QuantumOp(OpOutcome::Bell(outcome)))
                if *outcome <= 3 =>
            {
                info!(swap = %self.name, node = self.node, outcome, "bell measurement done");
                self.state = SwapState::Swapped;
                Ok(Step::done(vec![
                    Action::Send { port: self.cport, message: ClassicalMessage::swap(*outcome) },
                    Action::Report(Report::BellMeasured { outcome: *outcome }),
                ]))
            },
            (SwapState::AwaitingOutcome, Wakeup::Message { message, .. }) => {
                self.on_outcome(message)
            },
            _ => Err(self.unexpected(&wakeup)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PP1: ProtocolId = ProtocolId(10);
    const PP2: ProtocolId = ProtocolId(11);
    const LEFT: ProtocolId = ProtocolId(20);
    const RIGHT: ProtocolId = ProtocolId(21);

    fn t(nanos: u64) -> SimTime {
        SimTime::from_nanos(nanos)
    }

    fn purified(sender: ProtocolId, success: bool) -> Wakeup {
        Wakeup::Signal { sender, signal: Signal::Purified { success } }
    }

    fn ready(sender: ProtocolId) -> Wakeup {
        Wakeup::Signal { sender, signal: Signal::ReadyToSwap }
    }

    fn left() -> Swapping {
        Swapping::new(
            "swap_rep",
            2,
            SwapRole::Left { slots: [0, 2] },
            vec![PP1, PP2],
            RIGHT,
            PortName::C1,
        )
    }

    fn right() -> Swapping {
        Swapping::new("swap_r", 3, SwapRole::Right, vec![PP1], LEFT, PortName::C0)
    }

    #[test]
    fn left_waits_for_all_purifications_then_barrier() {
        let mut swap = left();
        let step = swap.start(t(0)).unwrap();
        assert!(step.awaited().unwrap().wants_signal(PP1, SignalKind::Purified));
        assert!(step.awaited().unwrap().wants_signal(PP2, SignalKind::Purified));
        assert!(step.awaited().unwrap().wants_signal(RIGHT, SignalKind::ReadyToSwap));

        let step = swap.resume(purified(PP2, true), t(10)).unwrap();
        assert!(step.actions.is_empty());
        assert!(!step.awaited().unwrap().wants_signal(PP2, SignalKind::Purified));

        let step = swap.resume(purified(PP1, true), t(20)).unwrap();
        assert_eq!(step.actions, vec![Action::Emit(Signal::ReadyToSwap)]);
        assert_eq!(
            step.awaited(),
            Some(&Await::Signal { sender: RIGHT, kind: SignalKind::ReadyToSwap })
        );

        let step = swap.resume(ready(RIGHT), t(30)).unwrap();
        assert_eq!(
            step.actions,
            vec![Action::Apply { op: QuantumOp::BellMeasure, slots: vec![0, 2] }]
        );
        assert_eq!(step.awaited(), Some(&Await::QuantumOp));

        let step = swap.resume(Wakeup::QuantumOp(OpOutcome::Bell(2)), t(31)).unwrap();
        assert_eq!(
            step.actions,
            vec![
                Action::Send { port: PortName::C1, message: ClassicalMessage::swap(2) },
                Action::Report(Report::BellMeasured { outcome: 2 }),
            ]
        );
        assert!(step.awaited().is_none());
        assert_eq!(swap.state(), SwapState::Swapped);
    }

    #[test]
    fn early_peer_ready_is_latched() {
        let mut swap = right();
        swap.start(t(0)).unwrap();

        let step = swap.resume(ready(LEFT), t(5)).unwrap();
        assert!(!step.awaited().unwrap().wants_signal(LEFT, SignalKind::ReadyToSwap));

        let step = swap.resume(purified(PP1, true), t(10)).unwrap();
        assert_eq!(step.actions, vec![Action::Emit(Signal::ReadyToSwap)]);
        assert_eq!(step.awaited(), Some(&Await::Port(PortName::C0)));
    }

    #[test]
    fn right_resolves_outcome() {
        let mut swap = right();
        swap.start(t(0)).unwrap();
        swap.resume(purified(PP1, true), t(10)).unwrap();
        swap.resume(ready(LEFT), t(11)).unwrap();

        let wakeup = Wakeup::Message { port: PortName::C0, message: ClassicalMessage::swap(2) };
        let step = swap.resume(wakeup, t(20)).unwrap();

        assert_eq!(
            step.actions,
            vec![Action::Report(Report::BellStateResolved(BellState::PsiPlus))]
        );
        assert_eq!(swap.resolved(), Some(BellState::PsiPlus));
    }

    #[test]
    fn failed_purification_aborts() {
        let mut swap = left();
        swap.start(t(0)).unwrap();

        let step = swap.resume(purified(PP1, false), t(10)).unwrap();

        assert_eq!(step.actions, vec![Action::Report(Report::SwapAborted { cause: PP1 })]);
        assert!(step.awaited().is_none());
        assert_eq!(swap.state(), SwapState::Aborted);
    }

    #[test]
    fn out_of_range_outcome_is_a_violation() {
        let mut swap = right();
        swap.start(t(0)).unwrap();
        swap.resume(purified(PP1, true), t(10)).unwrap();
        swap.resume(ready(LEFT), t(11)).unwrap();

        let message = ClassicalMessage::new(MessageTag::Swap, 7);
        let wakeup = Wakeup::Message { port: PortName::C0, message };
        assert!(matches!(swap.resume(wakeup, t(20)), Err(ProtocolError::InvalidValue { .. })));
    }

    #[test]
    fn wrong_tag_on_outcome_port() {
        let mut swap = right();
        swap.start(t(0)).unwrap();
        swap.resume(purified(PP1, true), t(10)).unwrap();
        swap.resume(ready(LEFT), t(11)).unwrap();

        let wakeup = Wakeup::Message { port: PortName::C0, message: ClassicalMessage::purify(1) };
        assert!(matches!(
            swap.resume(wakeup, t(20)),
            Err(ProtocolError::UnexpectedMessage { expected: MessageTag::Swap, .. })
        ));
    }
}
