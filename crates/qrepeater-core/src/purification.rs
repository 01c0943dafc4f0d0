//! Purification protocol.
//!
//! Owns two link synchronization children bound to consecutive memory slots
//! of one interface. The children run one after the other; once both slots
//! hold entangled qubits the node runs a CNOT + measurement program and the
//! two ends exchange their measurement bits. Equal bits mean the surviving
//! pair (first slot) is kept; different bits mean the round failed.
//!
//! On failure the configured [`PurificationPolicy`] decides between
//! reporting `PURIFIED(false)` right away and regenerating both links for
//! another round. Both ends see the same pair of bits, so they always make
//! the same decision without further negotiation.

use qrepeater_proto::{ClassicalMessage, MessageTag};
use tracing::{debug, info, warn};

use crate::{
    backend::{OpOutcome, QuantumOp},
    config::PurificationPolicy,
    error::ProtocolError,
    node::{NodeId, PortName, ProtocolId, SlotIndex},
    protocol::{Action, Await, Protocol, Signal, SignalKind, Step, Wakeup},
    time::SimTime,
};

/// Purification stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurificationState {
    /// Constructed, not started
    Init,
    /// Waiting for `ENTANGLED` from child 0 or child 1
    AwaitingLink(usize),
    /// CNOT + measurement running
    Purifying,
    /// Local bit sent, waiting for the peer's bit
    AwaitingPeerOutcome,
    /// Terminal, with the emitted result
    Finished {
        /// Whether the final round succeeded
        success: bool,
    },
}

impl PurificationState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::AwaitingLink(_) => "awaiting link",
            Self::Purifying => "purifying",
            Self::AwaitingPeerOutcome => "awaiting peer outcome",
            Self::Finished { .. } => "finished",
        }
    }
}

/// Purification of two links over one network interface.
#[derive(Debug, Clone)]
pub struct Purification {
    name: String,
    node: NodeId,
    children: [ProtocolId; 2],
    slots: [SlotIndex; 2],
    cport: PortName,
    policy: PurificationPolicy,
    state: PurificationState,
    round: u32,
    local_outcome: Option<u8>,
}

impl Purification {
    /// Create a purification on interface `nic`, sequencing `children`
    /// (which must store into `slots` in the same order).
    pub fn new(
        name: impl Into<String>,
        node: NodeId,
        nic: usize,
        children: [ProtocolId; 2],
        slots: [SlotIndex; 2],
        policy: PurificationPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            node,
            children,
            slots,
            cport: PortName::classical(nic),
            policy,
            state: PurificationState::Init,
            round: 0,
            local_outcome: None,
        }
    }

    /// Current stage.
    pub fn state(&self) -> PurificationState {
        self.state
    }

    /// Current round, starting at 1.
    pub fn round(&self) -> u32 {
        self.round
    }

    fn start_round(&mut self) -> Step {
        self.state = PurificationState::AwaitingLink(0);
        self.local_outcome = None;
        debug!(purification = %self.name, node = self.node, round = self.round, "starting round");

        Step::awaiting(
            vec![Action::Start(self.children[0])],
            Await::Signal { sender: self.children[0], kind: SignalKind::Entangled },
        )
    }

    fn finish(&mut self, success: bool, mut actions: Vec<Action>) -> Step {
        self.state = PurificationState::Finished { success };
        actions.push(Action::Emit(Signal::Purified { success }));
        Step::done(actions)
    }

    fn unexpected(&self, wakeup: &Wakeup) -> ProtocolError {
        ProtocolError::UnexpectedWakeup {
            protocol: self.name.clone(),
            stage: self.state.as_str(),
            wakeup: wakeup.to_string(),
        }
    }

    fn on_peer_outcome(&mut self, message: &ClassicalMessage) -> Result<Step, ProtocolError> {
        if message.tag() != MessageTag::Purify {
            return Err(ProtocolError::UnexpectedMessage {
                protocol: self.name.clone(),
                expected: MessageTag::Purify,
                got: message.tag(),
            });
        }
        let invalid = || ProtocolError::InvalidValue {
            protocol: self.name.clone(),
            tag: MessageTag::Purify,
            value: message.value(),
        };
        let peer = match message.value() {
            0 => 0u8,
            1 => 1u8,
            _ => return Err(invalid()),
        };
        let local = self.local_outcome.ok_or_else(invalid)?;

        if outcomes_agree(local, peer) {
            info!(
                purification = %self.name,
                node = self.node,
                round = self.round,
                "purification successful"
            );
            return Ok(self.finish(true, vec![]));
        }

        match self.policy {
            PurificationPolicy::Retry { max_rounds } if self.round < max_rounds => {
                warn!(
                    purification = %self.name,
                    node = self.node,
                    round = self.round,
                    local,
                    peer,
                    "purification failed, regenerating links"
                );
                self.round += 1;

                // Each child frees its own slot when restarted
                Ok(self.start_round())
            },
            _ => {
                warn!(
                    purification = %self.name,
                    node = self.node,
                    round = self.round,
                    local,
                    peer,
                    "purification failed"
                );
                Ok(self.finish(false, vec![]))
            },
        }
    }
}

/// Whether a purification round with bits `local` and `peer` succeeded.
pub fn outcomes_agree(local: u8, peer: u8) -> bool {
    local == peer
}

impl Protocol for Purification {
    fn name(&self) -> &str {
        &self.name
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn start(&mut self, _now: SimTime) -> Result<Step, ProtocolError> {
        self.round = 1;
        Ok(self.start_round())
    }

    fn resume(&mut self, wakeup: Wakeup, _now: SimTime) -> Result<Step, ProtocolError> {
        match (self.state, &wakeup) {
            (
                PurificationState::AwaitingLink(0),
                Wakeup::Signal { sender, signal: Signal::Entangled },
            ) if *sender == self.children[0] => {
                self.state = PurificationState::AwaitingLink(1);
                Ok(Step::awaiting(
                    vec![Action::Start(self.children[1])],
                    Await::Signal { sender: self.children[1], kind: SignalKind::Entangled },
                ))
            },
            (
                PurificationState::AwaitingLink(1),
                Wakeup::Signal { sender, signal: Signal::Entangled },
            ) if *sender == self.children[1] => {
                debug!(purification = %self.name, node = self.node, "both links entangled");
                self.state = PurificationState::Purifying;
                Ok(Step::awaiting(
                    vec![Action::Apply { op: QuantumOp::Purify, slots: self.slots.to_vec() }],
                    Await::QuantumOp,
                ))
            },
            (PurificationState::Purifying, Wakeup::QuantumOp(OpOutcome::Bit(bit))) if *bit <= 1 => {
                self.local_outcome = Some(*bit);
                self.state = PurificationState::AwaitingPeerOutcome;
                let message = ClassicalMessage::purify(*bit);
                Ok(Step::awaiting(
                    vec![Action::Send { port: self.cport, message }],
                    Await::Port(self.cport),
                ))
            },
            (PurificationState::AwaitingPeerOutcome, Wakeup::Message { message, .. }) => {
                self.on_peer_outcome(message)
            },
            _ => Err(self.unexpected(&wakeup)),
        }
    }
}
