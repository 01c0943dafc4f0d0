//! Protocol state machine interface.
//!
//! # Architecture: Action-Based State Machines
//!
//! Protocols follow the action pattern:
//! - Methods accept the current simulated time as a parameter
//! - Methods return `Result<Step, ProtocolError>`
//! - The scheduler executes the step's actions and parks the protocol on the
//!   step's suspension until a matching event fires
//!
//! A protocol therefore never touches ports, memory or the clock directly,
//! and can be unit-tested by feeding it wakeups by hand.
//!
//! # Suspension points
//!
//! ```text
//! Await::Signal { sender, kind }  -- one emission from one sender
//! Await::Port(port)               -- classical message or photon on a port
//! Await::Timer(deadline)          -- logical time reaches deadline
//! Await::QuantumOp                -- the op issued in the same step completes
//! Await::FirstOf([...])           -- whichever of the above fires first
//! ```

use std::fmt;

use qrepeater_proto::{BellState, ClassicalMessage};
use serde::{Deserialize, Serialize};

use crate::{
    backend::{OpOutcome, QuantumOp, Qubit},
    error::ProtocolError,
    node::{LinkId, NodeId, PortName, ProtocolId, SlotIndex},
    time::SimTime,
};

/// Names of the signals protocols can emit. Awaiters address a signal by
/// `(sender, kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Link synchronization succeeded
    Entangled,
    /// Purification finished
    Purified,
    /// Swap protocol finished its purifications
    ReadyToSwap,
}

/// A signal with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Both link peers latched the same attempt index
    Entangled,
    /// Purification outcome comparison
    Purified {
        /// Local and peer outcome bits matched
        success: bool,
    },
    /// Barrier half of the swap protocol
    ReadyToSwap,
}

impl Signal {
    /// Addressing name of this signal.
    pub fn kind(self) -> SignalKind {
        match self {
            Self::Entangled => SignalKind::Entangled,
            Self::Purified { .. } => SignalKind::Purified,
            Self::ReadyToSwap => SignalKind::ReadyToSwap,
        }
    }
}

/// Where a protocol is parked until the scheduler resumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Await {
    /// One emission of `kind` by `sender`
    Signal {
        /// Emitting protocol
        sender: ProtocolId,
        /// Signal name
        kind: SignalKind,
    },
    /// Input on a port of the protocol's own node
    Port(PortName),
    /// Logical time reaches the deadline
    Timer(SimTime),
    /// Completion of the quantum operation issued in the same step
    QuantumOp,
    /// First of several suspensions
    FirstOf(Vec<Await>),
}

impl Await {
    /// Whether an emission of `kind` by `sender` resumes this suspension.
    pub fn wants_signal(&self, sender: ProtocolId, kind: SignalKind) -> bool {
        match self {
            Self::Signal { sender: s, kind: k } => *s == sender && *k == kind,
            Self::FirstOf(all) => all.iter().any(|a| a.wants_signal(sender, kind)),
            _ => false,
        }
    }

    /// Whether input on `port` resumes this suspension.
    pub fn wants_port(&self, port: PortName) -> bool {
        match self {
            Self::Port(p) => *p == port,
            Self::FirstOf(all) => all.iter().any(|a| a.wants_port(port)),
            _ => false,
        }
    }

    /// Whether a quantum-operation completion resumes this suspension.
    pub fn wants_op(&self) -> bool {
        match self {
            Self::QuantumOp => true,
            Self::FirstOf(all) => all.iter().any(Self::wants_op),
            _ => false,
        }
    }

    /// Every timer deadline in this suspension.
    pub fn deadlines(&self) -> Vec<SimTime> {
        match self {
            Self::Timer(t) => vec![*t],
            Self::FirstOf(all) => all.iter().flat_map(Self::deadlines).collect(),
            _ => Vec::new(),
        }
    }

    /// Classical ports in this suspension.
    pub fn classical_ports(&self) -> Vec<PortName> {
        match self {
            Self::Port(p) if !p.is_quantum() => vec![*p],
            Self::FirstOf(all) => all.iter().flat_map(Self::classical_ports).collect(),
            _ => Vec::new(),
        }
    }
}

/// What fired to resume a protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wakeup {
    /// An awaited signal was emitted
    Signal {
        /// Emitting protocol
        sender: ProtocolId,
        /// Signal and payload
        signal: Signal,
    },
    /// A classical message arrived
    Message {
        /// Receiving port
        port: PortName,
        /// Decoded message
        message: ClassicalMessage,
    },
    /// A photon arrived on a quantum port
    Photon {
        /// Receiving port
        port: PortName,
        /// The arriving qubit
        qubit: Qubit,
    },
    /// A timer expired
    Timer {
        /// Deadline that was awaited
        deadline: SimTime,
    },
    /// The pending quantum operation completed
    QuantumOp(OpOutcome),
}

impl fmt::Display for Wakeup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal { sender, signal } => write!(f, "signal {signal:?} from {sender}"),
            Self::Message { port, message } => write!(f, "message {message} on {port}"),
            Self::Photon { port, .. } => write!(f, "photon on {port}"),
            Self::Timer { deadline } => write!(f, "timer at {deadline}"),
            Self::QuantumOp(outcome) => write!(f, "quantum op outcome {outcome:?}"),
        }
    }
}

/// Notable results a protocol reports to the run journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Report {
    /// Repeater finished its Bell measurement
    BellMeasured {
        /// Two-bit outcome forwarded to the endpoint
        outcome: u8,
    },
    /// Endpoint inferred the state it now shares with the far endpoint
    BellStateResolved(BellState),
    /// A purification in the wait set failed, so the swap never ran
    SwapAborted {
        /// Purification that reported failure
        cause: ProtocolId,
    },
}

/// Effects requested by a protocol transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a classical message on a port of the protocol's node
    Send {
        /// Outgoing port
        port: PortName,
        /// Message to send
        message: ClassicalMessage,
    },
    /// Broadcast a signal to current awaiters
    Emit(Signal),
    /// Start (or restart) another protocol
    Start(ProtocolId),
    /// Turn a pair source on
    EnableSource(LinkId),
    /// Turn a pair source off
    DisableSource(LinkId),
    /// Store a qubit in a memory slot of the protocol's node
    Store {
        /// Destination slot
        slot: SlotIndex,
        /// Qubit to store
        qubit: Qubit,
    },
    /// Discard the qubit in a memory slot
    Free {
        /// Slot to clear
        slot: SlotIndex,
    },
    /// Run a quantum program; the step must then await `QuantumOp`
    Apply {
        /// Program
        op: QuantumOp,
        /// Slots it acts on, in program order
        slots: Vec<SlotIndex>,
    },
    /// Record a result in the run journal
    Report(Report),
}

/// What a protocol does after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suspend {
    /// Park until the suspension fires
    Await(Await),
    /// Terminal: the protocol stays dormant until restarted
    Done,
}

/// Result of one state-machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Effects, executed in order
    pub actions: Vec<Action>,
    /// Next suspension
    pub suspend: Suspend,
}

impl Step {
    /// Execute `actions`, then park on `until`.
    pub fn awaiting(actions: Vec<Action>, until: Await) -> Self {
        Self { actions, suspend: Suspend::Await(until) }
    }

    /// Execute `actions`, then terminate.
    pub fn done(actions: Vec<Action>) -> Self {
        Self { actions, suspend: Suspend::Done }
    }

    /// The suspension, if the protocol did not terminate.
    pub fn awaited(&self) -> Option<&Await> {
        match &self.suspend {
            Suspend::Await(a) => Some(a),
            Suspend::Done => None,
        }
    }
}

/// A protocol instance bound to one node.
pub trait Protocol {
    /// Instance name, used in logs and errors.
    fn name(&self) -> &str;

    /// Node the instance runs on.
    fn node(&self) -> NodeId;

    /// Begin (or restart from scratch) at `now`.
    fn start(&mut self, now: SimTime) -> Result<Step, ProtocolError>;

    /// Continue after `wakeup` fired at `now`.
    fn resume(&mut self, wakeup: Wakeup, now: SimTime) -> Result<Step, ProtocolError>;
}
