//! Error types for the protocol core.
//!
//! Only fatal conditions are errors. Recoverable outcomes (a missed photon,
//! disagreeing attempt indices, a purification mismatch) travel as signal
//! payloads and never cross a protocol boundary as an `Err`.

use qrepeater_proto::{MessageTag, WireError};
use thiserror::Error;

use crate::{
    backend::QuantumOp,
    node::{LinkId, NodeId, PortId, ProtocolId, SlotIndex},
};

/// A protocol received input it cannot interpret at its current stage.
///
/// Indicates a sequencing or fabric bug, never a quantum-channel event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Message tag does not match the stage
    #[error("{protocol}: expected {expected} message, got {got}")]
    UnexpectedMessage {
        /// Protocol instance name
        protocol: String,
        /// Tag the stage requires
        expected: MessageTag,
        /// Tag that arrived
        got: MessageTag,
    },

    /// Message value outside the range its tag allows
    #[error("{protocol}: invalid {tag} value {value}")]
    InvalidValue {
        /// Protocol instance name
        protocol: String,
        /// Tag of the offending message
        tag: MessageTag,
        /// Offending value
        value: i64,
    },

    /// Wakeup that the current stage never waits for
    #[error("{protocol}: unexpected {wakeup} while {stage}")]
    UnexpectedWakeup {
        /// Protocol instance name
        protocol: String,
        /// Stage the protocol was in
        stage: &'static str,
        /// Description of what woke it
        wakeup: String,
    },
}

/// Quantum memory or gate failure. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Backend has no memory for this node
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Slot index beyond the node's memory
    #[error("node {node}: slot {slot} out of range")]
    SlotOutOfRange {
        /// Node
        node: NodeId,
        /// Requested slot
        slot: SlotIndex,
    },

    /// `put` into a slot that already holds a qubit
    #[error("node {node}: slot {slot} already occupied")]
    SlotOccupied {
        /// Node
        node: NodeId,
        /// Occupied slot
        slot: SlotIndex,
    },

    /// `pop` or operation on an empty slot
    #[error("node {node}: slot {slot} is empty")]
    SlotEmpty {
        /// Node
        node: NodeId,
        /// Empty slot
        slot: SlotIndex,
    },

    /// Operation given the wrong number of slots
    #[error("{op} expects {expected} slots, got {got}")]
    Arity {
        /// Operation
        op: QuantumOp,
        /// Slots the operation needs
        expected: usize,
        /// Slots supplied
        got: usize,
    },
}

/// Fatal condition that aborts a scheduler run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A protocol rejected its input
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The quantum backend failed
    #[error("quantum backend: {0}")]
    Backend(#[from] BackendError),

    /// A classical frame could not be encoded or decoded
    #[error("wire: {0}")]
    Wire(#[from] WireError),

    /// Handle does not name an installed protocol
    #[error("unknown {0}")]
    UnknownProtocol(ProtocolId),

    /// Handle does not name an attached source
    #[error("unknown {0}")]
    UnknownLink(LinkId),

    /// Node was never added
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Node added twice
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    /// Port does not exist on its node
    #[error("node has no port {0}")]
    UnknownPort(PortId),

    /// Port already wired to a channel or source
    #[error("port {0} already connected")]
    PortInUse(PortId),

    /// Classical send on a port with no channel attached
    #[error("no channel attached to {0}")]
    NoChannel(PortId),

    /// Protocol awaits a quantum operation it never issued
    #[error("{0} awaits a quantum operation but none is pending")]
    NoPendingOp(ProtocolId),
}

/// Invalid chain parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Probability outside `(0, 1]`
    #[error("{name} must be in (0, 1], got {value}")]
    InvalidProbability {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// Link length not strictly positive and finite
    #[error("link length must be positive, got {0} km")]
    InvalidLength(f64),

    /// Clock tick of zero width
    #[error("t_clock must be non-zero")]
    ZeroClock,

    /// Retry policy that never runs a round
    #[error("purification retry needs at least one round")]
    ZeroRounds,
}
