//! Nodes, ports and the identifiers used to address them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Node identifier, unique within a chain.
pub type NodeId = u32;

/// Position in a node's quantum memory.
pub type SlotIndex = usize;

/// Handle to a protocol instance registered with the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolId(pub usize);

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol#{}", self.0)
    }
}

/// Handle to an entangled-pair source attached to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(pub usize);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Named port on a node.
///
/// `c*` ports are classical duplex channels, `q*` ports receive photons.
/// The digit is the network interface: 0 faces left, 1 faces right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortName {
    /// Classical port, interface 0
    C0,
    /// Classical port, interface 1
    C1,
    /// Quantum input port, interface 0
    Q0,
    /// Quantum input port, interface 1
    Q1,
}

impl PortName {
    /// Classical port of interface `nic` (0 or 1, anything else maps to 1).
    pub fn classical(nic: usize) -> Self {
        if nic == 0 { Self::C0 } else { Self::C1 }
    }

    /// Quantum port of interface `nic` (0 or 1, anything else maps to 1).
    pub fn quantum(nic: usize) -> Self {
        if nic == 0 { Self::Q0 } else { Self::Q1 }
    }

    /// Whether photons (rather than classical messages) arrive here.
    pub fn is_quantum(self) -> bool {
        matches!(self, Self::Q0 | Self::Q1)
    }

    /// Port name as written in topology descriptions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::C0 => "c0",
            Self::C1 => "c1",
            Self::Q0 => "q0",
            Self::Q1 => "q1",
        }
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port on a specific node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId {
    /// Owning node
    pub node: NodeId,
    /// Port on that node
    pub port: PortName,
}

impl PortId {
    /// Address `port` on `node`.
    pub fn new(node: NodeId, port: PortName) -> Self {
        Self { node, port }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}.{}", self.node, self.port)
    }
}

/// Role of a node in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// End of the chain: one interface, two memory slots
    Endpoint,
    /// Middle of the chain: two interfaces, four memory slots
    Repeater,
}

/// A network node: identity, fixed port set and memory size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    name: String,
    kind: NodeKind,
}

impl Node {
    /// Create a node.
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self { id, name: name.into(), kind }
    }

    /// Node identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoint or repeater.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Ports this node exposes.
    pub fn ports(&self) -> &'static [PortName] {
        match self.kind {
            NodeKind::Endpoint => &[PortName::Q0, PortName::C0],
            NodeKind::Repeater => &[PortName::Q0, PortName::C0, PortName::Q1, PortName::C1],
        }
    }

    /// Whether `port` exists on this node.
    pub fn has_port(&self, port: PortName) -> bool {
        self.ports().contains(&port)
    }

    /// Number of addressable memory slots.
    pub fn memory_slots(&self) -> usize {
        match self.kind {
            NodeKind::Endpoint => 2,
            NodeKind::Repeater => 4,
        }
    }
}
