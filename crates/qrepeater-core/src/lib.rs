//! Repeater-chain protocol core
//!
//! Entanglement generation, purification and swapping for a three-node chain
//! (left endpoint, repeater, right endpoint), written as pure state machines
//! driven by a discrete-event scheduler.
//!
//! # Architecture
//!
//! Every protocol is a deterministic state machine that never performs I/O.
//! It is started with the current simulated time and resumed with a
//! [`protocol::Wakeup`] describing what fired. Each transition returns a
//! [`protocol::Step`]: the [`protocol::Action`]s to execute and the next
//! suspension point ([`protocol::Await`]).
//!
//! The [`runtime::Scheduler`] owns the logical clock, the classical fabric,
//! the pair sources and the quantum backend. It executes actions, delivers
//! messages, photons, timers and signals in timestamp order, and resumes the
//! protocols whose suspension matches.
//!
//! Physical concerns (photon generation, loss, gate execution) stay behind
//! the [`backend::QuantumBackend`] and [`source::PairSource`] traits, so the
//! same protocol code runs against scripted test doubles and seeded
//! stochastic models.
//!
//! # Components
//!
//! - [`runtime`]: Scheduler, event queue, journal
//! - [`link`]: Link synchronization (attempt windows, index agreement)
//! - [`purification`]: Two-link purification with outcome exchange
//! - [`swapping`]: Barrier-synchronized entanglement swapping
//! - [`protocol`]: Protocol trait, suspensions, wakeups, actions, signals
//! - [`node`]: Nodes, ports and identifiers
//! - [`config`]: Chain parameters and derived attempt budget
//! - [`error`]: Error types

pub mod backend;
pub mod config;
pub mod error;
pub mod link;
pub mod node;
pub mod protocol;
pub mod purification;
pub mod runtime;
pub mod source;
pub mod swapping;
pub mod time;

pub use backend::{Arm, OpOutcome, QuantumBackend, QuantumOp, Qubit};
pub use config::{ChainConfig, LinkParams, PurificationPolicy};
pub use error::{BackendError, ConfigError, ProtocolError, RuntimeError};
pub use link::{LinkRole, LinkSync};
pub use node::{LinkId, Node, NodeId, NodeKind, PortId, PortName, ProtocolId, SlotIndex};
pub use protocol::{Action, Await, Protocol, Report, Signal, SignalKind, Step, Suspend, Wakeup};
pub use purification::Purification;
pub use runtime::{Journal, JournalEntry, ProtocolStatus, Scheduler};
pub use source::{Emission, PairSource};
pub use swapping::{SwapRole, Swapping};
pub use time::SimTime;
