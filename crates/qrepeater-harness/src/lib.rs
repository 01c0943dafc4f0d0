//! Simulation harness for the repeater chain
//!
//! Concrete, seeded implementations of the collaborators the protocol core
//! only knows through traits, plus the three-node chain topology and a
//! scenario framework for end-to-end tests.
//!
//! # Components
//!
//! - [`sim_backend`]: Slot bookkeeping and seeded measurement outcomes
//! - [`sim_source`]: Stochastic and scripted pair sources
//! - [`chain`]: Assembly of `L_node`, `Repeater`, `R_node` and all protocols
//! - [`scenario`]: Scenario builder, world and oracles
//!
//! # Determinism
//!
//! Every random draw comes from a `ChaCha8Rng` seeded from the run seed, and
//! the scheduler breaks timestamp ties by scheduling order, so one seed
//! always reproduces one run.

pub mod chain;
pub mod error;
pub mod scenario;
pub mod sim_backend;
pub mod sim_source;

pub use chain::{ChainHandles, ChainOutcome, LEFT, REPEATER, RIGHT, RepeaterChain};
pub use error::ChainError;
pub use sim_backend::{OpRecord, SimBackend};
pub use sim_source::{ScriptedSource, StochasticSource, Survival};
