//! Scenario framework for end-to-end chain tests.
//!
//! Every scenario must end in an oracle: the builder only becomes runnable
//! once `.oracle(..)` is supplied, so a scenario cannot pass without
//! verifying something about the final [`World`].
//!
//! ```no_run
//! use qrepeater_harness::scenario::{Scenario, oracle};
//!
//! Scenario::new("chain resolves")
//!     .seed(7)
//!     .oracle(oracle::all_of(vec![oracle::chain_resolved(), oracle::links_agree()]))
//!     .run()
//!     .unwrap();
//! ```

mod builder;
pub mod oracle;
mod world;

pub use builder::{RunnableScenario, Scenario};
pub use world::World;

/// Verification run against the final world state.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
