//! Scenario builder API.
//!
//! Declarative construction of chain scenarios: parameters, seed, optional
//! scripted sources and measurement outcomes, and a mandatory oracle.

use std::time::Duration;

use qrepeater_core::{ChainConfig, NodeId, OpOutcome, PairSource, QuantumOp, SimTime};

use crate::{
    chain::RepeaterChain,
    scenario::{OracleFn, World},
    sim_backend::SimBackend,
    sim_source::{ScriptedSource, StochasticSource, Survival},
};

/// Simulated time a scenario may run before the oracle is consulted.
pub const DEFAULT_TIME_LIMIT: SimTime = SimTime::from_nanos(10_000_000);

/// Scenario builder.
///
/// Must call `.oracle()` to get a [`RunnableScenario`] that can be executed.
pub struct Scenario {
    name: String,
    config: ChainConfig,
    seed: u64,
    purify_error: f64,
    scripted_links: Option<[Vec<Survival>; 2]>,
    outcomes: Vec<(NodeId, QuantumOp, Vec<OpOutcome>)>,
    time_limit: SimTime,
}

impl Scenario {
    /// Create a new scenario with default chain parameters and seed 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: ChainConfig::default(),
            seed: 0,
            purify_error: 0.0,
            scripted_links: None,
            outcomes: Vec::new(),
            time_limit: DEFAULT_TIME_LIMIT,
        }
    }

    /// Chain parameters.
    #[must_use]
    pub fn config(mut self, config: ChainConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed for sources and backend.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Probability the two ends of a purification disagree.
    #[must_use]
    pub fn purify_error(mut self, p: f64) -> Self {
        self.purify_error = p;
        self
    }

    /// Replace the stochastic sources with per-tick scripts (left link,
    /// right link). Once a script runs out its source emits complete pairs.
    #[must_use]
    pub fn scripted_links(mut self, left: Vec<Survival>, right: Vec<Survival>) -> Self {
        self.scripted_links = Some([left, right]);
        self
    }

    /// Pin the outcomes of the next runs of `op` on `node`.
    #[must_use]
    pub fn outcomes(mut self, node: NodeId, op: QuantumOp, outcomes: Vec<OpOutcome>) -> Self {
        self.outcomes.push((node, op, outcomes));
        self
    }

    /// Stop the run at `limit` even if protocols are still active.
    #[must_use]
    pub fn time_limit(mut self, limit: SimTime) -> Self {
        self.time_limit = limit;
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }

    fn sources(&self) -> [Box<dyn PairSource>; 2] {
        let period: Duration = self.config.t_clock;
        match &self.scripted_links {
            Some([left, right]) => [
                Box::new(ScriptedSource::new(period, 0, left.clone())),
                Box::new(ScriptedSource::new(period, 1, right.clone())),
            ],
            None => [
                Box::new(StochasticSource::from_config(&self.config, 0, self.seed)),
                Box::new(StochasticSource::from_config(&self.config, 1, self.seed)),
            ],
        }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// Assembles the chain, starts every protocol at time zero, runs until
    /// the queue drains or the time limit passes, then invokes the oracle on
    /// the final world.
    pub fn run(self) -> Result<(), String> {
        let scenario = self.scenario;
        let name = &scenario.name;

        let mut backend = SimBackend::new(scenario.seed).with_purify_error(scenario.purify_error);
        for (node, op, outcomes) in &scenario.outcomes {
            backend.script(*node, *op, outcomes.iter().copied());
        }

        let mut chain = RepeaterChain::assemble(scenario.config, backend, scenario.sources())
            .map_err(|e| format!("Scenario '{name}': assembly failed: {e}"))?;
        chain.start().map_err(|e| format!("Scenario '{name}': start failed: {e}"))?;
        chain
            .run_until(scenario.time_limit)
            .map_err(|e| format!("Scenario '{name}': run failed: {e}"))?;

        (self.oracle)(&World::new(chain)).map_err(|e| format!("Scenario '{name}': {e}"))
    }
}
