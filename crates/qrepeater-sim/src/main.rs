//! Command-line runner for the repeater chain.
//!
//! Runs one or more seeded simulations of `L_node - Repeater - R_node` and
//! logs how each ended. Set `RUST_LOG=qrepeater_core=debug` to follow the
//! protocols window by window, or pass `--dump-journal` to keep every run's
//! journal as CBOR.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, ValueEnum};
use qrepeater_core::{ChainConfig, JournalEntry, PairSource, PurificationPolicy, SimTime};
use qrepeater_harness::{ChainError, ChainOutcome, RepeaterChain, SimBackend, StochasticSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Policy {
    /// Emit the failure and let the swap abort
    Report,
    /// Regenerate both links and purify again
    Retry,
}

#[derive(Debug, Parser)]
#[command(name = "qrepeater-sim", about = "Simulate a three-node quantum repeater chain")]
struct Args {
    /// Length of each link in km
    #[arg(long, default_value_t = 30.0)]
    link_length: f64,

    /// Probability an arm survives its half of the link
    #[arg(long, default_value_t = 0.9)]
    p_lr: f64,

    /// Probability a source firing produces a pair
    #[arg(long, default_value_t = 0.02)]
    p_m: f64,

    /// Attempt tick width in nanoseconds
    #[arg(long, default_value_t = 10)]
    t_clock_ns: u64,

    /// Purification mismatch handling
    #[arg(long, value_enum, default_value_t = Policy::Retry)]
    policy: Policy,

    /// Purification rounds before giving up (retry policy)
    #[arg(long, default_value_t = 3)]
    max_rounds: u32,

    /// Probability the two ends of a purification disagree
    #[arg(long, default_value_t = 0.0)]
    purify_error: f64,

    /// Seed of the first run
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Number of runs, with consecutive seeds
    #[arg(long, default_value_t = 1)]
    runs: u64,

    /// Simulated time limit per run in milliseconds
    #[arg(long, default_value_t = 100)]
    time_limit_ms: u64,

    /// Write every run's configuration and journal to this file (CBOR)
    #[arg(long)]
    dump_journal: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> ChainConfig {
        let purification = match self.policy {
            Policy::Report => PurificationPolicy::Report,
            Policy::Retry => PurificationPolicy::Retry { max_rounds: self.max_rounds },
        };
        ChainConfig {
            link_length_km: self.link_length,
            p_lr: self.p_lr,
            p_m: self.p_m,
            t_clock: Duration::from_nanos(self.t_clock_ns),
            purification,
            ..Default::default()
        }
    }

    fn time_limit(&self) -> SimTime {
        SimTime::from_nanos(self.time_limit_ms.saturating_mul(1_000_000))
    }
}

#[derive(Debug, Error)]
enum SimError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("run with seed {seed} failed: {source}")]
    Run {
        seed: u64,
        #[source]
        source: qrepeater_core::RuntimeError,
    },

    #[error("cannot encode journal: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One run as written by `--dump-journal`.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct RunRecord {
    seed: u64,
    config: ChainConfig,
    entries: Vec<JournalEntry>,
}

fn write_dump(path: &Path, records: &[RunRecord]) -> Result<(), SimError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(records, &mut buf)?;
    std::fs::write(path, buf).map_err(|source| SimError::Write { path: path.to_path_buf(), source })
}

#[derive(Debug, Default)]
struct Tally {
    resolved: BTreeMap<&'static str, u64>,
    aborted: u64,
    pending: u64,
    resolution_nanos: Vec<u64>,
}

impl Tally {
    fn record(&mut self, outcome: ChainOutcome) {
        match outcome {
            ChainOutcome::Resolved { state, at } => {
                *self.resolved.entry(state.symbol()).or_default() += 1;
                self.resolution_nanos.push(at.as_nanos());
            },
            ChainOutcome::Aborted { .. } => self.aborted += 1,
            ChainOutcome::Pending => self.pending += 1,
        }
    }

    fn mean_resolution(&self) -> Option<SimTime> {
        let count = u64::try_from(self.resolution_nanos.len()).ok().filter(|&n| n > 0)?;
        let total: u128 = self.resolution_nanos.iter().map(|&n| u128::from(n)).sum();
        let mean = u64::try_from(total / u128::from(count)).unwrap_or(u64::MAX);
        Some(SimTime::from_nanos(mean))
    }
}

fn run_once(args: &Args, config: ChainConfig, seed: u64) -> Result<RepeaterChain, SimError> {
    let backend = SimBackend::new(seed).with_purify_error(args.purify_error);
    let sources: [Box<dyn PairSource>; 2] = [
        Box::new(StochasticSource::from_config(&config, 0, seed)),
        Box::new(StochasticSource::from_config(&config, 1, seed)),
    ];

    let mut chain = RepeaterChain::assemble(config, backend, sources)?;
    chain.start().map_err(|source| SimError::Run { seed, source })?;
    chain.run_until(args.time_limit()).map_err(|source| SimError::Run { seed, source })?;
    Ok(chain)
}

fn run(args: &Args) -> Result<Tally, SimError> {
    let config = args.config();
    info!(
        link_length_km = config.link_length_km,
        p_lr = config.p_lr,
        p_m = config.p_m,
        k_attempts = config.k_attempts(),
        policy = ?config.purification,
        runs = args.runs,
        "starting simulation"
    );

    let mut tally = Tally::default();
    let mut records = Vec::new();
    for seed in args.seed..args.seed.saturating_add(args.runs) {
        let chain = run_once(args, config, seed)?;
        let outcome = chain.outcome();
        match outcome {
            ChainOutcome::Resolved { state, at } => {
                info!(seed, state = %state, at = %at, "end-to-end entanglement resolved");
            },
            ChainOutcome::Aborted { cause, at } => {
                info!(seed, cause = %cause, at = %at, "swap aborted after failed purification");
            },
            ChainOutcome::Pending => {
                warn!(seed, limit = %args.time_limit(), "run hit the time limit");
            },
        }
        tally.record(outcome);

        if args.dump_journal.is_some() {
            let entries = chain.scheduler().journal().entries().to_vec();
            records.push(RunRecord { seed, config, entries });
        }
    }

    if let Some(path) = &args.dump_journal {
        write_dump(path, &records)?;
        info!(path = %path.display(), runs = records.len(), "journal written");
    }
    Ok(tally)
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(tally) => {
            let resolved: u64 = tally.resolved.values().sum();
            info!(
                resolved,
                aborted = tally.aborted,
                pending = tally.pending,
                states = ?tally.resolved,
                mean_resolution = ?tally.mean_resolution().map(|t| t.to_string()),
                "simulation finished"
            );
            std::process::ExitCode::SUCCESS
        },
        Err(e) => {
            error!(error = %e, "simulation failed");
            std::process::ExitCode::FAILURE
        },
    }
}
