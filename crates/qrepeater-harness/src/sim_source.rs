//! Pair source models.

use std::{collections::VecDeque, time::Duration};

use qrepeater_core::{Arm, ChainConfig, Emission, PairSource, Qubit, SimTime};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Pair identifiers of different sources never collide: the link number
/// occupies the high bits.
fn pair_id(link: u64, counter: u64) -> u64 {
    (link << 40) | counter
}

/// Generates a pair with probability `p_m` per tick; each arm then survives
/// its half of the fibre independently with probability `p_lr`.
#[derive(Debug)]
pub struct StochasticSource {
    period: Duration,
    p_m: f64,
    p_lr: f64,
    link: u64,
    pairs: u64,
    rng: ChaCha8Rng,
}

impl StochasticSource {
    /// Source number `link` firing every `period`.
    pub fn new(period: Duration, p_m: f64, p_lr: f64, link: u64, seed: u64) -> Self {
        Self {
            period,
            p_m: p_m.clamp(0.0, 1.0),
            p_lr: p_lr.clamp(0.0, 1.0),
            link,
            pairs: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Source for link number `link` of a chain, seeded from the run seed.
    pub fn from_config(config: &ChainConfig, link: u64, seed: u64) -> Self {
        let seed = seed ^ (link + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self::new(config.t_clock, config.p_m, config.p_lr, link, seed)
    }

    /// Pairs generated so far.
    pub fn pairs(&self) -> u64 {
        self.pairs
    }
}

impl PairSource for StochasticSource {
    fn period(&self) -> Duration {
        self.period
    }

    fn emit(&mut self, _now: SimTime) -> Vec<Emission> {
        if !self.rng.gen_bool(self.p_m) {
            return Vec::new();
        }
        self.pairs += 1;
        let pair = pair_id(self.link, self.pairs);

        let mut arms = Vec::with_capacity(2);
        for arm in [Arm::A, Arm::B] {
            if self.rng.gen_bool(self.p_lr) {
                arms.push(Emission { qubit: Qubit::new(pair, arm) });
            }
        }
        arms
    }
}

/// Which arms of a tick's pair reach their node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Survival {
    /// Both arms arrive
    Both,
    /// Only the arm towards the left node arrives
    OnlyA,
    /// Only the arm towards the right node arrives
    OnlyB,
    /// No pair, or both arms lost
    Neither,
}

/// Replays a fixed per-tick script, then repeats a fallback forever.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    period: Duration,
    link: u64,
    pairs: u64,
    script: VecDeque<Survival>,
    fallback: Survival,
}

impl ScriptedSource {
    /// Source number `link` firing every `period`, following `script` and
    /// then emitting complete pairs.
    pub fn new(period: Duration, link: u64, script: impl IntoIterator<Item = Survival>) -> Self {
        Self {
            period,
            link,
            pairs: 0,
            script: script.into_iter().collect(),
            fallback: Survival::Both,
        }
    }

    /// Survival used once the script runs out.
    #[must_use]
    pub fn then(mut self, fallback: Survival) -> Self {
        self.fallback = fallback;
        self
    }
}

impl PairSource for ScriptedSource {
    fn period(&self) -> Duration {
        self.period
    }

    fn emit(&mut self, _now: SimTime) -> Vec<Emission> {
        let survival = self.script.pop_front().unwrap_or(self.fallback);
        let arms: &[Arm] = match survival {
            Survival::Both => &[Arm::A, Arm::B],
            Survival::OnlyA => &[Arm::A],
            Survival::OnlyB => &[Arm::B],
            Survival::Neither => &[],
        };
        if arms.is_empty() {
            return Vec::new();
        }

        self.pairs += 1;
        let pair = pair_id(self.link, self.pairs);
        arms.iter().map(|&arm| Emission { qubit: Qubit::new(pair, arm) }).collect()
    }
}
