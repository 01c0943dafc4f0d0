//! Three-node chain assembly.
//!
//! ```text
//!   L_node (1)                 Repeater (2)                 R_node (3)
//!   q0 c0 ──────────────────── c0 q0   q1 c1 ──────────────────── c0 q0
//!    ^          source 0         ^      ^          source 1          ^
//!    └─── arm A ───(*)─── arm B ─┘      └─── arm A ───(*)─── arm B ──┘
//!
//!   PP_l (source side)  <->  PP_rep_1         PP_rep_2 (source side) <-> PP_r
//!                              swap_rep (left)  <-barrier->  swap_r (right)
//! ```
//!
//! Each purification owns two link synchronization children (`MS0`, `MS1`)
//! on the consecutive slots of its interface.

use qrepeater_core::{
    ChainConfig, JournalEntry, LinkId, LinkParams, LinkRole, LinkSync, Node, NodeId, NodeKind,
    PairSource, PortId, PortName, ProtocolId, Purification, PurificationPolicy, Report,
    RuntimeError, Scheduler, SimTime, SwapRole, Swapping,
};
use qrepeater_proto::BellState;
use tracing::info;

use crate::{error::ChainError, sim_backend::SimBackend, sim_source::StochasticSource};

/// Left endpoint.
pub const LEFT: NodeId = 1;
/// Middle repeater.
pub const REPEATER: NodeId = 2;
/// Right endpoint.
pub const RIGHT: NodeId = 3;

/// Handles to everything installed in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHandles {
    /// Pair sources: left link, right link
    pub links: [LinkId; 2],
    /// Purification on the left endpoint
    pub pp_l: ProtocolId,
    /// Repeater purification facing left
    pub pp_rep_1: ProtocolId,
    /// Repeater purification facing right
    pub pp_rep_2: ProtocolId,
    /// Purification on the right endpoint
    pub pp_r: ProtocolId,
    /// Left side of the swap (on the repeater)
    pub swap_rep: ProtocolId,
    /// Right side of the swap (on the right endpoint)
    pub swap_r: ProtocolId,
    /// Peered link synchronization instances, source side first
    pub link_pairs: Vec<(ProtocolId, ProtocolId)>,
}

/// How a chain run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// The right endpoint resolved the state it shares with the left one
    Resolved {
        /// Shared Bell state
        state: BellState,
        /// Resolution time
        at: SimTime,
    },
    /// A purification failed and the swap was abandoned
    Aborted {
        /// Failed purification
        cause: ProtocolId,
        /// Abort time
        at: SimTime,
    },
    /// Neither happened yet
    Pending,
}

/// A fully wired chain over the simulated backend.
pub struct RepeaterChain {
    config: ChainConfig,
    scheduler: Scheduler<SimBackend>,
    handles: ChainHandles,
}

impl RepeaterChain {
    /// Chain with seeded stochastic sources and a backend seeded from `seed`.
    pub fn new(config: ChainConfig, seed: u64) -> Result<Self, ChainError> {
        let sources: [Box<dyn PairSource>; 2] = [
            Box::new(StochasticSource::from_config(&config, 0, seed)),
            Box::new(StochasticSource::from_config(&config, 1, seed)),
        ];
        Self::assemble(config, SimBackend::new(seed), sources)
    }

    /// Chain over an explicit backend and sources (left link, right link).
    pub fn assemble(
        config: ChainConfig,
        mut backend: SimBackend,
        sources: [Box<dyn PairSource>; 2],
    ) -> Result<Self, ChainError> {
        config.validate()?;

        let nodes = [
            Node::new(LEFT, "L_node", NodeKind::Endpoint),
            Node::new(REPEATER, "Repeater", NodeKind::Repeater),
            Node::new(RIGHT, "R_node", NodeKind::Endpoint),
        ];
        for node in &nodes {
            backend.add_node(node.id(), node.memory_slots());
        }

        let mut scheduler = Scheduler::new(backend);
        for node in nodes {
            scheduler.add_node(node)?;
        }

        let classical = config.classical_delay();
        scheduler.connect(
            PortId::new(LEFT, PortName::C0),
            PortId::new(REPEATER, PortName::C0),
            classical,
        )?;
        scheduler.connect(
            PortId::new(REPEATER, PortName::C1),
            PortId::new(RIGHT, PortName::C0),
            classical,
        )?;

        let [left_source, right_source] = sources;
        let arm_delay = config.arm_delay();
        let left_link = scheduler.add_source(
            left_source,
            PortId::new(LEFT, PortName::Q0),
            PortId::new(REPEATER, PortName::Q0),
            arm_delay,
        )?;
        let right_link = scheduler.add_source(
            right_source,
            PortId::new(REPEATER, PortName::Q1),
            PortId::new(RIGHT, PortName::Q0),
            arm_delay,
        )?;

        let params = config.link_params();
        let policy = config.purification;
        let mut builder = PurificationBuilder { scheduler: &mut scheduler, params, policy };

        let (pp_l, left_links) =
            builder.install("PP_l", LEFT, 0, LinkRole::Source { link: left_link })?;
        let (pp_rep_1, rep_left_links) =
            builder.install("PP_rep_1", REPEATER, 0, LinkRole::Responder)?;
        let (pp_rep_2, rep_right_links) =
            builder.install("PP_rep_2", REPEATER, 1, LinkRole::Source { link: right_link })?;
        let (pp_r, right_links) = builder.install("PP_r", RIGHT, 0, LinkRole::Responder)?;

        let swap_rep = scheduler.reserve();
        let swap_r = scheduler.reserve();
        scheduler.install(
            swap_rep,
            Box::new(Swapping::new(
                "swap_rep",
                REPEATER,
                SwapRole::Left { slots: [0, 2] },
                vec![pp_rep_1, pp_rep_2],
                swap_r,
                PortName::C1,
            )),
        )?;
        scheduler.install(
            swap_r,
            Box::new(Swapping::new(
                "swap_r",
                RIGHT,
                SwapRole::Right,
                vec![pp_r],
                swap_rep,
                PortName::C0,
            )),
        )?;

        let link_pairs = left_links
            .into_iter()
            .zip(rep_left_links)
            .chain(rep_right_links.into_iter().zip(right_links))
            .collect();

        let handles = ChainHandles {
            links: [left_link, right_link],
            pp_l,
            pp_rep_1,
            pp_rep_2,
            pp_r,
            swap_rep,
            swap_r,
            link_pairs,
        };

        info!(
            k_attempts = params.k_attempts,
            t_clock_ns = config.t_clock.as_nanos() as u64,
            link_length_km = config.link_length_km,
            "chain assembled"
        );
        Ok(Self { config, scheduler, handles })
    }

    /// Start every purification and both swap sides at the current time.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        let h = &self.handles;
        for id in [h.pp_l, h.pp_rep_1, h.pp_rep_2, h.pp_r, h.swap_rep, h.swap_r] {
            self.scheduler.start(id)?;
        }
        Ok(())
    }

    /// Run until `deadline` or until nothing is left to do.
    pub fn run_until(&mut self, deadline: SimTime) -> Result<ChainOutcome, RuntimeError> {
        self.scheduler.run_until(deadline)?;
        Ok(self.outcome())
    }

    /// Outcome recorded in the journal so far.
    pub fn outcome(&self) -> ChainOutcome {
        let journal = self.scheduler.journal();
        let resolved =
            journal.reports_from(self.handles.swap_r).into_iter().find_map(|(at, r)| match r {
                Report::BellStateResolved(state) => Some(ChainOutcome::Resolved { state, at }),
                _ => None,
            });
        if let Some(outcome) = resolved {
            return outcome;
        }

        journal
            .entries()
            .iter()
            .find_map(|e| match e {
                JournalEntry::Report { at, report: Report::SwapAborted { cause }, .. } => {
                    Some(ChainOutcome::Aborted { cause: *cause, at: *at })
                },
                _ => None,
            })
            .unwrap_or(ChainOutcome::Pending)
    }

    /// Parameters the chain was built from.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Installed handles.
    pub fn handles(&self) -> &ChainHandles {
        &self.handles
    }

    /// The underlying scheduler.
    pub fn scheduler(&self) -> &Scheduler<SimBackend> {
        &self.scheduler
    }

    /// Handle of the protocol called `name`.
    pub fn protocol_id(&self, name: &str) -> Option<ProtocolId> {
        let h = &self.handles;
        let mut all = vec![h.pp_l, h.pp_rep_1, h.pp_rep_2, h.pp_r, h.swap_rep, h.swap_r];
        all.extend(h.link_pairs.iter().flat_map(|&(a, b)| [a, b]));
        all.into_iter().find(|&id| self.scheduler.protocol(id).is_some_and(|p| p.name() == name))
    }
}

struct PurificationBuilder<'a> {
    scheduler: &'a mut Scheduler<SimBackend>,
    params: LinkParams,
    policy: PurificationPolicy,
}

impl PurificationBuilder<'_> {
    /// Install a purification on interface `nic` with its two link children.
    fn install(
        &mut self,
        name: &str,
        node: NodeId,
        nic: usize,
        role: LinkRole,
    ) -> Result<(ProtocolId, [ProtocolId; 2]), RuntimeError> {
        let base = nic * 2;
        let mut children = [ProtocolId(0); 2];
        for (i, child) in children.iter_mut().enumerate() {
            let link_name = format!("{name}/MS{i}");
            let link = LinkSync::new(link_name, node, role, base + i, nic, self.params);
            *child = self.scheduler.register(Box::new(link))?;
        }

        let slots = [base, base + 1];
        let purification = Purification::new(name, node, nic, children, slots, self.policy);
        let id = self.scheduler.register(Box::new(purification))?;
        Ok((id, children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_resolve_by_name() {
        let chain = RepeaterChain::new(ChainConfig::default(), 1).unwrap();

        assert_eq!(chain.protocol_id("PP_rep_2"), Some(chain.handles().pp_rep_2));
        assert_eq!(chain.protocol_id("swap_r"), Some(chain.handles().swap_r));
        assert!(chain.protocol_id("PP_l/MS1").is_some());
        assert_eq!(chain.protocol_id("nope"), None);
        assert_eq!(chain.handles().link_pairs.len(), 4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ChainConfig { p_m: 0.0, ..Default::default() };
        assert!(matches!(RepeaterChain::new(config, 1), Err(ChainError::Config(_))));
    }

    #[test]
    fn fresh_chain_is_pending() {
        let chain = RepeaterChain::new(ChainConfig::default(), 1).unwrap();
        assert_eq!(chain.outcome(), ChainOutcome::Pending);
    }
}
