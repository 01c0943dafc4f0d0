//! Reusable oracles.

use qrepeater_core::{Report, Signal, SignalKind};
use qrepeater_proto::BellState;

use crate::{
    chain::{ChainOutcome, LEFT, REPEATER, RIGHT},
    scenario::OracleFn,
};

/// Pass only if every oracle passes; reports the first failure.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| oracles.iter().try_for_each(|oracle| oracle(world)))
}

/// The right endpoint resolved some Bell state.
pub fn chain_resolved() -> OracleFn {
    Box::new(|world| match world.outcome() {
        ChainOutcome::Resolved { .. } => Ok(()),
        other => Err(format!("expected a resolved chain, got {other:?}")),
    })
}

/// The right endpoint resolved exactly `expected`.
pub fn resolves_to(expected: BellState) -> OracleFn {
    Box::new(move |world| match world.outcome() {
        ChainOutcome::Resolved { state, .. } if state == expected => Ok(()),
        other => Err(format!("expected {expected}, got {other:?}")),
    })
}

/// The swap was abandoned after a failed purification.
pub fn swap_aborted() -> OracleFn {
    Box::new(|world| match world.outcome() {
        ChainOutcome::Aborted { .. } => Ok(()),
        other => Err(format!("expected an aborted swap, got {other:?}")),
    })
}

/// The run ended one way or the other.
pub fn chain_terminated() -> OracleFn {
    Box::new(|world| match world.outcome() {
        ChainOutcome::Pending => Err(format!("chain still pending at {}", world.now())),
        _ => Ok(()),
    })
}

/// Peered link instances only ever report entanglement together: same
/// number of `ENTANGLED` emissions, at the same instants.
pub fn links_agree() -> OracleFn {
    Box::new(|world| {
        for &(a, b) in &world.handles().link_pairs {
            let times = |id| -> Vec<_> {
                world
                    .signals_from(id)
                    .into_iter()
                    .filter(|(_, s)| s.kind() == SignalKind::Entangled)
                    .map(|(at, _)| at)
                    .collect()
            };
            let (left, right) = (times(a), times(b));
            if left != right {
                return Err(format!("{a} entangled at {left:?} but its peer {b} at {right:?}"));
            }
        }
        Ok(())
    })
}

/// The purification called `name` last emitted `PURIFIED(expected)`.
pub fn purified(name: &'static str, expected: bool) -> OracleFn {
    Box::new(move |world| match world.purified(name) {
        Some(result) if result == expected => Ok(()),
        other => Err(format!("{name}: expected PURIFIED({expected}), got {other:?}")),
    })
}

/// The repeater measured only after both its purifications succeeded and
/// the right endpoint raised the barrier; the endpoint resolved only after
/// the measurement.
pub fn barrier_respected() -> OracleFn {
    Box::new(|world| {
        let h = world.handles();
        let measured = world.reports_from(h.swap_rep).into_iter().find_map(|(at, r)| match r {
            Report::BellMeasured { .. } => Some(at),
            _ => None,
        });
        let Some(measured) = measured else {
            return Ok(());
        };

        for pp in [h.pp_rep_1, h.pp_rep_2] {
            let done = world
                .signals_from(pp)
                .into_iter()
                .find_map(|(at, s)| (s == Signal::Purified { success: true }).then_some(at));
            match done {
                Some(at) if at <= measured => {},
                other => {
                    return Err(format!("measured at {measured} but {pp} purified at {other:?}"));
                },
            }
        }

        let peer_ready = world
            .signals_from(h.swap_r)
            .into_iter()
            .find_map(|(at, s)| (s == Signal::ReadyToSwap).then_some(at));
        if peer_ready.is_none_or(|at| at > measured) {
            return Err(format!(
                "measured at {measured} before the endpoint was ready ({peer_ready:?})"
            ));
        }

        match world.outcome() {
            ChainOutcome::Resolved { at, .. } if at < measured => {
                Err(format!("resolved at {at} before the measurement at {measured}"))
            },
            _ => Ok(()),
        }
    })
}

/// The label resolved at the endpoint is the one the repeater measured.
pub fn outcome_consistent() -> OracleFn {
    Box::new(|world| {
        let h = world.handles();
        let measured = world.reports_from(h.swap_rep).into_iter().find_map(|(_, r)| match r {
            Report::BellMeasured { outcome } => Some(outcome),
            _ => None,
        });
        match (measured, world.outcome()) {
            (Some(outcome), ChainOutcome::Resolved { state, .. }) => {
                if state.outcome() == outcome {
                    Ok(())
                } else {
                    Err(format!("measured {outcome} but resolved {state}"))
                }
            },
            (None, ChainOutcome::Resolved { state, .. }) => {
                Err(format!("resolved {state} without a measurement"))
            },
            _ => Ok(()),
        }
    })
}

/// After a resolved run every slot holds exactly the qubit of the link that
/// last agreed on it: slots freed on retry were refilled, nothing leaked.
pub fn memory_settled() -> OracleFn {
    Box::new(|world| {
        if !matches!(world.outcome(), ChainOutcome::Resolved { .. }) {
            return Ok(());
        }
        let layout = [(LEFT, vec![0, 1]), (REPEATER, vec![0, 1, 2, 3]), (RIGHT, vec![0, 1])];
        for (node, expected) in layout {
            let occupied = world.backend().occupied(node);
            if occupied != expected {
                return Err(format!("node {node} holds slots {occupied:?}, expected {expected:?}"));
            }
        }
        Ok(())
    })
}
