//! End-to-end chain scenarios.
//!
//! Scripted sources make every link agree in its first window unless a
//! scenario says otherwise; scripted measurement outcomes pin purification
//! and swap results.

use qrepeater_core::{ChainConfig, OpOutcome, PurificationPolicy, QuantumOp, SimTime};
use qrepeater_harness::{
    LEFT, REPEATER, RIGHT,
    scenario::{Scenario, oracle},
    sim_source::Survival,
};
use qrepeater_proto::BellState;

fn report_config() -> ChainConfig {
    ChainConfig { purification: PurificationPolicy::Report, ..Default::default() }
}

#[test]
fn swap_outcome_two_resolves_psi_plus() {
    let result = Scenario::new("swap outcome 2")
        .scripted_links(vec![], vec![])
        .outcomes(REPEATER, QuantumOp::BellMeasure, vec![OpOutcome::Bell(2)])
        .oracle(oracle::all_of(vec![
            oracle::resolves_to(BellState::PsiPlus),
            oracle::links_agree(),
            oracle::barrier_respected(),
            oracle::outcome_consistent(),
            oracle::memory_settled(),
        ]))
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}

#[test]
fn equal_purification_bits_succeed() {
    let result = Scenario::new("purification 0,0")
        .config(report_config())
        .scripted_links(vec![], vec![])
        .outcomes(LEFT, QuantumOp::Purify, vec![OpOutcome::Bit(0)])
        .outcomes(REPEATER, QuantumOp::Purify, vec![OpOutcome::Bit(0), OpOutcome::Bit(0)])
        .outcomes(RIGHT, QuantumOp::Purify, vec![OpOutcome::Bit(0)])
        .oracle(oracle::all_of(vec![
            oracle::purified("PP_l", true),
            oracle::purified("PP_rep_1", true),
            oracle::purified("PP_rep_2", true),
            oracle::purified("PP_r", true),
            oracle::chain_resolved(),
        ]))
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}

#[test]
fn different_purification_bits_abort_the_swap() {
    let result = Scenario::new("purification 0,1")
        .config(report_config())
        .scripted_links(vec![], vec![])
        .outcomes(LEFT, QuantumOp::Purify, vec![OpOutcome::Bit(0)])
        .outcomes(REPEATER, QuantumOp::Purify, vec![OpOutcome::Bit(1), OpOutcome::Bit(1)])
        .outcomes(RIGHT, QuantumOp::Purify, vec![OpOutcome::Bit(1)])
        .oracle(oracle::all_of(vec![
            oracle::purified("PP_l", false),
            oracle::purified("PP_rep_1", false),
            oracle::purified("PP_rep_2", true),
            oracle::purified("PP_r", true),
            oracle::swap_aborted(),
            Box::new(|world| {
                // Nothing was measured, so the endpoint never resolved.
                let history = world.backend().history();
                if history.iter().any(|r| r.op == QuantumOp::BellMeasure) {
                    Err("bell measurement ran after an abort".into())
                } else {
                    Ok(())
                }
            }),
        ]))
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}

#[test]
fn purification_mismatch_regenerates_links() {
    let result = Scenario::new("purification retry")
        .config(ChainConfig {
            purification: PurificationPolicy::Retry { max_rounds: 2 },
            ..Default::default()
        })
        .scripted_links(vec![], vec![])
        .outcomes(LEFT, QuantumOp::Purify, vec![OpOutcome::Bit(0), OpOutcome::Bit(1)])
        .outcomes(
            REPEATER,
            QuantumOp::Purify,
            vec![OpOutcome::Bit(1), OpOutcome::Bit(1), OpOutcome::Bit(1)],
        )
        .outcomes(RIGHT, QuantumOp::Purify, vec![OpOutcome::Bit(1)])
        .oracle(oracle::all_of(vec![
            oracle::purified("PP_l", true),
            oracle::chain_resolved(),
            oracle::links_agree(),
            oracle::memory_settled(),
            Box::new(|world| {
                // Two rounds on the left link, one on the right.
                match (world.entanglements_on(LEFT), world.entanglements_on(RIGHT)) {
                    (4, 2) => Ok(()),
                    other => Err(format!("unexpected entanglement counts {other:?}")),
                }
            }),
        ]))
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}

#[test]
fn one_sided_loss_forces_a_second_window() {
    // Long enough to cover the whole first window of the left link.
    let lossy = vec![Survival::OnlyA; 15_100];

    let result = Scenario::new("one-sided loss")
        .scripted_links(lossy, vec![])
        .oracle(oracle::all_of(vec![
            oracle::chain_resolved(),
            oracle::links_agree(),
            oracle::memory_settled(),
            Box::new(|world| {
                // The left endpoint stored and freed one extra qubit.
                match world.backend().puts() {
                    9 => Ok(()),
                    puts => Err(format!("expected 9 stores, got {puts}")),
                }
            }),
        ]))
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}

#[test]
fn nothing_happens_before_the_first_window() {
    let result = Scenario::new("early stop")
        .scripted_links(vec![], vec![])
        .time_limit(SimTime::from_nanos(100_000))
        .oracle(Box::new(|world| {
            if world.entanglements_on(LEFT) + world.entanglements_on(RIGHT) > 0 {
                return Err("entangled before any START could arrive".into());
            }
            match world.outcome() {
                qrepeater_harness::ChainOutcome::Pending => Ok(()),
                other => Err(format!("expected pending, got {other:?}")),
            }
        }))
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}

#[test]
fn seeded_stochastic_chain_terminates_consistently() {
    let result = Scenario::new("default chain")
        .seed(7)
        .time_limit(SimTime::from_nanos(50_000_000))
        .oracle(oracle::all_of(vec![
            oracle::chain_terminated(),
            oracle::links_agree(),
            oracle::barrier_respected(),
            oracle::outcome_consistent(),
            oracle::memory_settled(),
        ]))
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}
