//! Property tests over seeded stochastic runs.
//!
//! Short links keep each run cheap; the probabilities are high enough that
//! every run terminates well inside the time limit.

use std::{cell::RefCell, rc::Rc};

use proptest::prelude::*;
use qrepeater_core::{ChainConfig, PurificationPolicy};
use qrepeater_harness::scenario::{Scenario, oracle};

fn chain_config() -> impl Strategy<Value = ChainConfig> {
    (0.3f64..=1.0, 0.5f64..=1.0, 1u32..=3).prop_map(|(p_m, p_lr, max_rounds)| ChainConfig {
        link_length_km: 0.2,
        p_m,
        p_lr,
        purification: PurificationPolicy::Retry { max_rounds },
        ..Default::default()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_run_terminates_consistently(
        config in chain_config(),
        seed in any::<u64>(),
        purify_error in 0.0f64..0.5,
    ) {
        let result = Scenario::new("random chain")
            .config(config)
            .seed(seed)
            .purify_error(purify_error)
            .oracle(oracle::all_of(vec![
                oracle::chain_terminated(),
                oracle::links_agree(),
                oracle::barrier_respected(),
                oracle::outcome_consistent(),
                oracle::memory_settled(),
            ]))
            .run();

        prop_assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn same_seed_same_run(seed in any::<u64>()) {
        let config = ChainConfig { link_length_km: 0.2, p_m: 0.5, ..Default::default() };

        let run = |seed| -> Result<String, String> {
            let captured = Rc::new(RefCell::new(String::new()));
            let sink = Rc::clone(&captured);
            Scenario::new("replay")
                .config(config)
                .seed(seed)
                .oracle(Box::new(move |world| {
                    *sink.borrow_mut() = format!("{:?} {:?}", world.entries(), world.outcome());
                    Ok(())
                }))
                .run()?;
            Ok(captured.take())
        };

        prop_assert_eq!(run(seed), run(seed));
    }
}
