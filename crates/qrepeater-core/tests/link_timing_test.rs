//! Property tests for attempt-window timing.

use std::time::Duration;

use proptest::prelude::*;
use qrepeater_core::{
    Action, Arm, LinkId, LinkParams, LinkRole, LinkSync, PortName, Protocol, Qubit, SimTime,
    Wakeup, link::LinkState,
};

fn params(t_clock: u64, length_m: u64) -> LinkParams {
    LinkParams {
        k_attempts: 8,
        t_clock: Duration::from_nanos(t_clock),
        link_length_km: length_m as f64 / 1000.0,
        window_grace: Duration::from_nanos(5),
    }
}

proptest! {
    #[test]
    fn announced_start_sits_before_a_tick_boundary(
        t_clock in 1u64..100,
        length_m in 1u64..100_000,
        now in 0u64..1_000_000,
    ) {
        let params = params(t_clock, length_m);
        let link = LinkSync::new("MS0", 1, LinkRole::Source { link: LinkId(0) }, 0, 0, params);
        let now = SimTime::from_nanos(now);

        let start = link.announced_start(now);
        let arrival = now + params.propagation_delay();

        // START reaches the peer no later than the window opens.
        prop_assert!(start >= arrival);
        prop_assert_eq!((start.as_nanos() + 1) % t_clock, 0);
        prop_assert!(start.as_nanos() < arrival.as_nanos() + 2 * t_clock);
    }

    #[test]
    fn peers_derive_the_same_index_for_a_shared_pair(
        t_clock in 1u64..50,
        start in 0u64..10_000,
        offset in 0u64..400,
    ) {
        let params = params(t_clock, 1_000);
        let role = LinkRole::Source { link: LinkId(0) };
        let mut source = LinkSync::new("MS0", 1, role, 0, 0, params);
        let mut responder = LinkSync::new("MS0", 2, LinkRole::Responder, 0, 0, params);
        let start = SimTime::from_nanos(start);

        source.start(SimTime::ZERO).unwrap();
        responder.start(SimTime::ZERO).unwrap();
        let announce = source.resume(
            Wakeup::Photon { port: PortName::Q0, qubit: Qubit::new(0, Arm::A) },
            start,
        ).unwrap();
        let message = match &announce.actions[..] {
            [Action::Send { message, .. }] => *message,
            other => panic!("unexpected actions {other:?}"),
        };
        let window_open = source.start_time();
        responder
            .resume(Wakeup::Message { port: PortName::C0, message }, start)
            .unwrap();

        source.resume(Wakeup::Timer { deadline: window_open }, window_open).unwrap();
        responder.resume(Wakeup::Timer { deadline: window_open }, window_open).unwrap();
        prop_assert_eq!(source.state(), LinkState::Attempting);
        prop_assert_eq!(responder.state(), LinkState::Attempting);

        let arrival = window_open + Duration::from_nanos(offset);
        prop_assert_eq!(source.attempt_index(arrival), responder.attempt_index(arrival));
    }
}
