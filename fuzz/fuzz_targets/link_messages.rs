#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use qrepeater_core::{LinkParams, LinkRole, LinkSync, PortName, Protocol, SimTime, Wakeup};
use qrepeater_proto::{ClassicalMessage, MessageTag};

// Feeds a responder whatever the peer might send. Each 9-byte chunk is one
// message: a tag selector and a big-endian value.
fuzz_target!(|data: &[u8]| {
    let params = LinkParams {
        k_attempts: 4,
        t_clock: Duration::from_nanos(10),
        link_length_km: 1.0,
        window_grace: Duration::from_nanos(5),
    };
    let mut link = LinkSync::new("fuzz", 2, LinkRole::Responder, 0, 0, params);
    let Ok(mut step) = link.start(SimTime::ZERO) else {
        return;
    };

    let mut now = SimTime::ZERO;
    for chunk in data.chunks_exact(9) {
        let mut value = [0u8; 8];
        value.copy_from_slice(&chunk[1..]);
        let value = i64::from_be_bytes(value);
        let message = match chunk[0] % 5 {
            0 => ClassicalMessage::start(value),
            1 => ClassicalMessage::end(u64::try_from(value).ok()),
            2 => ClassicalMessage::new(MessageTag::Purify, value),
            3 => ClassicalMessage::new(MessageTag::Swap, value),
            _ => {
                // Fire whatever timer the link is waiting for instead.
                let Some(awaited) = step.awaited() else {
                    return;
                };
                let Some(&deadline) = awaited.deadlines().first() else {
                    continue;
                };
                now = now.max(deadline);
                match link.resume(Wakeup::Timer { deadline }, now) {
                    Ok(next) => step = next,
                    Err(_) => return,
                }
                continue;
            },
        };

        match link.resume(Wakeup::Message { port: PortName::C0, message }, now) {
            Ok(next) => step = next,
            Err(_) => return,
        }
    }
});
