#![no_main]

use libfuzzer_sys::fuzz_target;
use qrepeater_proto::ClassicalMessage;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode or fail cleanly, never panic.
    let Ok(message) = ClassicalMessage::decode(data) else {
        return;
    };

    // Anything accepted re-encodes to something that decodes to itself.
    let bytes = message.encode().expect("decoded message must re-encode");
    let again = ClassicalMessage::decode(&bytes).expect("re-encoded message must decode");
    assert_eq!(message, again);
});
