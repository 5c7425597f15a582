#![no_main]

use libfuzzer_sys::fuzz_target;
use session_protocol::codec::{decode, encode};

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = decode(data) {
        // Anything we accept must survive re-encoding unchanged
        let encoded = encode(&envelope);
        let decoded = decode(&encoded).expect("re-encoded envelope must decode");
        assert_eq!(envelope, decoded);
    }
});
