#![no_main]

use libfuzzer_sys::fuzz_target;
use session_protocol::codec::decode;

fuzz_target!(|data: &[u8]| {
    // Peers are untrusted: decode must return Err, never panic
    let _ = decode(data);
});
