#![no_main]
use desk_core::codec::{FRAME_LEN, encode, try_decode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match try_decode(data) {
        Some((height, speed)) => {
            assert!(data.len() >= FRAME_LEN);
            // Whatever decodes must encode back to the same leading bytes.
            let frame = encode(height, speed).expect("decoded values are representable");
            assert_eq!(&frame[..], &data[..FRAME_LEN]);
        }
        None => assert!(data.len() < FRAME_LEN),
    }
});
