#![no_main]

use asset_processor::engine::{detect, read_dimensions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = detect(data);
    let _ = read_dimensions(data);
});
