#![no_main]

use arbitrary::Arbitrary;
use asset_processor::config::Limits;
use asset_processor::{process_with_config, ProcessorConfig};
use libfuzzer_sys::fuzz_target;

const KEYS: &[&str] = &[
    "fmt", "op", "q", "opt", "w", "h", "max-width", "max-height", "mode", "filter", "bg", "pos",
    "retain", "rect", "deg", "expand",
];

#[derive(Arbitrary, Debug)]
struct Input {
    options: Vec<(u8, String)>,
    image: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let options: Vec<(&str, String)> = input
        .options
        .into_iter()
        .take(12)
        .map(|(key, value)| (KEYS[key as usize % KEYS.len()], value))
        .collect();

    // small decode limits
    let config = ProcessorConfig::default().with_limits(Limits {
        max_dimension: 512,
        max_pixels: 512 * 512,
    });
    let _ = process_with_config(input.image, options, &config);
});
