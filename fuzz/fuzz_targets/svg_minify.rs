#![no_main]

use asset_processor::engine::minify_svg;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // minified output must parse and be a fixed point
    if let Ok(once) = minify_svg(text) {
        let twice = minify_svg(&once).expect("minified output must parse");
        assert_eq!(once, twice);
    }
});
