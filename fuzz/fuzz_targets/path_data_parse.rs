//! Fuzz target for SVG path data (`d` attribute) flattening.
//!
//! Run with:
//!   cargo +nightly fuzz run path_data_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use trapset::ir::io_svg::fuzz_parse_path_data;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    // Path data is ASCII in practice; non-UTF-8 input never reaches the parser.
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let _ = fuzz_parse_path_data(input);
});
