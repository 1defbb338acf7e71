//! Fuzz target for annotated source SVG parsing.
//!
//! Run with:
//!   cargo +nightly fuzz run source_svg_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use trapset::ir::io_svg::from_svg_slice;

fuzz_target!(|data: &[u8]| {
    // Embedded rasters make real inputs large; 10MB still bounds memory.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = from_svg_slice(data);
});
