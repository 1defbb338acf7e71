//! Fuzz target for two-frame session SVG parsing.
//!
//! Run with:
//!   cargo +nightly fuzz run session_svg_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use trapset::ir::io_svg::from_session_svg_slice;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = from_session_svg_slice(data);
});
