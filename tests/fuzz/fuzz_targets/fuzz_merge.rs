#![no_main]
use libfuzzer_sys::fuzz_target;

use probecov::model::{V8CoverageRange, V8FunctionCoverage};
use probecov::ranges::{is_disjoint_ascending, merge_script};

fuzz_target!(|data: &[u8]| {
    // Arbitrary, possibly overlapping ranges: merging must not panic and
    // must always produce a disjoint ascending list.
    let ranges: Vec<V8CoverageRange> = data
        .chunks_exact(5)
        .map(|c| {
            let start = u32::from(u16::from_le_bytes([c[0], c[1]]));
            let end = u32::from(u16::from_le_bytes([c[2], c[3]]));
            V8CoverageRange::new(start, end, u64::from(c[4]))
        })
        .collect();
    let functions = vec![V8FunctionCoverage {
        function_name: String::new(),
        ranges,
        is_block_coverage: true,
    }];
    let merged = merge_script(&functions);
    assert!(is_disjoint_ascending(&merged));
});
