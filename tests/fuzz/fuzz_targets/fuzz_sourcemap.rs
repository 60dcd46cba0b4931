#![no_main]
use libfuzzer_sys::fuzz_target;

use probecov::sourcemap::{Bias, SourceMap, SourceMapConsumer};

fuzz_target!(|data: &[u8]| {
    // Source map parsing and lookups must not panic on any input.
    if let Ok(map) = SourceMap::from_slice(data) {
        for m in map.mappings().iter().take(64) {
            let _ = map.original_position_for(m.generated_line, m.generated_column, Bias::LeastUpperBound);
            if let Some(source) = m.source.and_then(|i| map.sources().get(i as usize)) {
                let _ = map.generated_position_for(
                    source,
                    m.original_line,
                    m.original_column,
                    Bias::GreatestLowerBound,
                );
                let _ = map.all_generated_positions_for(source, m.original_line, None);
            }
        }
    }
});
