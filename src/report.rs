//! Output formatting for conversion results.

use std::fmt::Write;

use crate::error::Result;
use crate::model::rate;
use crate::processor::Conversion;

impl Conversion {
    /// Format using a specific formatter.
    pub fn format(&self, formatter: &dyn ReportFormatter) -> Result<String> {
        formatter.format(self)
    }
}

/// Trait for formatting conversion results.
pub trait ReportFormatter {
    /// Format the conversion to a string.
    fn format(&self, conversion: &Conversion) -> Result<String>;
}

/// Plain text table, one row per class, followed by skipped scripts.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, conversion: &Conversion) -> Result<String> {
        let mut out = String::new();

        if conversion.classes.is_empty() {
            out.push_str("No classes received coverage.\n");
        } else {
            writeln!(
                out,
                "{:<60} {:>8} {:>8} {:>8}",
                "CLASS", "PROBES", "COVERED", "RATE"
            )
            .unwrap();
            writeln!(out, "{}", "-".repeat(88)).unwrap();

            let mut total = 0;
            let mut covered = 0;
            for class in &conversion.classes {
                let probes = class.probes.len();
                let hit = class.covered();
                total += probes;
                covered += hit;
                let pct = rate(hit as u64, probes as u64) * 100.0;
                writeln!(
                    out,
                    "{:<60} {:>8} {:>8} {:>7.1}%",
                    class.class_name, probes, hit, pct
                )
                .unwrap();
                let missed: Vec<u32> = class
                    .probes
                    .iter()
                    .enumerate()
                    .filter(|&(_, &p)| !p)
                    .map(|(i, _)| i as u32)
                    .collect();
                if !missed.is_empty() && hit > 0 {
                    writeln!(out, "    missed probes: {}", format_index_ranges(&missed)).unwrap();
                }
            }

            let pct = rate(covered as u64, total as u64) * 100.0;
            writeln!(out, "\nTotal: {pct:.1}% ({covered}/{total} probes covered)").unwrap();
        }

        if !conversion.skipped.is_empty() {
            writeln!(out, "\nSkipped scripts:").unwrap();
            for s in &conversion.skipped {
                writeln!(out, "  {}  ({})", s.url, s.reason).unwrap();
            }
        }
        if conversion.dropped_ranges > 0 {
            let n = conversion.dropped_ranges;
            writeln!(out, "\n{n} ranges dropped: ambiguous source mapping").unwrap();
        }

        Ok(out)
    }
}

/// The `ExecClassData` array as JSON, the shape forwarded upstream.
pub struct JsonFormatter;

impl ReportFormatter for JsonFormatter {
    fn format(&self, conversion: &Conversion) -> Result<String> {
        let mut out = serde_json::to_string_pretty(&conversion.classes)?;
        out.push('\n');
        Ok(out)
    }
}

/// Format sorted indices into compact range notation, e.g. "0, 3-5, 8".
#[must_use]
pub fn format_index_ranges(indices: &[u32]) -> String {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &i in indices {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == i => *end = i,
            _ => ranges.push((i, i)),
        }
    }
    ranges
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
