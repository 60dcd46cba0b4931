//! Base64 VLQ codec for the `mappings` field of a Source Map v3 document.
//!
//! Each value is split into 5-bit groups, least significant first; bit 6 of
//! each base64 digit marks a continuation and the lowest bit of the first
//! group carries the sign.

use crate::error::{ProbecovError, Result};

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const CONTINUATION: u32 = 0b10_0000;
const GROUP_MASK: u32 = 0b01_1111;

fn digit_value(byte: u8) -> Option<u32> {
    let value = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(u32::from(value))
}

/// Decode every value of one mapping segment.
pub fn decode_segment(segment: &str) -> Result<Vec<i64>> {
    let mut values = Vec::with_capacity(5);
    let mut accum: u64 = 0;
    let mut shift = 0u32;
    let mut pending = false;

    for byte in segment.bytes() {
        let digit = digit_value(byte).ok_or_else(|| {
            ProbecovError::SourceMap(format!(
                "invalid base64 VLQ character '{}' in segment '{}'",
                byte as char, segment
            ))
        })?;
        if shift > 60 {
            return Err(ProbecovError::SourceMap(format!(
                "VLQ value overflows in segment '{segment}'"
            )));
        }
        accum |= u64::from(digit & GROUP_MASK) << shift;
        if digit & CONTINUATION != 0 {
            shift += 5;
            pending = true;
            continue;
        }

        let magnitude = (accum >> 1) as i64;
        values.push(if accum & 1 == 1 { -magnitude } else { magnitude });
        accum = 0;
        shift = 0;
        pending = false;
    }

    if pending {
        return Err(ProbecovError::SourceMap(format!(
            "truncated VLQ value in segment '{segment}'"
        )));
    }
    Ok(values)
}

/// Append the VLQ encoding of `value` to `out`.
pub fn encode(value: i64, out: &mut String) {
    let mut vlq: u64 = if value < 0 {
        (value.unsigned_abs() << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (vlq & u64::from(GROUP_MASK)) as u32;
        vlq >>= 5;
        if vlq > 0 {
            digit |= CONTINUATION;
        }
        out.push(ALPHABET[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Encode a whole segment.
#[must_use]
pub fn encode_segment(values: &[i64]) -> String {
    let mut out = String::new();
    for &value in values {
        encode(value, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_segments() {
        assert_eq!(decode_segment("AAAA").unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(decode_segment("AACA").unwrap(), vec![0, 0, 1, 0]);
        assert_eq!(decode_segment("C").unwrap(), vec![1]);
        assert_eq!(decode_segment("D").unwrap(), vec![-1]);
        assert_eq!(decode_segment("gB").unwrap(), vec![16]);
        assert_eq!(decode_segment("SAAQ").unwrap(), vec![9, 0, 0, 8]);
    }

    #[test]
    fn test_encode_known_values() {
        assert_eq!(encode_segment(&[0, 0, 1, 0]), "AACA");
        assert_eq!(encode_segment(&[16]), "gB");
        assert_eq!(encode_segment(&[-1]), "D");
        assert_eq!(encode_segment(&[-16]), "hB");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_segment("A!").is_err());
        // Continuation bit set on the last digit.
        assert!(decode_segment("g").is_err());
    }

    #[test]
    fn test_large_values() {
        let encoded = encode_segment(&[123_456_789, -987_654]);
        assert_eq!(decode_segment(&encoded).unwrap(), vec![123_456_789, -987_654]);
    }
}
