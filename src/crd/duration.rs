//! Parser for Go-style duration strings used by policy timeouts
//!
//! Accepts one or more `<number><unit>` pairs such as `300s`, `5m`, `1h30m` or `1.5h`.
//! Valid units are `ns`, `us` (`µs`), `ms`, `s`, `m` and `h`. A bare `0` is allowed,
//! any other number needs a unit. Negative durations are rejected.

use std::time::Duration;

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
];

/// Parse a duration string, returning a description of the problem on failure
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s.starts_with('-') {
        return Err(format!("negative duration: {s}"));
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.chars().take_while(|c| c.is_ascii_digit()).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("invalid duration: {s}"));
        }

        let unit_len = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];
        if unit.is_empty() {
            return Err(format!("missing unit in duration: {s}"));
        }
        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| format!("unknown unit {unit:?} in duration: {s}"))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| format!("invalid duration: {s}"))?
        };
        let mut nanos = whole
            .checked_mul(scale)
            .ok_or_else(|| format!("duration out of range: {s}"))?;

        if !frac_part.is_empty() {
            // Digits beyond nanosecond precision do not change the result.
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits
                .parse()
                .map_err(|_| format!("invalid duration: {s}"))?;
            let frac_nanos = frac
                .checked_mul(scale)
                .map(|n| n / 10u128.pow(digits.len() as u32))
                .ok_or_else(|| format!("duration out of range: {s}"))?;
            nanos = nanos
                .checked_add(frac_nanos)
                .ok_or_else(|| format!("duration out of range: {s}"))?;
        }

        total = total
            .checked_add(nanos)
            .ok_or_else(|| format!("duration out of range: {s}"))?;
    }

    let secs = u64::try_from(total / 1_000_000_000)
        .map_err(|_| format!("duration out of range: {s}"))?;
    Ok(Duration::new(secs, (total % 1_000_000_000) as u32))
}
