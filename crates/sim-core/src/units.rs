//! SPICE magnitude strings ("2.2k", "1u", "5ms") to `f64`.
//!
//! Two matching disciplines coexist. Component values match the unit string
//! by *prefix* (`"10kohm"` scales by `k`, an unknown unit leaves the number
//! unscaled). Time values match by *exact* suffix against a table that also
//! knows `ps`, `ns`, `us`, `ms` and `s`; an unknown unit is rejected.

use crate::error::{Error, Result};

/// Longest key first so "meg" wins over "m".
const COMPONENT_SUFFIXES: &[(&str, f64)] = &[
    ("meg", 1e6),
    ("f", 1e-15),
    ("p", 1e-12),
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("g", 1e9),
    ("t", 1e12),
];

const TIME_SUFFIXES: &[(&str, f64)] = &[
    ("ps", 1e-12),
    ("ns", 1e-9),
    ("us", 1e-6),
    ("ms", 1e-3),
    ("s", 1.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuffixMatch {
    Prefix,
    Exact,
}

/// Strict component-value parse.
pub fn parse_magnitude(text: &str) -> Result<f64> {
    parse_magnitude_strict(text)
}

/// Component-value parse that retries as a bare float when the
/// `<number><unit>` grammar does not match.
pub fn parse_magnitude_lenient(text: &str) -> Result<f64> {
    parse_with(text, SuffixMatch::Prefix, true)
}

/// Component-value parse; anything outside `<number><unit>` is rejected.
pub fn parse_magnitude_strict(text: &str) -> Result<f64> {
    parse_with(text, SuffixMatch::Prefix, false)
}

/// Time-value parse with exact suffix matching (`"1ms"`, `"10ns"`, `"1meg"`).
pub fn parse_time(text: &str) -> Result<f64> {
    parse_with(text, SuffixMatch::Exact, false)
}

fn parse_with(text: &str, discipline: SuffixMatch, lenient: bool) -> Result<f64> {
    let normalized = text.trim().to_ascii_lowercase();
    let invalid = || Error::InvalidMagnitude(text.to_string());

    let Some((number, unit)) = split_magnitude(&normalized) else {
        if lenient {
            return normalized.parse::<f64>().map_err(|_| invalid());
        }
        return Err(invalid());
    };

    let value = number.parse::<f64>().map_err(|_| invalid())?;
    if unit.is_empty() {
        return Ok(value);
    }

    match discipline {
        SuffixMatch::Prefix => {
            let scale = COMPONENT_SUFFIXES
                .iter()
                .find(|(key, _)| unit.starts_with(key))
                .map(|(_, scale)| *scale)
                .unwrap_or(1.0);
            Ok(value * scale)
        }
        SuffixMatch::Exact => TIME_SUFFIXES
            .iter()
            .chain(COMPONENT_SUFFIXES.iter())
            .find(|(key, _)| unit == *key)
            .map(|(_, scale)| value * scale)
            .ok_or_else(invalid),
    }
}

/// Splits `<[0-9.e+-]+><spaces><letters>` into number and unit.
fn split_magnitude(text: &str) -> Option<(&str, &str)> {
    let end = text
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | 'e' | '+' | '-')))
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let (number, rest) = text.split_at(end);
    let unit = rest.trim_start();
    if unit.chars().all(|c| c.is_ascii_alphabetic()) {
        Some((number, unit))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_magnitude() {
        assert_eq!(split_magnitude("2.2k"), Some(("2.2", "k")));
        assert_eq!(split_magnitude("1e-6"), Some(("1e-6", "")));
        assert_eq!(split_magnitude("10 meg"), Some(("10", "meg")));
        assert_eq!(split_magnitude("k10"), None);
        assert_eq!(split_magnitude("1k2"), None);
    }

    #[test]
    fn test_number_part_must_be_float() {
        assert!(parse_magnitude_strict("1.2.3k").is_err());
        assert!(parse_magnitude_lenient("1.2.3k").is_err());
    }
}
