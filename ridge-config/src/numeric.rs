// Numeric and boolean literal parsing shared by every scalar field type.
// Grounded on `examples/original_source/src/common/parse_config.c`'s
// `s_p_handle_long`/`s_p_handle_uint32` family: the `UNLIMITED`/`INFINITE`
// sentinels, the `k`/`K` suffix, and the yes/no spellings are all taken
// from there byte for byte.

use ridge_base::{err, Result};

fn is_unlimited(text: &str) -> bool {
    text.eq_ignore_ascii_case("unlimited") || text.eq_ignore_ascii_case("infinite")
}

/// Parses a signed integer field, accepting `UNLIMITED`/`INFINITE` as
/// `i64::MAX` and a trailing `k`/`K` suffix as a ×1024 multiplier.
pub fn parse_long(text: &str) -> Result<i64> {
    let text = text.trim();
    if is_unlimited(text) {
        return Ok(i64::MAX);
    }
    let (digits, scale) = strip_k_suffix(text);
    let base: i64 = digits.parse().map_err(|_| err(format!("not an integer: {text:?}")))?;
    base.checked_mul(scale).ok_or_else(|| err(format!("integer overflow: {text:?}")))
}

/// Parses an unsigned field of a given bit width. `bits` must be one of
/// 16, 32, 64; anything else is a programmer error in the schema, not a
/// user-facing one.
pub fn parse_unsigned(text: &str, bits: u32) -> Result<u64> {
    let text = text.trim();
    let max = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
    if is_unlimited(text) {
        return Ok(max);
    }
    if let Some(rest) = text.strip_prefix('-') {
        if rest.chars().all(|c| c == '0') {
            return Ok(0);
        }
        return Err(err(format!("negative value not allowed for unsigned field: {text:?}")));
    }
    let (digits, scale) = strip_k_suffix(text);
    let base: u64 = digits.parse().map_err(|_| err(format!("not an integer: {text:?}")))?;
    let value = base.checked_mul(scale as u64).ok_or_else(|| err(format!("integer overflow: {text:?}")))?;
    if value > max {
        return Err(err(format!("value {value} exceeds {bits}-bit range")));
    }
    Ok(value)
}

pub fn parse_float(text: &str) -> Result<f32> {
    let text = text.trim();
    if is_unlimited(text) {
        return Ok(f32::MAX);
    }
    text.parse().map_err(|_| err(format!("not a float: {text:?}")))
}

pub fn parse_double(text: &str) -> Result<f64> {
    let text = text.trim();
    if is_unlimited(text) {
        return Ok(f64::MAX);
    }
    text.parse().map_err(|_| err(format!("not a double: {text:?}")))
}

/// Accepts the same yes/no spellings the original config files use in
/// place of a bare `true`/`false`.
pub fn parse_bool(text: &str) -> Result<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("yes") || text.eq_ignore_ascii_case("up") || text.eq_ignore_ascii_case("true") || text == "1" {
        Ok(true)
    } else if text.eq_ignore_ascii_case("no") || text.eq_ignore_ascii_case("down") || text.eq_ignore_ascii_case("false") || text == "0" {
        Ok(false)
    } else {
        Err(err(format!("not a boolean: {text:?}")))
    }
}

fn strip_k_suffix(text: &str) -> (&str, i64) {
    match text.strip_suffix(['k', 'K']) {
        Some(digits) => (digits, 1024),
        None => (text, 1),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_plain_and_unlimited() {
        assert_eq!(parse_long("42").unwrap(), 42);
        assert_eq!(parse_long("UNLIMITED").unwrap(), i64::MAX);
        assert_eq!(parse_long("infinite").unwrap(), i64::MAX);
    }

    #[test]
    fn parses_k_suffix() {
        assert_eq!(parse_long("4k").unwrap(), 4096);
        assert_eq!(parse_unsigned("2K", 32).unwrap(), 2048);
    }

    #[test]
    fn rejects_negative_unsigned() {
        assert!(parse_unsigned("-5", 32).is_err());
        assert_eq!(parse_unsigned("-0", 32).unwrap(), 0);
    }

    #[test]
    fn bool_spellings() {
        assert!(parse_bool("YES").unwrap());
        assert!(parse_bool("up").unwrap());
        assert!(!parse_bool("DOWN").unwrap());
        assert!(parse_bool("0").is_ok() && !parse_bool("0").unwrap());
    }
}
