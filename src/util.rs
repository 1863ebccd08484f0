//! Small shared helpers for hex parsing and decimal token amounts.
//!
//! Token amounts are carried as base-10 strings of the smallest unit
//! everywhere in the record store, so ordering and arithmetic must not go
//! through floating point or fixed-width integers silently.

use std::cmp::Ordering;

use anyhow::{anyhow, Context, Result};

/// Strips an optional `0x` prefix from a hex string.
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

/// Parses a hex quantity (with or without `0x` prefix) into a `u64`.
///
/// Used for JSON-RPC block numbers and log indexes, which arrive as hex
/// strings like `"0x10d4f"`.
pub fn parse_hex_u64(s: &str) -> Result<u64> {
    let trimmed = strip_hex_prefix(s);
    u64::from_str_radix(trimmed, 16).with_context(|| format!("invalid hex quantity: {}", s))
}

/// Returns true if `s` is a non-empty base-10 unsigned integer string.
pub fn is_decimal_amount(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Compares two base-10 unsigned integer strings with arbitrary precision.
///
/// Leading zeros are ignored. Errors if either string is not a valid
/// amount.
pub fn compare_amounts(a: &str, b: &str) -> Result<Ordering> {
    if !is_decimal_amount(a) {
        return Err(anyhow!("invalid amount: {:?}", a));
    }
    if !is_decimal_amount(b) {
        return Err(anyhow!("invalid amount: {:?}", b));
    }
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    match a.len().cmp(&b.len()) {
        Ordering::Equal => Ok(a.cmp(b)),
        other => Ok(other),
    }
}

/// Parses a base-10 amount string into a `u128`.
///
/// Amounts beyond 2^128 are rejected as malformed rather than wrapped; the
/// bridged token's total supply is far below that bound.
pub fn parse_amount(s: &str) -> Result<u128> {
    if !is_decimal_amount(s) {
        return Err(anyhow!("invalid amount: {:?}", s));
    }
    s.parse::<u128>()
        .with_context(|| format!("amount out of range: {}", s))
}

/// Decodes a 32-byte ABI word (64 hex chars) into a `u128`.
///
/// The upper 16 bytes of the word must be zero.
pub fn decode_uint_word(word: &str) -> Result<u128> {
    let word = strip_hex_prefix(word);
    if word.len() != 64 {
        return Err(anyhow!("invalid ABI word length: {}", word.len()));
    }
    let bytes = hex::decode(word).with_context(|| format!("invalid ABI word: {}", word))?;
    if bytes[..16].iter().any(|&b| b != 0) {
        return Err(anyhow!("ABI word exceeds 128 bits: {}", word));
    }
    let mut value: u128 = 0;
    for &b in &bytes[16..] {
        value = (value << 8) | b as u128;
    }
    Ok(value)
}

/// Decodes a 32-byte ABI word into its base-10 string representation.
pub fn word_to_decimal(word: &str) -> Result<String> {
    Ok(decode_uint_word(word)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_amounts_ignores_leading_zeros() {
        assert_eq!(compare_amounts("007", "7").unwrap(), Ordering::Equal);
        assert_eq!(compare_amounts("10", "9").unwrap(), Ordering::Greater);
        assert_eq!(compare_amounts("123", "1230").unwrap(), Ordering::Less);
    }

    #[test]
    fn compare_amounts_is_arbitrary_precision() {
        let big = "340282366920938463463374607431768211457"; // 2^128 + 1
        let bigger = "340282366920938463463374607431768211458";
        assert_eq!(compare_amounts(big, bigger).unwrap(), Ordering::Less);
    }

    #[test]
    fn compare_amounts_rejects_garbage() {
        assert!(compare_amounts("", "1").is_err());
        assert!(compare_amounts("12a", "1").is_err());
        assert!(compare_amounts("-5", "1").is_err());
    }

    #[test]
    fn decode_uint_word_round_trips() {
        let word = format!("{:0>64}", "64"); // 0x64 = 100
        assert_eq!(decode_uint_word(&word).unwrap(), 100);
        assert_eq!(word_to_decimal(&word).unwrap(), "100");
    }

    #[test]
    fn decode_uint_word_rejects_oversized_values() {
        let word = format!("01{}", "0".repeat(62));
        assert!(decode_uint_word(&word).is_err());
    }

    #[test]
    fn parse_hex_u64_accepts_prefixed_and_bare() {
        assert_eq!(parse_hex_u64("0x2a").unwrap(), 42);
        assert_eq!(parse_hex_u64("2a").unwrap(), 42);
        assert!(parse_hex_u64("0xzz").is_err());
    }
}
