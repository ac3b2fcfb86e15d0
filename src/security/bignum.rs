//! Text and byte encodings of big integers used on the wire and in files.

use num_bigint_dig::BigUint;
use num_traits::Num;

/// `0x`-prefixed lowercase hex, the format of every number this crate writes.
pub fn to_hex(n: &BigUint) -> String {
    format!("0x{}", n.to_str_radix(16))
}

/// Parse hex with an optional `0x`/`0X` prefix. Surrounding whitespace is
/// ignored; anything else that is not a hex digit is rejected.
pub fn from_hex(s: &str) -> Option<BigUint> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    BigUint::from_str_radix(digits, 16).ok()
}

/// Big-endian bytes left-padded with zeros to `width`. Returns `None` when
/// `n` does not fit.
pub fn to_fixed_bytes(n: &BigUint, width: usize) -> Option<Vec<u8>> {
    let raw = n.to_bytes_be();
    if raw.len() > width {
        return None;
    }
    let mut out = vec![0u8; width - raw.len()];
    out.extend_from_slice(&raw);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_accepts_optional_prefix() {
        let n = BigUint::from(0xdead_beefu64);
        assert_eq!(to_hex(&n), "0xdeadbeef");
        assert_eq!(from_hex("0xdeadbeef"), Some(n.clone()));
        assert_eq!(from_hex("0XDEADBEEF"), Some(n.clone()));
        assert_eq!(from_hex(" deadbeef\n"), Some(n));
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert_eq!(from_hex(""), None);
        assert_eq!(from_hex("0x"), None);
        assert_eq!(from_hex("0x12g4"), None);
        assert_eq!(from_hex("-12"), None);
        assert_eq!(from_hex("12 34"), None);
    }

    #[test]
    fn test_fixed_bytes() {
        let n = BigUint::from(0x0102u32);
        assert_eq!(to_fixed_bytes(&n, 4), Some(vec![0, 0, 1, 2]));
        assert_eq!(to_fixed_bytes(&n, 1), None);
    }
}
