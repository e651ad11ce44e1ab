//! Number parsing shared by mapper files and the command line.
//!
//! Mapper authors write addresses and glossary keys either as decimal or as
//! `0x`-prefixed hex, and either as numbers or as strings.

use serde::de::{self, Deserializer, Visitor};
use std::fmt;

/// Parse a hex (`0x`-prefixed) or decimal number
pub fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u64>().ok()
    }
}

/// Parse space-separated hex byte pairs such as `"0a ff 3"`
pub fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    text.split_whitespace()
        .map(|part| u8::from_str_radix(part, 16).ok())
        .collect()
}

struct NumberVisitor;

impl Visitor<'_> for NumberVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal/0x-hex string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::custom(format!("negative number {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        parse_number(v).ok_or_else(|| E::custom(format!("invalid number '{v}'")))
    }
}

pub(crate) fn deserialize_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    d.deserialize_any(NumberVisitor)
}

pub(crate) fn deserialize_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = d.deserialize_any(NumberVisitor)?;
    u32::try_from(v).map_err(|_| de::Error::custom(format!("{v:#x} does not fit in 32 bits")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0xD472"), Some(0xD472));
        assert_eq!(parse_number("54386"), Some(54386));
        assert_eq!(parse_number(" 0X10 "), Some(16));
        assert_eq!(parse_number("d472"), None);
        assert_eq!(parse_number("-1"), None);
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("11 22 ff"), Some(vec![0x11, 0x22, 0xFF]));
        assert_eq!(parse_hex_bytes("1 zz"), None);
        assert_eq!(parse_hex_bytes(""), Some(vec![]));
    }
}
