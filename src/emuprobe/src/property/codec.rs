//! Type codecs: raw bytes <-> property values.
//!
//! The property type is a closed set, so dispatch is a plain `match` on the
//! tag. Every codec sees the bytes after bit selection has been applied.

use super::{PropertyError, PropertyType};
use crate::glossary::GlossaryTable;
use crate::numbers::parse_number;
use crate::platform::Endian;

use byteorder::{ByteOrder, BE, LE};
use serde_json::Value;

/// Everything a codec needs besides the bytes themselves
#[derive(Debug, Clone, Copy)]
pub struct CodecParams<'a> {
    pub endian: Endian,
    /// Bytes per character, for strings
    pub char_size: usize,
    /// Character map, for strings
    pub table: Option<&'a GlossaryTable>,
}

impl Default for CodecParams<'_> {
    fn default() -> Self {
        Self {
            endian: Endian::Little,
            char_size: 1,
            table: None,
        }
    }
}

pub fn decode(kind: PropertyType, bytes: &[u8], params: &CodecParams<'_>) -> Result<Value, PropertyError> {
    match kind {
        PropertyType::Int => decode_integer(kind, bytes, params.endian, true),
        PropertyType::UInt => decode_integer(kind, bytes, params.endian, false),
        PropertyType::Bool | PropertyType::Bit => Ok(Value::Bool(bytes.iter().any(|&b| b != 0))),
        PropertyType::Bcd => decode_bcd(bytes),
        PropertyType::BitArray => Ok(Value::Array(
            (0..bytes.len() * 8)
                .map(|i| Value::Bool((bytes[i / 8] >> (i % 8)) & 1 == 1))
                .collect(),
        )),
        PropertyType::String => decode_string(bytes, params),
    }
}

/// Encode `value` into at most `length` bytes
pub fn encode(
    kind: PropertyType,
    value: &Value,
    length: usize,
    params: &CodecParams<'_>,
) -> Result<Vec<u8>, PropertyError> {
    match kind {
        PropertyType::Int | PropertyType::UInt => {
            let n = integer_value(value).ok_or_else(|| invalid(kind, value))?;
            encode_integer(kind, n, length, params.endian)
        }
        PropertyType::Bool | PropertyType::Bit => {
            let flag = match value {
                Value::Bool(b) => *b,
                other => integer_value(other).ok_or_else(|| invalid(kind, value))? != 0,
            };
            encode_integer(kind, flag as i128, length, params.endian)
        }
        PropertyType::Bcd | PropertyType::BitArray => Err(PropertyError::NotSupported {
            kind,
            operation: "encode",
        }),
        PropertyType::String => {
            let text = value.as_str().ok_or_else(|| invalid(kind, value))?;
            encode_string(text, length, params)
        }
    }
}

fn invalid(kind: PropertyType, value: &Value) -> PropertyError {
    PropertyError::InvalidValue {
        kind,
        value: value.clone(),
    }
}

/// Numeric view of a value; numeric strings are accepted
pub(crate) fn integer_value(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::Bool(b) => Some(*b as i128),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .map(i128::from)
            .or_else(|| parse_number(s).map(i128::from)),
        _ => None,
    }
}

fn decode_integer(kind: PropertyType, bytes: &[u8], endian: Endian, signed: bool) -> Result<Value, PropertyError> {
    let len = bytes.len();
    if len > 8 {
        return Err(PropertyError::UnsupportedLength { kind, length: len });
    }
    if len == 0 {
        return Ok(Value::from(0));
    }

    let raw = match endian {
        Endian::Little => LE::read_uint(bytes, len),
        Endian::Big => BE::read_uint(bytes, len),
    };

    if signed {
        let shift = 64 - 8 * len as u32;
        Ok(Value::from(((raw << shift) as i64) >> shift))
    } else {
        Ok(Value::from(raw))
    }
}

fn encode_integer(kind: PropertyType, n: i128, length: usize, endian: Endian) -> Result<Vec<u8>, PropertyError> {
    if length > 8 {
        return Err(PropertyError::UnsupportedLength { kind, length });
    }
    let mut buf = vec![0u8; length];
    if length == 0 {
        return Ok(buf);
    }

    let mut raw = n as u64;
    if length < 8 {
        raw &= (1u64 << (8 * length)) - 1;
    }
    match endian {
        Endian::Little => LE::write_uint(&mut buf, raw, length),
        Endian::Big => BE::write_uint(&mut buf, raw, length),
    }
    Ok(buf)
}

fn decode_bcd(bytes: &[u8]) -> Result<Value, PropertyError> {
    let mut total: u64 = 0;
    for &b in bytes {
        let digits = 10 * (b >> 4) as u64 + (b & 0x0F) as u64;
        total = total
            .checked_mul(100)
            .and_then(|t| t.checked_add(digits))
            .ok_or(PropertyError::UnsupportedLength {
                kind: PropertyType::Bcd,
                length: bytes.len(),
            })?;
    }
    Ok(Value::from(total))
}

fn decode_string(bytes: &[u8], params: &CodecParams<'_>) -> Result<Value, PropertyError> {
    let size = params.char_size.max(1);
    if size > 8 {
        return Err(PropertyError::UnsupportedLength {
            kind: PropertyType::String,
            length: size,
        });
    }
    let Some(table) = params.table else {
        return Ok(Value::Null);
    };

    let mut out = String::new();
    for chunk in bytes.chunks_exact(size) {
        let key = BE::read_uint(chunk, size);
        // An unknown code ends the string the same way the terminator does
        match table.get_by_key(key).map(|e| &e.value) {
            None | Some(Value::Null) => break,
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
        }
    }
    Ok(Value::String(out))
}

fn encode_string(text: &str, length: usize, params: &CodecParams<'_>) -> Result<Vec<u8>, PropertyError> {
    let size = params.char_size.max(1);
    if size > 8 {
        return Err(PropertyError::UnsupportedLength {
            kind: PropertyType::String,
            length: size,
        });
    }
    let table = params
        .table
        .ok_or_else(|| invalid(PropertyType::String, &Value::String(text.to_string())))?;

    let budget = (length / size).saturating_sub(1);
    let mut out = Vec::with_capacity(length);

    for c in text.chars().take(budget) {
        let wanted = Value::String(c.to_string());
        let entry = table
            .get_by_value(&wanted)
            .ok_or_else(|| PropertyError::GlossaryValueNotFound {
                glossary: table.name.clone(),
                value: wanted.clone(),
            })?;
        push_code(&mut out, entry.key, size)?;
    }
    if let Some(terminator) = table.terminator() {
        push_code(&mut out, terminator.key, size)?;
    }
    Ok(out)
}

fn push_code(out: &mut Vec<u8>, key: u64, size: usize) -> Result<(), PropertyError> {
    if size < 8 && key >> (8 * size) != 0 {
        return Err(PropertyError::UnsupportedLength {
            kind: PropertyType::String,
            length: size,
        });
    }
    let mut buf = [0u8; 8];
    BE::write_uint(&mut buf[..size], key, size);
    out.extend_from_slice(&buf[..size]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glossary::GlossaryEntry;
    use serde_json::json;

    fn le() -> CodecParams<'static> {
        CodecParams::default()
    }

    fn be() -> CodecParams<'static> {
        CodecParams {
            endian: Endian::Big,
            ..CodecParams::default()
        }
    }

    fn charmap() -> GlossaryTable {
        let mut entries: Vec<GlossaryEntry> = ('A'..='Z')
            .enumerate()
            .map(|(i, c)| GlossaryEntry::new(0x80 + i as u64, c.to_string()))
            .collect();
        entries.push(GlossaryEntry::new(0x7F, " "));
        entries.push(GlossaryEntry::new(0x50, Value::Null));
        GlossaryTable::new("defaultCharacterMap", entries)
    }

    #[test]
    fn test_decode_uint() {
        assert_eq!(decode(PropertyType::UInt, &[0x01], &le()).unwrap(), json!(1));
        assert_eq!(
            decode(PropertyType::UInt, &[0x34, 0x12], &le()).unwrap(),
            json!(0x1234)
        );
        assert_eq!(
            decode(PropertyType::UInt, &[0x12, 0x34], &be()).unwrap(),
            json!(0x1234)
        );
    }

    #[test]
    fn test_decode_three_byte_int() {
        let bytes = [0x07, 0xB0, 0x93];
        assert_eq!(decode(PropertyType::Int, &bytes, &be()).unwrap(), json!(503955));
        assert_eq!(decode(PropertyType::Int, &bytes, &le()).unwrap(), json!(-7098361));
        assert_eq!(decode(PropertyType::UInt, &bytes, &le()).unwrap(), json!(0x93B007));
    }

    #[test]
    fn test_int_sign_extension() {
        assert_eq!(decode(PropertyType::Int, &[0xFF], &le()).unwrap(), json!(-1));
        assert_eq!(decode(PropertyType::UInt, &[0xFF], &le()).unwrap(), json!(255));
        assert_eq!(
            decode(PropertyType::Int, &[0xFE, 0xFF], &le()).unwrap(),
            json!(-2)
        );
    }

    #[test]
    fn test_integer_roundtrip_both_endians() {
        let cases: &[(PropertyType, i64, usize)] = &[
            (PropertyType::UInt, 0, 1),
            (PropertyType::UInt, 255, 1),
            (PropertyType::UInt, 65535, 2),
            (PropertyType::UInt, 503955, 3),
            (PropertyType::UInt, i64::MAX, 8),
            (PropertyType::Int, -1, 1),
            (PropertyType::Int, -128, 1),
            (PropertyType::Int, 127, 1),
            (PropertyType::Int, -8_388_608, 3),
            (PropertyType::Int, i64::MIN, 8),
        ];
        for params in [le(), be()] {
            for &(kind, v, len) in cases {
                let bytes = encode(kind, &json!(v), len, &params).unwrap();
                assert_eq!(bytes.len(), len);
                assert_eq!(
                    decode(kind, &bytes, &params).unwrap(),
                    json!(v),
                    "{:?} {} in {} bytes ({:?})",
                    kind,
                    v,
                    len,
                    params.endian
                );
            }
        }
    }

    #[test]
    fn test_encode_truncates_to_length() {
        let bytes = encode(PropertyType::UInt, &json!(0x1_0203), 2, &le()).unwrap();
        assert_eq!(bytes, vec![0x03, 0x02]);
    }

    #[test]
    fn test_integer_too_wide() {
        assert!(matches!(
            decode(PropertyType::UInt, &[0; 9], &le()),
            Err(PropertyError::UnsupportedLength { length: 9, .. })
        ));
    }

    #[test]
    fn test_bool() {
        assert_eq!(decode(PropertyType::Bool, &[0x00], &le()).unwrap(), json!(false));
        assert_eq!(decode(PropertyType::Bool, &[0x20], &le()).unwrap(), json!(true));
        assert_eq!(encode(PropertyType::Bool, &json!(true), 1, &le()).unwrap(), vec![1]);
        assert_eq!(encode(PropertyType::Bool, &json!(0), 1, &le()).unwrap(), vec![0]);
        assert!(encode(PropertyType::Bool, &json!("maybe"), 1, &le()).is_err());
    }

    #[test]
    fn test_bcd() {
        assert_eq!(
            decode(PropertyType::Bcd, &[0x12, 0x34, 0x56], &le()).unwrap(),
            json!(123456)
        );
        assert!(matches!(
            encode(PropertyType::Bcd, &json!(1), 3, &le()),
            Err(PropertyError::NotSupported { .. })
        ));
    }

    #[test]
    fn test_bit_array() {
        let value = decode(PropertyType::BitArray, &[0b0000_0101, 0x80], &le()).unwrap();
        let bits = value.as_array().unwrap();
        assert_eq!(bits.len(), 16);
        assert_eq!(bits[0], json!(true));
        assert_eq!(bits[1], json!(false));
        assert_eq!(bits[2], json!(true));
        assert_eq!(bits[15], json!(true));
        assert!(encode(PropertyType::BitArray, &value, 2, &le()).is_err());
    }

    #[test]
    fn test_string_decode_stops_at_terminator() {
        let table = charmap();
        let params = CodecParams {
            table: Some(&table),
            ..CodecParams::default()
        };
        let bytes = [0x81, 0x80, 0x92, 0x50, 0x80, 0x80];
        assert_eq!(decode(PropertyType::String, &bytes, &params).unwrap(), json!("BAS"));
    }

    #[test]
    fn test_string_unknown_code_ends_string() {
        let table = charmap();
        let params = CodecParams {
            table: Some(&table),
            ..CodecParams::default()
        };
        assert_eq!(
            decode(PropertyType::String, &[0x80, 0x01, 0x81], &params).unwrap(),
            json!("A")
        );
    }

    #[test]
    fn test_string_roundtrip() {
        let table = charmap();
        let params = CodecParams {
            table: Some(&table),
            ..CodecParams::default()
        };
        for s in ["", "A", "RED", "ASH KETCH"] {
            let bytes = encode(PropertyType::String, &json!(s), 11, &params).unwrap();
            assert_eq!(decode(PropertyType::String, &bytes, &params).unwrap(), json!(s));
        }
    }

    #[test]
    fn test_string_encode_truncates_and_terminates() {
        let table = charmap();
        let params = CodecParams {
            table: Some(&table),
            ..CodecParams::default()
        };
        let bytes = encode(PropertyType::String, &json!("ABCDEF"), 4, &params).unwrap();
        assert_eq!(bytes, vec![0x80, 0x81, 0x82, 0x50]);
    }

    #[test]
    fn test_wide_string_codes_are_big_endian() {
        let table = GlossaryTable::new(
            "wide",
            vec![
                GlossaryEntry::new(0x0141, "A"),
                GlossaryEntry::new(0x0142, "B"),
                GlossaryEntry::new(0xFFFF, Value::Null),
            ],
        );
        let params = CodecParams {
            char_size: 2,
            table: Some(&table),
            ..CodecParams::default()
        };
        let bytes = encode(PropertyType::String, &json!("AB"), 8, &params).unwrap();
        assert_eq!(bytes, vec![0x01, 0x41, 0x01, 0x42, 0xFF, 0xFF]);
        assert_eq!(decode(PropertyType::String, &bytes, &params).unwrap(), json!("AB"));
    }

    #[test]
    fn test_string_encode_unknown_character() {
        let table = charmap();
        let params = CodecParams {
            table: Some(&table),
            ..CodecParams::default()
        };
        assert!(matches!(
            encode(PropertyType::String, &json!("a"), 4, &params),
            Err(PropertyError::GlossaryValueNotFound { .. })
        ));
    }
}
