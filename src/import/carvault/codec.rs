//! Codec for CarVault's embedded document records.
//!
//! CarVault persists BSON-compatible documents: a 4-byte little-endian total
//! length, a sequence of typed elements, and a 0x00 terminator. Only the
//! element types the product actually writes are supported; anything else is
//! a decode error, which the scanner treats as a false positive.
//!
//! Decimal fields use the .NET 96-bit decimal layout (lo/mid/hi/flags) and
//! are surfaced as the `{"$numberDecimal": "…"}` wrapper so downstream
//! mapping shares one monetary normalization path with the JSON pipeline.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Required final byte of every document.
pub const DOC_TERMINATOR: u8 = 0x00;

const TYPE_DOUBLE: u8 = 0x01;
const TYPE_STRING: u8 = 0x02;
const TYPE_DOCUMENT: u8 = 0x03;
const TYPE_ARRAY: u8 = 0x04;
const TYPE_BOOL: u8 = 0x08;
const TYPE_DATETIME: u8 = 0x09;
const TYPE_NULL: u8 = 0x0A;
const TYPE_INT32: u8 = 0x10;
const TYPE_INT64: u8 = 0x12;
const TYPE_DECIMAL: u8 = 0x13;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("document shorter than header")]
    Truncated,
    #[error("declared length {declared} does not match buffer length {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("document missing 0x00 terminator")]
    MissingTerminator,
    #[error("element overruns document at offset {0}")]
    Overrun(usize),
    #[error("field name is not valid utf-8")]
    BadFieldName,
    #[error("string payload is malformed at offset {0}")]
    BadString(usize),
    #[error("unsupported element type 0x{0:02x}")]
    UnsupportedType(u8),
}

/// Decode one complete document from `bytes`.
///
/// `bytes` must span exactly the document: length prefix through terminator.
pub fn decode_document(bytes: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    if bytes.len() < 5 {
        return Err(DecodeError::Truncated);
    }
    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if declared != bytes.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    if bytes[bytes.len() - 1] != DOC_TERMINATOR {
        return Err(DecodeError::MissingTerminator);
    }

    let mut fields = Map::new();
    let mut pos = 4;
    loop {
        let type_byte = *bytes.get(pos).ok_or(DecodeError::Overrun(pos))?;
        if type_byte == DOC_TERMINATOR {
            if pos != bytes.len() - 1 {
                return Err(DecodeError::Overrun(pos));
            }
            break;
        }
        pos += 1;

        let (name, after_name) = read_cstring(bytes, pos)?;
        pos = after_name;

        let (value, after_value) = read_element(type_byte, bytes, pos)?;
        pos = after_value;

        fields.insert(name, value);
    }

    Ok(fields)
}

fn read_cstring(bytes: &[u8], start: usize) -> Result<(String, usize), DecodeError> {
    let remainder = bytes.get(start..).ok_or(DecodeError::Overrun(start))?;
    let nul = remainder
        .iter()
        .position(|b| *b == 0)
        .ok_or(DecodeError::Overrun(start))?;
    let name = std::str::from_utf8(&remainder[..nul]).map_err(|_| DecodeError::BadFieldName)?;
    Ok((name.to_string(), start + nul + 1))
}

fn read_element(
    type_byte: u8,
    bytes: &[u8],
    pos: usize,
) -> Result<(Value, usize), DecodeError> {
    match type_byte {
        TYPE_DOUBLE => {
            let raw = take::<8>(bytes, pos)?;
            let number = Number::from_f64(f64::from_le_bytes(raw))
                .unwrap_or_else(|| Number::from(0));
            Ok((Value::Number(number), pos + 8))
        }
        TYPE_STRING => {
            let raw = take::<4>(bytes, pos)?;
            let len = i32::from_le_bytes(raw);
            if len < 1 {
                return Err(DecodeError::BadString(pos));
            }
            let len = len as usize;
            let start = pos + 4;
            let end = start + len;
            let payload = bytes.get(start..end).ok_or(DecodeError::Overrun(pos))?;
            if payload[len - 1] != 0 {
                return Err(DecodeError::BadString(pos));
            }
            let text = std::str::from_utf8(&payload[..len - 1])
                .map_err(|_| DecodeError::BadString(pos))?;
            Ok((Value::String(text.to_string()), end))
        }
        TYPE_DOCUMENT | TYPE_ARRAY => {
            let raw = take::<4>(bytes, pos)?;
            let len = u32::from_le_bytes(raw) as usize;
            let end = pos.checked_add(len).ok_or(DecodeError::Overrun(pos))?;
            let slice = bytes.get(pos..end).ok_or(DecodeError::Overrun(pos))?;
            let nested = decode_document(slice)?;
            let value = if type_byte == TYPE_ARRAY {
                // Arrays are documents keyed "0", "1", …; key order is the
                // element order.
                Value::Array(nested.into_iter().map(|(_, v)| v).collect())
            } else {
                Value::Object(nested)
            };
            Ok((value, end))
        }
        TYPE_BOOL => {
            let raw = take::<1>(bytes, pos)?;
            Ok((Value::Bool(raw[0] != 0), pos + 1))
        }
        TYPE_DATETIME => {
            let raw = take::<8>(bytes, pos)?;
            let millis = i64::from_le_bytes(raw);
            let rendered = chrono::DateTime::from_timestamp_millis(millis)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default();
            Ok((Value::String(rendered), pos + 8))
        }
        TYPE_NULL => Ok((Value::Null, pos)),
        TYPE_INT32 => {
            let raw = take::<4>(bytes, pos)?;
            Ok((Value::from(i32::from_le_bytes(raw)), pos + 4))
        }
        TYPE_INT64 => {
            let raw = take::<8>(bytes, pos)?;
            Ok((Value::from(i64::from_le_bytes(raw)), pos + 8))
        }
        TYPE_DECIMAL => {
            let raw = take::<16>(bytes, pos)?;
            let rendered = format_net_decimal(&raw);
            let mut wrapper = Map::new();
            wrapper.insert("$numberDecimal".to_string(), Value::String(rendered));
            Ok((Value::Object(wrapper), pos + 16))
        }
        other => Err(DecodeError::UnsupportedType(other)),
    }
}

fn take<const N: usize>(bytes: &[u8], pos: usize) -> Result<[u8; N], DecodeError> {
    let slice = bytes
        .get(pos..pos + N)
        .ok_or(DecodeError::Overrun(pos))?;
    let mut raw = [0u8; N];
    raw.copy_from_slice(slice);
    Ok(raw)
}

/// Render a .NET decimal (lo/mid/hi 96-bit mantissa + flags word) as its
/// canonical string, preserving the stored scale.
fn format_net_decimal(raw: &[u8; 16]) -> String {
    let lo = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as u128;
    let mid = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as u128;
    let hi = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]) as u128;
    let flags = u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]);

    let mantissa = (hi << 64) | (mid << 32) | lo;
    let scale = ((flags >> 16) & 0xFF).min(28) as usize;
    let negative = flags & 0x8000_0000 != 0;

    let mut digits = mantissa.to_string();
    if digits.len() <= scale {
        digits = format!("{:0>width$}", digits, width = scale + 1);
    }
    if scale > 0 {
        digits.insert(digits.len() - scale, '.');
    }
    if negative {
        digits.insert(0, '-');
    }
    digits
}

/// Encode a document in the CarVault record layout.
///
/// Exercised by the test fixtures and diagnostics tooling; the import
/// pipelines themselves only decode.
pub fn encode_document(fields: &Map<String, Value>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        encode_element(&mut body, name, value);
    }

    let total = body.len() + 5;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out.push(DOC_TERMINATOR);
    out
}

fn encode_element(out: &mut Vec<u8>, name: &str, value: &Value) {
    match value {
        Value::Null => {
            push_header(out, TYPE_NULL, name);
        }
        Value::Bool(b) => {
            push_header(out, TYPE_BOOL, name);
            out.push(u8::from(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if i32::try_from(i).is_ok() {
                    push_header(out, TYPE_INT32, name);
                    out.extend_from_slice(&(i as i32).to_le_bytes());
                } else {
                    push_header(out, TYPE_INT64, name);
                    out.extend_from_slice(&i.to_le_bytes());
                }
            } else {
                push_header(out, TYPE_DOUBLE, name);
                out.extend_from_slice(&n.as_f64().unwrap_or(0.0).to_le_bytes());
            }
        }
        Value::String(s) => {
            push_header(out, TYPE_STRING, name);
            out.extend_from_slice(&((s.len() + 1) as i32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        Value::Array(items) => {
            push_header(out, TYPE_ARRAY, name);
            let mut indexed = Map::new();
            for (idx, item) in items.iter().enumerate() {
                indexed.insert(idx.to_string(), item.clone());
            }
            out.extend_from_slice(&encode_document(&indexed));
        }
        Value::Object(map) => {
            if let Some(Value::String(decimal)) = map.get("$numberDecimal") {
                if map.len() == 1 {
                    push_header(out, TYPE_DECIMAL, name);
                    out.extend_from_slice(&encode_net_decimal(decimal));
                    return;
                }
            }
            push_header(out, TYPE_DOCUMENT, name);
            out.extend_from_slice(&encode_document(map));
        }
    }
}

fn push_header(out: &mut Vec<u8>, type_byte: u8, name: &str) {
    out.push(type_byte);
    out.extend_from_slice(name.as_bytes());
    out.push(0);
}

fn encode_net_decimal(text: &str) -> [u8; 16] {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    let scale = frac_part.len().min(28) as u32;
    let mantissa: u128 = format!("{int_part}{frac_part}").parse().unwrap_or(0);

    let mut raw = [0u8; 16];
    raw[0..4].copy_from_slice(&((mantissa & 0xFFFF_FFFF) as u32).to_le_bytes());
    raw[4..8].copy_from_slice(&(((mantissa >> 32) & 0xFFFF_FFFF) as u32).to_le_bytes());
    raw[8..12].copy_from_slice(&(((mantissa >> 64) & 0xFFFF_FFFF) as u32).to_le_bytes());
    let mut flags = scale << 16;
    if negative {
        flags |= 0x8000_0000;
    }
    raw[12..16].copy_from_slice(&flags.to_le_bytes());
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Map<String, Value> {
        value.as_object().expect("object fixture").clone()
    }

    #[test]
    fn round_trips_typical_vehicle_document() {
        let fields = doc(json!({
            "_id": 3,
            "Make": "Toyota",
            "Model": "Corolla",
            "Year": 2015,
            "IsElectric": false,
            "PurchasePrice": {"$numberDecimal": "12500.00"},
            "Tags": ["daily", "fleet"],
            "Meta": {"Color": "blue"},
            "SoldPrice": null,
        }));
        let bytes = encode_document(&fields);
        assert_eq!(
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize,
            bytes.len()
        );
        assert_eq!(*bytes.last().unwrap(), DOC_TERMINATOR);

        let decoded = decode_document(&bytes).expect("decode");
        assert_eq!(decoded.get("Make"), Some(&json!("Toyota")));
        assert_eq!(decoded.get("Year"), Some(&json!(2015)));
        assert_eq!(decoded.get("IsElectric"), Some(&json!(false)));
        assert_eq!(
            decoded.get("PurchasePrice"),
            Some(&json!({"$numberDecimal": "12500.00"}))
        );
        assert_eq!(decoded.get("Tags"), Some(&json!(["daily", "fleet"])));
        assert_eq!(decoded.get("Meta"), Some(&json!({"Color": "blue"})));
        assert_eq!(decoded.get("SoldPrice"), Some(&Value::Null));
    }

    #[test]
    fn rejects_wrong_declared_length() {
        let mut bytes = encode_document(&doc(json!({"A": 1, "B": 2})));
        bytes[0] = bytes[0].wrapping_add(1);
        let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(
            decode_document(&bytes),
            Err(DecodeError::LengthMismatch {
                declared,
                actual: bytes.len()
            })
        );
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut bytes = encode_document(&doc(json!({"A": 1})));
        let last = bytes.len() - 1;
        bytes[last] = 0x7F;
        assert_eq!(decode_document(&bytes), Err(DecodeError::MissingTerminator));
    }

    #[test]
    fn rejects_unknown_element_type() {
        let mut bytes = encode_document(&doc(json!({"A": 1})));
        // Overwrite the element type byte (first byte after the header).
        bytes[4] = 0xEE;
        assert_eq!(
            decode_document(&bytes),
            Err(DecodeError::UnsupportedType(0xEE))
        );
    }

    #[test]
    fn negative_and_scaled_decimals_render_canonically() {
        let bytes = encode_document(&doc(json!({
            "A": {"$numberDecimal": "-0.05"},
            "B": {"$numberDecimal": "150.00"},
            "C": {"$numberDecimal": "7"},
        })));
        let decoded = decode_document(&bytes).expect("decode");
        assert_eq!(decoded.get("A"), Some(&json!({"$numberDecimal": "-0.05"})));
        assert_eq!(decoded.get("B"), Some(&json!({"$numberDecimal": "150.00"})));
        assert_eq!(decoded.get("C"), Some(&json!({"$numberDecimal": "7"})));
    }

    #[test]
    fn truncated_buffers_never_panic() {
        let bytes = encode_document(&doc(json!({
            "Make": "Toyota",
            "Cost": {"$numberDecimal": "19.99"},
        })));
        for end in 0..bytes.len() {
            // Every prefix must fail cleanly.
            assert!(decode_document(&bytes[..end]).is_err());
        }
    }
}
