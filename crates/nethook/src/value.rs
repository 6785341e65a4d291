//! Decoded scalar values.

use std::fmt;

use nethook_buffers::print_octets;
use serde::Serialize;

use crate::wire::WireValue;

/// Inline preview length used by `Display` for byte values.
const DISPLAY_BYTES: usize = 32;

/// One decoded scalar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    #[serde(rename = "uint")]
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Enum { value: i64, name: Option<String> },
}

impl Scalar {
    /// Raw interpretation of a wire value with no schema.
    pub fn from_wire(value: WireValue<'_>) -> Self {
        match value {
            WireValue::Varint(v) | WireValue::Fixed64(v) => Scalar::UInt(v),
            WireValue::Fixed32(v) => Scalar::UInt(u64::from(v)),
            WireValue::Len(bytes) => Scalar::Bytes(bytes.to_vec()),
        }
    }

    /// Formats the value, previewing at most `max_bytes` of a byte string.
    pub fn display_with(&self, max_bytes: usize) -> String {
        match self {
            Scalar::Bytes(bytes) => format_bytes(bytes, max_bytes),
            other => other.to_string(),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Scalar::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::UInt(v) => Some(*v),
            Scalar::Int(v) => u64::try_from(*v).ok(),
            Scalar::Enum { value, .. } => u64::try_from(*value).ok(),
            Scalar::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }
}

fn format_bytes(bytes: &[u8], max: usize) -> String {
    if bytes.is_empty() {
        return "(0 bytes)".to_string();
    }
    format!("{} ({} bytes)", print_octets(bytes, max), bytes.len())
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::UInt(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Str(v) => write!(f, "{v:?}"),
            Scalar::Bytes(v) => f.write_str(&format_bytes(v, DISPLAY_BYTES)),
            Scalar::Enum {
                value,
                name: Some(name),
            } => write!(f, "{name} ({value})"),
            Scalar::Enum { value, name: None } => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matrix() {
        assert_eq!(Scalar::Bool(true).to_string(), "true");
        assert_eq!(Scalar::Int(-3).to_string(), "-3");
        assert_eq!(Scalar::Str("a\"b".into()).to_string(), r#""a\"b""#);
        assert_eq!(
            Scalar::Enum {
                value: 1,
                name: Some("OK".into())
            }
            .to_string(),
            "OK (1)"
        );
        let unnamed = Scalar::Enum {
            value: 77,
            name: None,
        };
        assert_eq!(unnamed.to_string(), "77");
        assert_eq!(
            Scalar::Bytes(vec![0xde, 0xad]).to_string(),
            "de ad (2 bytes)"
        );
        assert_eq!(Scalar::Bytes(vec![]).to_string(), "(0 bytes)");
    }

    #[test]
    fn preview_width() {
        let bytes = Scalar::Bytes((0..8).collect());
        assert_eq!(bytes.display_with(2), "00 01... (6 more) (8 bytes)");
    }

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_value(Scalar::UInt(5)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "uint", "value": 5}));
    }
}
