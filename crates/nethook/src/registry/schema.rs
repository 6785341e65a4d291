//! Schema definitions held by the registry.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::wire::WireType;

/// Protobuf field type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Enum,
    Message,
    /// Length-delimited run of `[u32 length][packet]` items, each a complete
    /// header + body decoded through the dispatch table.
    Multiplexed,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Sint32 => "sint32",
            Self::Sint64 => "sint64",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::Sfixed32 => "sfixed32",
            Self::Sfixed64 => "sfixed64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Enum => "enum",
            Self::Message => "message",
            Self::Multiplexed => "multiplexed",
        }
    }

    /// Wire type a non-packed value of this field type travels as.
    pub fn wire_type(self) -> WireType {
        match self {
            Self::Int32
            | Self::Int64
            | Self::Uint32
            | Self::Uint64
            | Self::Sint32
            | Self::Sint64
            | Self::Bool
            | Self::Enum => WireType::Varint,
            Self::Fixed64 | Self::Sfixed64 | Self::Double => WireType::Fixed64,
            Self::Fixed32 | Self::Sfixed32 | Self::Float => WireType::Fixed32,
            Self::String | Self::Bytes | Self::Message | Self::Multiplexed => WireType::Len,
        }
    }

    /// Scalar numeric types may appear packed inside one length-delimited value.
    pub fn is_packable(self) -> bool {
        self.wire_type() != WireType::Len
    }

    /// Whether the `ref` attribute names a target for this type.
    pub fn takes_ref(self) -> bool {
        matches!(self, Self::Enum | Self::Message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub number: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub repeated: bool,
    /// Enum or message name for `enum` and `message` fields.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<String>,
    /// For `multiplexed` fields: sibling field holding the inflated size when
    /// the bytes are gzip-compressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size_field: Option<u32>,
}

impl FieldSchema {
    pub fn new(number: u32, name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            number,
            name: name.into(),
            ty,
            repeated: false,
            type_ref: None,
            compressed_size_field: None,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub fn with_ref(mut self, target: impl Into<String>) -> Self {
        self.type_ref = Some(target.into());
        self
    }

    pub fn compressed_by(mut self, size_field: u32) -> Self {
        self.compressed_size_field = Some(size_field);
        self
    }
}

/// Ordered field list of a protobuf message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl MessageSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Position of the field with the given number in declaration order.
    pub fn position(&self, number: u32) -> Option<usize> {
        self.fields.iter().position(|f| f.number == number)
    }
}

/// Fixed-width scalar of a flat layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bool,
}

impl FlatType {
    pub fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 | Self::Bool => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FlatType,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<String>,
}

impl FlatField {
    pub fn new(name: impl Into<String>, ty: FlatType) -> Self {
        Self {
            name: name.into(),
            ty,
            type_ref: None,
        }
    }

    pub fn with_ref(mut self, target: impl Into<String>) -> Self {
        self.type_ref = Some(target.into());
        self
    }
}

/// Fixed byte-offset struct: fields read back to back from offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatLayout {
    pub name: String,
    pub fields: Vec<FlatField>,
    /// Label for whatever follows the fixed fields.
    pub trailing: Option<String>,
}

impl FlatLayout {
    pub fn new(name: impl Into<String>, fields: Vec<FlatField>) -> Self {
        Self {
            name: name.into(),
            fields,
            trailing: None,
        }
    }

    pub fn with_trailing(mut self, label: impl Into<String>) -> Self {
        self.trailing = Some(label.into());
        self
    }

    /// Byte length of the fixed part.
    pub fn fixed_len(&self) -> usize {
        self.fields.iter().map(|f| f.ty.size()).sum()
    }
}

/// Symbolic names for enum values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub values: IndexMap<String, i64>,
    by_value: HashMap<i64, String>,
}

impl EnumDef {
    /// Builds the definition. When two names share a value the first one wins.
    pub fn new(name: impl Into<String>, values: IndexMap<String, i64>) -> Self {
        let mut by_value = HashMap::with_capacity(values.len());
        for (k, v) in &values {
            by_value.entry(*v).or_insert_with(|| k.clone());
        }
        Self {
            name: name.into(),
            values,
            by_value,
        }
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.by_value.get(&value).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_wire_types() {
        assert_eq!(FieldType::Sint64.wire_type(), WireType::Varint);
        assert_eq!(FieldType::Fixed64.wire_type(), WireType::Fixed64);
        assert_eq!(FieldType::Float.wire_type(), WireType::Fixed32);
        assert_eq!(FieldType::Multiplexed.wire_type(), WireType::Len);
        assert!(FieldType::Enum.is_packable());
        assert!(!FieldType::Bytes.is_packable());
    }

    #[test]
    fn field_schema_from_json() {
        let json = r#"{"number":3,"name":"eresult","type":"enum","ref":"EResult"}"#;
        let field: FieldSchema = serde_json::from_str(json).unwrap();
        let expected = FieldSchema::new(3, "eresult", FieldType::Enum).with_ref("EResult");
        assert_eq!(field, expected);
    }

    #[test]
    fn enum_first_name_wins() {
        let mut values = IndexMap::new();
        values.insert("OK".to_string(), 1);
        values.insert("Success".to_string(), 1);
        let def = EnumDef::new("EResult", values);
        assert_eq!(def.name_of(1), Some("OK"));
        assert_eq!(def.name_of(2), None);
    }

    #[test]
    fn flat_layout_length() {
        let layout = FlatLayout::new(
            "MsgChannelEncryptRequest",
            vec![
                FlatField::new("protocol_version", FlatType::U32),
                FlatField::new("universe", FlatType::U32),
            ],
        );
        assert_eq!(layout.fixed_len(), 8);
    }
}
