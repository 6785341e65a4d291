//! Body decoding by message-type dispatch.
//!
//! The registry picks one of three strategies for the bytes after the
//! header: a protobuf schema, a flat fixed-offset layout, or nothing, in
//! which case the bytes are kept verbatim. Decoding never fails outright;
//! problems are recorded as a [`Defect`] next to whatever was decoded before
//! the problem was hit.

use std::borrow::Cow;
use std::fmt;
use std::io::Read;

use flate2::read::GzDecoder;
use nethook_buffers::{BufferError, Reader};
use serde::Serialize;

use crate::packet::{decode_packet_at, DecodedPacket};
use crate::registry::{
    FieldSchema, FieldType, FlatLayout, FlatType, MessageSchema, Registry, Strategy,
};
use crate::value::Scalar;
use crate::wire::{
    read_varint, zigzag32, zigzag64, WireError, WireField, WireReader, WireType, WireValue,
};

/// Deepest nesting of messages and embedded packets that is decoded.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Upper bound for a single inflated multiplexed payload.
const MAX_INFLATED_LEN: usize = 64 * 1024 * 1024;

/// Where decoding of one structure stopped early, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Defect {
    /// Byte offset within the body (or within the inflated buffer for
    /// embedded packets).
    pub offset: usize,
    pub kind: DefectKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefectKind {
    /// A declared length or fixed-width value overran the buffer.
    Truncated {
        needed: usize,
        available: usize,
    },
    /// The bytes are not valid for the expected encoding.
    Malformed { reason: String },
    NestingLimit,
    InflateFailed { reason: String },
}

impl Defect {
    fn from_wire(err: WireError, base: usize) -> Self {
        let offset = base + err.offset();
        let kind = match err {
            WireError::EndOfBuffer {
                needed, available, ..
            } => DefectKind::Truncated { needed, available },
            other => DefectKind::Malformed {
                reason: other.to_string(),
            },
        };
        Defect { offset, kind }
    }

    fn from_buffer(err: BufferError, base: usize) -> Self {
        Self::from_wire(err.into(), base)
    }

    pub fn is_truncation(&self) -> bool {
        matches!(self.kind, DefectKind::Truncated { .. })
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DefectKind::Truncated { needed, available } => write!(
                f,
                "truncated at offset {}: needed {needed} bytes, {available} available",
                self.offset
            ),
            DefectKind::Malformed { reason } => {
                write!(f, "malformed at offset {}: {reason}", self.offset)
            }
            DefectKind::NestingLimit => write!(
                f,
                "nesting limit of {MAX_NESTING_DEPTH} reached at offset {}",
                self.offset
            ),
            DefectKind::InflateFailed { reason } => {
                write!(f, "inflate failed at offset {}: {reason}", self.offset)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedField {
    /// Field number, absent for flat layout fields.
    pub number: Option<u32>,
    pub name: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldValue {
    Scalar { value: Scalar },
    Message(DecodedMessage),
    Repeated { items: Vec<FieldValue> },
    Multiplexed(Multiplexed),
    /// Wire value that does not fit the declared schema type.
    Mismatched {
        wire_type: &'static str,
        raw: Scalar,
    },
}

impl FieldValue {
    pub fn scalar(&self) -> Option<&Scalar> {
        match self {
            FieldValue::Scalar { value } => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub type_name: String,
    pub fields: Vec<DecodedField>,
    pub defect: Option<Defect>,
}

impl DecodedMessage {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }
}

/// Packets embedded in a multiplexed field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Multiplexed {
    /// Compressed length when the field was gzip-inflated first.
    pub compressed_len: Option<usize>,
    pub packets: Vec<DecodedPacket>,
    pub defect: Option<Defect>,
    /// Undecodable field bytes, kept when inflating failed.
    pub raw: Option<Vec<u8>>,
}

/// Flat layout decoded into named scalars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpaqueStruct {
    pub layout: String,
    pub fields: Vec<DecodedField>,
    /// Bytes after the fixed fields, with their label. After a truncated
    /// field this holds the partial bytes as `remainder`.
    pub trailing: Option<(String, Vec<u8>)>,
    pub defect: Option<Defect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DecodedBody {
    Structured(DecodedMessage),
    Opaque(OpaqueStruct),
    Unknown { bytes: Vec<u8> },
}

impl DecodedBody {
    /// Defect at the body's own level, if decoding stopped early there.
    pub fn defect(&self) -> Option<&Defect> {
        match self {
            DecodedBody::Structured(m) => m.defect.as_ref(),
            DecodedBody::Opaque(o) => o.defect.as_ref(),
            DecodedBody::Unknown { .. } => None,
        }
    }

    /// Whether the top-level body ran out of bytes.
    pub fn is_truncated(&self) -> bool {
        self.defect().is_some_and(Defect::is_truncation)
    }

    /// Schema or layout name, `None` for unknown bodies.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            DecodedBody::Structured(m) => Some(&m.type_name),
            DecodedBody::Opaque(o) => Some(&o.layout),
            DecodedBody::Unknown { .. } => None,
        }
    }
}

/// Decodes the body of a message of type `emsg`.
pub fn decode_body(emsg: u32, bytes: &[u8], registry: &Registry) -> DecodedBody {
    decode_body_at(emsg, bytes, registry, 0)
}

pub(crate) fn decode_body_at(
    emsg: u32,
    bytes: &[u8],
    registry: &Registry,
    depth: usize,
) -> DecodedBody {
    let decoder = BodyDecoder { registry };
    match registry.strategy(emsg) {
        Strategy::Schema(schema) => {
            tracing::debug!(emsg, schema = %schema.name, depth, "decoding schema body");
            DecodedBody::Structured(decoder.message(schema, bytes, 0, depth))
        }
        Strategy::Flat(layout) => {
            tracing::debug!(emsg, layout = %layout.name, depth, "decoding flat body");
            DecodedBody::Opaque(decode_flat(layout, bytes, registry))
        }
        Strategy::Unrecognized => {
            tracing::debug!(emsg, len = bytes.len(), depth, "unrecognized body");
            DecodedBody::Unknown {
                bytes: bytes.to_vec(),
            }
        }
    }
}

struct BodyDecoder<'r> {
    registry: &'r Registry,
}

impl BodyDecoder<'_> {
    /// Decodes `bytes` as a `schema` message located at `base` in the body.
    fn message(
        &self,
        schema: &MessageSchema,
        bytes: &[u8],
        base: usize,
        depth: usize,
    ) -> DecodedMessage {
        let mut wire = Vec::new();
        let mut defect = None;
        for field in WireReader::new(bytes) {
            match field {
                Ok(field) => wire.push(field),
                Err(err) => defect = Some(Defect::from_wire(err, base)),
            }
        }

        let mut fields = Vec::with_capacity(schema.fields.len());
        for field_schema in &schema.fields {
            let occurrences: Vec<&WireField<'_>> = wire
                .iter()
                .filter(|w| w.number == field_schema.number)
                .collect();
            // Last occurrence wins for singular fields.
            let Some(last) = occurrences.last().copied() else {
                continue;
            };
            let value = if field_schema.repeated {
                let mut items = Vec::new();
                for w in occurrences {
                    self.repeated_items(field_schema, w, base, depth, &mut items);
                }
                FieldValue::Repeated { items }
            } else {
                self.single(schema, field_schema, last, &wire, base, depth)
            };
            fields.push(DecodedField {
                number: Some(field_schema.number),
                name: field_schema.name.clone(),
                value,
            });
        }

        for w in wire.iter().filter(|w| schema.position(w.number).is_none()) {
            fields.push(DecodedField {
                number: Some(w.number),
                name: format!("unknown_{}", w.number),
                value: FieldValue::Scalar {
                    value: Scalar::from_wire(w.value),
                },
            });
        }

        DecodedMessage {
            type_name: schema.name.clone(),
            fields,
            defect,
        }
    }

    fn repeated_items(
        &self,
        field: &FieldSchema,
        w: &WireField<'_>,
        base: usize,
        depth: usize,
        items: &mut Vec<FieldValue>,
    ) {
        match w.value {
            WireValue::Len(bytes) if field.ty.is_packable() => {
                unpack(field, bytes, base + w.value_offset, self.registry, items);
            }
            _ => items.push(self.element(field, w, base, depth)),
        }
    }

    fn single(
        &self,
        schema: &MessageSchema,
        field: &FieldSchema,
        w: &WireField<'_>,
        siblings: &[WireField<'_>],
        base: usize,
        depth: usize,
    ) -> FieldValue {
        if field.ty == FieldType::Multiplexed {
            if let WireValue::Len(bytes) = w.value {
                let compressed_size = field
                    .compressed_size_field
                    .filter(|n| schema.position(*n).is_some())
                    .and_then(|n| siblings.iter().rev().find(|s| s.number == n))
                    .and_then(|s| match s.value {
                        WireValue::Varint(v) => usize::try_from(v).ok(),
                        _ => None,
                    })
                    .filter(|size| *size > 0);
                let offset = base + w.value_offset;
                let multi = self.multiplexed(bytes, compressed_size, offset, depth);
                return FieldValue::Multiplexed(multi);
            }
        }
        self.element(field, w, base, depth)
    }

    /// Converts one wire occurrence of `field`.
    fn element(
        &self,
        field: &FieldSchema,
        w: &WireField<'_>,
        base: usize,
        depth: usize,
    ) -> FieldValue {
        if w.value.wire_type() != field.ty.wire_type() {
            return FieldValue::Mismatched {
                wire_type: w.value.wire_type().as_str(),
                raw: Scalar::from_wire(w.value),
            };
        }
        match (field.ty, w.value) {
            (FieldType::Message, WireValue::Len(bytes)) => {
                let Some(schema) = field
                    .type_ref
                    .as_deref()
                    .and_then(|name| self.registry.message(name))
                else {
                    return FieldValue::Scalar {
                        value: Scalar::Bytes(bytes.to_vec()),
                    };
                };
                let start = base + w.value_offset;
                if depth + 1 >= MAX_NESTING_DEPTH {
                    return FieldValue::Message(DecodedMessage {
                        type_name: schema.name.clone(),
                        fields: Vec::new(),
                        defect: Some(Defect {
                            offset: start,
                            kind: DefectKind::NestingLimit,
                        }),
                    });
                }
                FieldValue::Message(self.message(schema, bytes, start, depth + 1))
            }
            (FieldType::Multiplexed, WireValue::Len(bytes)) => {
                FieldValue::Multiplexed(self.multiplexed(bytes, None, base + w.value_offset, depth))
            }
            (ty, value) => FieldValue::Scalar {
                value: scalar(ty, field.type_ref.as_deref(), value, self.registry),
            },
        }
    }

    fn multiplexed(
        &self,
        bytes: &[u8],
        compressed_size: Option<usize>,
        base: usize,
        depth: usize,
    ) -> Multiplexed {
        let mut out = Multiplexed {
            compressed_len: None,
            packets: Vec::new(),
            defect: None,
            raw: None,
        };
        if depth + 1 >= MAX_NESTING_DEPTH {
            out.defect = Some(Defect {
                offset: base,
                kind: DefectKind::NestingLimit,
            });
            return out;
        }

        let (data, base) = match compressed_size {
            Some(size) => match inflate(bytes, size) {
                Ok(data) => {
                    out.compressed_len = Some(bytes.len());
                    (Cow::Owned(data), 0)
                }
                Err(reason) => {
                    tracing::warn!(offset = base, %reason, "cannot inflate multiplexed payload");
                    out.defect = Some(Defect {
                        offset: base,
                        kind: DefectKind::InflateFailed { reason },
                    });
                    out.raw = Some(bytes.to_vec());
                    return out;
                }
            },
            None => (Cow::Borrowed(bytes), base),
        };

        let mut r = Reader::new(&data);
        while !r.is_empty() {
            let item = r.u32().and_then(|len| r.buf(len as usize));
            match item {
                Ok(packet) => {
                    let packet = decode_packet_at(packet, self.registry, depth + 1);
                    out.packets.push(packet);
                }
                Err(err) => {
                    out.defect = Some(Defect::from_buffer(err, base));
                    break;
                }
            }
        }
        out
    }
}

fn unpack(
    field: &FieldSchema,
    bytes: &[u8],
    base: usize,
    registry: &Registry,
    items: &mut Vec<FieldValue>,
) {
    let mut r = Reader::new(bytes);
    while !r.is_empty() {
        let start = r.x;
        let value: Result<WireValue<'_>, WireError> = match field.ty.wire_type() {
            WireType::Varint => read_varint(&mut r).map(WireValue::Varint),
            WireType::Fixed64 => r.u64().map(WireValue::Fixed64).map_err(Into::into),
            WireType::Fixed32 => r.u32().map(WireValue::Fixed32).map_err(Into::into),
            WireType::Len => break,
        };
        match value {
            Ok(value) => items.push(FieldValue::Scalar {
                value: scalar(field.ty, field.type_ref.as_deref(), value, registry),
            }),
            Err(err) => {
                let offset = base + start;
                tracing::debug!(field = %field.name, offset, %err, "bad packed element");
                items.push(FieldValue::Mismatched {
                    wire_type: "len",
                    raw: Scalar::Bytes(bytes[start..].to_vec()),
                });
                break;
            }
        }
    }
}

fn scalar(
    ty: FieldType,
    type_ref: Option<&str>,
    value: WireValue<'_>,
    registry: &Registry,
) -> Scalar {
    match (ty, value) {
        (FieldType::Int32, WireValue::Varint(v)) => Scalar::Int(i64::from(v as i32)),
        (FieldType::Int64, WireValue::Varint(v)) => Scalar::Int(v as i64),
        (FieldType::Uint32, WireValue::Varint(v)) => Scalar::UInt(u64::from(v as u32)),
        (FieldType::Uint64, WireValue::Varint(v)) => Scalar::UInt(v),
        (FieldType::Sint32, WireValue::Varint(v)) => Scalar::Int(i64::from(zigzag32(v))),
        (FieldType::Sint64, WireValue::Varint(v)) => Scalar::Int(zigzag64(v)),
        (FieldType::Bool, WireValue::Varint(v)) => Scalar::Bool(v != 0),
        (FieldType::Enum, WireValue::Varint(v)) => {
            let value = i64::from(v as i32);
            Scalar::Enum {
                value,
                name: registry.enum_name(type_ref, value),
            }
        }
        (FieldType::Fixed64, WireValue::Fixed64(v)) => Scalar::UInt(v),
        (FieldType::Sfixed64, WireValue::Fixed64(v)) => Scalar::Int(v as i64),
        (FieldType::Double, WireValue::Fixed64(v)) => Scalar::Float(f64::from_bits(v)),
        (FieldType::Fixed32, WireValue::Fixed32(v)) => Scalar::UInt(u64::from(v)),
        (FieldType::Sfixed32, WireValue::Fixed32(v)) => Scalar::Int(i64::from(v as i32)),
        (FieldType::Float, WireValue::Fixed32(v)) => Scalar::Float(f64::from(f32::from_bits(v))),
        (FieldType::String, WireValue::Len(bytes)) => match std::str::from_utf8(bytes) {
            Ok(s) => Scalar::Str(s.to_owned()),
            Err(_) => Scalar::Bytes(bytes.to_vec()),
        },
        (_, value) => Scalar::from_wire(value),
    }
}

fn inflate(bytes: &[u8], size: usize) -> Result<Vec<u8>, String> {
    if size > MAX_INFLATED_LEN {
        return Err(format!(
            "declared size {size} exceeds limit of {MAX_INFLATED_LEN} bytes"
        ));
    }
    let mut out = Vec::with_capacity(size);
    GzDecoder::new(bytes)
        .take(size as u64)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() != size {
        tracing::debug!(
            declared = size,
            actual = out.len(),
            "inflated size differs from declared size"
        );
    }
    Ok(out)
}

pub(crate) fn decode_flat(layout: &FlatLayout, bytes: &[u8], registry: &Registry) -> OpaqueStruct {
    let mut r = Reader::new(bytes);
    let mut fields = Vec::with_capacity(layout.fields.len());
    let mut defect = None;
    for field in &layout.fields {
        match flat_value(&mut r, field.ty) {
            Ok(value) => {
                let value = match (value, &field.type_ref) {
                    (Scalar::UInt(v), Some(_)) => {
                        let v = v as i64;
                        Scalar::Enum {
                            value: v,
                            name: registry.enum_name(field.type_ref.as_deref(), v),
                        }
                    }
                    (Scalar::Int(v), Some(_)) => Scalar::Enum {
                        value: v,
                        name: registry.enum_name(field.type_ref.as_deref(), v),
                    },
                    (value, _) => value,
                };
                fields.push(DecodedField {
                    number: None,
                    name: field.name.clone(),
                    value: FieldValue::Scalar { value },
                });
            }
            Err(err) => {
                defect = Some(Defect::from_buffer(err, 0));
                break;
            }
        }
    }

    let rest = r.rest();
    let label = match (&layout.trailing, &defect) {
        (_, Some(_)) if !rest.is_empty() => Some("remainder"),
        (Some(label), None) => Some(label.as_str()),
        (None, None) if !rest.is_empty() => Some("trailing"),
        _ => None,
    };
    let trailing = label.map(|label| (label.to_string(), rest.to_vec()));

    OpaqueStruct {
        layout: layout.name.clone(),
        fields,
        trailing,
        defect,
    }
}

fn flat_value(r: &mut Reader<'_>, ty: FlatType) -> Result<Scalar, BufferError> {
    Ok(match ty {
        FlatType::U8 => Scalar::UInt(u64::from(r.u8()?)),
        FlatType::U16 => Scalar::UInt(u64::from(r.u16()?)),
        FlatType::U32 => Scalar::UInt(u64::from(r.u32()?)),
        FlatType::U64 => Scalar::UInt(r.u64()?),
        FlatType::I8 => Scalar::Int(i64::from(r.i8()?)),
        FlatType::I16 => Scalar::Int(i64::from(r.i16()?)),
        FlatType::I32 => Scalar::Int(i64::from(r.i32()?)),
        FlatType::I64 => Scalar::Int(r.i64()?),
        FlatType::F32 => Scalar::Float(f64::from(r.f32()?)),
        FlatType::F64 => Scalar::Float(r.f64()?),
        FlatType::Bool => Scalar::Bool(r.u8()? != 0),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use indexmap::IndexMap;
    use nethook_buffers::Writer;

    use super::*;
    use crate::emsg::PROTO_MASK;
    use crate::registry::{BodyBinding, EmsgEntry, EnumDef, FlatField};

    fn key(w: &mut Writer, number: u32, wire_type: u8) {
        w.varint(u64::from((number << 3) | u32::from(wire_type)));
    }

    fn len_field(w: &mut Writer, number: u32, bytes: &[u8]) {
        key(w, number, 2);
        w.varint(bytes.len() as u64);
        w.buf(bytes);
    }

    fn registry() -> Registry {
        let mut reg = Registry::new("test");
        reg.insert_enum(EnumDef::new(
            "EResult",
            IndexMap::from([("OK".to_string(), 1), ("Fail".to_string(), 2)]),
        ))
        .unwrap();
        reg.insert_message(MessageSchema::new(
            "CMsgSample",
            vec![
                FieldSchema::new(1, "id", FieldType::Uint32),
                FieldSchema::new(2, "name", FieldType::String),
                FieldSchema::new(3, "codes", FieldType::Sint32).repeated(),
                FieldSchema::new(4, "result", FieldType::Enum).with_ref("EResult"),
                FieldSchema::new(5, "steam_id", FieldType::Fixed64),
            ],
        ))
        .unwrap();
        reg.insert_message(MessageSchema::new(
            "CMsgNode",
            vec![
                FieldSchema::new(1, "value", FieldType::Uint32),
                FieldSchema::new(2, "child", FieldType::Message).with_ref("CMsgNode"),
            ],
        ))
        .unwrap();
        reg.insert_message(MessageSchema::new(
            "CMsgMulti",
            vec![
                FieldSchema::new(1, "size_unzipped", FieldType::Uint32),
                FieldSchema::new(2, "message_body", FieldType::Multiplexed).compressed_by(1),
            ],
        ))
        .unwrap();
        reg.insert_layout(
            FlatLayout::new(
                "MsgResult",
                vec![
                    FlatField::new("protocol", FlatType::U32),
                    FlatField::new("result", FlatType::U32).with_ref("EResult"),
                ],
            )
            .with_trailing("challenge"),
        )
        .unwrap();
        for (id, name, body) in [
            (1, "Multi", BodyBinding::Message("CMsgMulti".into())),
            (10, "Sample", BodyBinding::Message("CMsgSample".into())),
            (11, "Node", BodyBinding::Message("CMsgNode".into())),
            (12, "Result", BodyBinding::Layout("MsgResult".into())),
        ] {
            reg.insert_emsg(EmsgEntry::new(id, name, body)).unwrap();
        }
        reg.validate().unwrap();
        reg
    }

    fn structured(body: DecodedBody) -> DecodedMessage {
        match body {
            DecodedBody::Structured(m) => m,
            other => panic!("expected structured body, got {other:?}"),
        }
    }

    fn names(m: &DecodedMessage) -> Vec<&str> {
        m.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn fields_come_out_in_schema_order() {
        let mut w = Writer::new();
        key(&mut w, 5, 1);
        w.u64(76561197960287930);
        len_field(&mut w, 2, b"first");
        key(&mut w, 1, 0);
        w.varint(300);
        len_field(&mut w, 2, b"second");
        key(&mut w, 4, 0);
        w.varint(2);

        let m = structured(decode_body(10, &w.flush(), &registry()));
        assert_eq!(names(&m), ["id", "name", "result", "steam_id"]);
        assert!(m.defect.is_none());
        assert_eq!(
            m.get("id").and_then(FieldValue::scalar),
            Some(&Scalar::UInt(300))
        );
        assert_eq!(
            m.get("name").and_then(FieldValue::scalar),
            Some(&Scalar::Str("second".into()))
        );
        assert_eq!(
            m.get("result").and_then(FieldValue::scalar),
            Some(&Scalar::Enum {
                value: 2,
                name: Some("Fail".into())
            })
        );
    }

    #[test]
    fn repeated_accepts_packed_and_unpacked() {
        let mut packed = Writer::new();
        packed.varint(1); // -1
        packed.varint(4); // 2
        let packed = packed.flush();

        let mut w = Writer::new();
        key(&mut w, 3, 0);
        w.varint(5); // -3
        len_field(&mut w, 3, &packed);

        let m = structured(decode_body(10, &w.flush(), &registry()));
        let Some(FieldValue::Repeated { items }) = m.get("codes") else {
            panic!("codes missing: {m:?}");
        };
        let values: Vec<_> = items
            .iter()
            .filter_map(FieldValue::scalar)
            .cloned()
            .collect();
        assert_eq!(values, [Scalar::Int(-3), Scalar::Int(-1), Scalar::Int(2)]);
    }

    #[test]
    fn unknown_fields_follow_schema_fields() {
        let mut w = Writer::new();
        key(&mut w, 99, 0);
        w.varint(7);
        key(&mut w, 1, 0);
        w.varint(1);

        let m = structured(decode_body(10, &w.flush(), &registry()));
        assert_eq!(names(&m), ["id", "unknown_99"]);
        assert_eq!(m.fields[1].number, Some(99));
    }

    #[test]
    fn wire_type_mismatch_keeps_raw_value() {
        let mut w = Writer::new();
        len_field(&mut w, 1, b"oops");

        let m = structured(decode_body(10, &w.flush(), &registry()));
        assert_eq!(
            m.get("id"),
            Some(&FieldValue::Mismatched {
                wire_type: "len",
                raw: Scalar::Bytes(b"oops".to_vec()),
            })
        );
    }

    #[test]
    fn truncation_keeps_decoded_prefix() {
        let mut w = Writer::new();
        key(&mut w, 1, 0);
        w.varint(42);
        key(&mut w, 2, 2);
        w.varint(20);
        w.utf8("short");
        let body = decode_body(10, &w.flush(), &registry());

        assert!(body.is_truncated());
        let m = structured(body);
        assert_eq!(names(&m), ["id"]);
        assert_eq!(m.defect.as_ref().map(|d| d.offset), Some(4));
    }

    #[test]
    fn flat_layout_with_trailing_bytes() {
        let mut w = Writer::new();
        w.u32(1);
        w.u32(1);
        w.buf(&[9, 9, 9]);
        let body = decode_body(12, &w.flush(), &registry());
        let DecodedBody::Opaque(opaque) = body else {
            panic!("expected opaque body");
        };
        assert_eq!(opaque.fields.len(), 2);
        assert_eq!(
            opaque.fields[1].value.scalar(),
            Some(&Scalar::Enum {
                value: 1,
                name: Some("OK".into())
            })
        );
        assert_eq!(opaque.trailing, Some(("challenge".into(), vec![9, 9, 9])));
        assert!(opaque.defect.is_none());
    }

    #[test]
    fn flat_layout_truncated() {
        let body = decode_body(12, &[1, 0, 0, 0, 1], &registry());
        let DecodedBody::Opaque(opaque) = &body else {
            panic!("expected opaque body");
        };
        assert_eq!(opaque.fields.len(), 1);
        assert!(body.is_truncated());
        assert_eq!(opaque.trailing, Some(("remainder".into(), vec![1])));
    }

    #[test]
    fn unregistered_type_keeps_bytes() {
        let body = decode_body(9999, &[1, 2, 3], &registry());
        assert!(matches!(&body, DecodedBody::Unknown { bytes } if bytes == &[1, 2, 3]));
        assert_eq!(body.type_name(), None);
    }

    fn embedded_sample(id: u64) -> Vec<u8> {
        let mut body = Writer::new();
        key(&mut body, 1, 0);
        body.varint(id);
        let body = body.flush();

        let mut w = Writer::new();
        w.u32(PROTO_MASK | 10);
        w.u32(0);
        w.buf(&body);
        w.flush()
    }

    fn multi_payload(packets: &[Vec<u8>]) -> Vec<u8> {
        let mut w = Writer::new();
        for packet in packets {
            w.u32(packet.len() as u32);
            w.buf(packet);
        }
        w.flush()
    }

    fn embedded_ids(body: DecodedBody) -> Vec<Option<Scalar>> {
        let m = structured(body);
        let Some(FieldValue::Multiplexed(multi)) = m.get("message_body") else {
            panic!("message_body missing: {m:?}");
        };
        assert!(multi.defect.is_none(), "{:?}", multi.defect);
        multi
            .packets
            .iter()
            .map(|p| match &p.body {
                Some(DecodedBody::Structured(inner)) => {
                    inner.get("id").and_then(FieldValue::scalar).cloned()
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn multiplexed_packets_decode_recursively() {
        let inner = multi_payload(&[embedded_sample(1), embedded_sample(2)]);
        let mut w = Writer::new();
        len_field(&mut w, 2, &inner);

        let ids = embedded_ids(decode_body(1, &w.flush(), &registry()));
        assert_eq!(ids, [Some(Scalar::UInt(1)), Some(Scalar::UInt(2))]);
    }

    #[test]
    fn compressed_multiplexed_is_inflated() {
        let inner = multi_payload(&[embedded_sample(7)]);
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&inner).unwrap();
        let compressed = gz.finish().unwrap();

        let mut w = Writer::new();
        key(&mut w, 1, 0);
        w.varint(inner.len() as u64);
        len_field(&mut w, 2, &compressed);

        let ids = embedded_ids(decode_body(1, &w.flush(), &registry()));
        assert_eq!(ids, [Some(Scalar::UInt(7))]);
    }

    #[test]
    fn inflate_failure_is_a_marker() {
        let mut w = Writer::new();
        key(&mut w, 1, 0);
        w.varint(100);
        len_field(&mut w, 2, b"not gzip");

        let m = structured(decode_body(1, &w.flush(), &registry()));
        let Some(FieldValue::Multiplexed(multi)) = m.get("message_body") else {
            panic!("message_body missing");
        };
        assert!(matches!(
            multi.defect,
            Some(Defect {
                kind: DefectKind::InflateFailed { .. },
                ..
            })
        ));
        assert_eq!(multi.raw.as_deref(), Some(&b"not gzip"[..]));
        assert!(multi.packets.is_empty());
    }

    #[test]
    fn deep_nesting_stops_at_limit() {
        let mut bytes = Vec::new();
        for _ in 0..(MAX_NESTING_DEPTH * 2) {
            let mut w = Writer::new();
            key(&mut w, 1, 0);
            w.varint(1);
            len_field(&mut w, 2, &bytes);
            bytes = w.flush();
        }

        let mut m = structured(decode_body(11, &bytes, &registry()));
        let mut levels = 1;
        loop {
            match m.fields.iter().find(|f| f.name == "child") {
                Some(DecodedField {
                    value: FieldValue::Message(child),
                    ..
                }) => {
                    m = child.clone();
                    levels += 1;
                }
                _ => break,
            }
        }
        assert_eq!(levels, MAX_NESTING_DEPTH + 1);
        assert!(matches!(
            m.defect,
            Some(Defect {
                kind: DefectKind::NestingLimit,
                ..
            })
        ));
    }
}
