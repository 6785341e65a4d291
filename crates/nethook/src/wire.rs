//! Protobuf wire-format reader.
//!
//! Bodies and protobuf headers are plain protobuf messages. This module only
//! splits bytes into `(field number, wire value)` pairs; interpreting them
//! against a schema happens in [`crate::body`].

use nethook_buffers::{BufferError, Reader};
use thiserror::Error;

/// Longest legal varint encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("end of buffer at offset {offset}: needed {needed} bytes, {available} available")]
    EndOfBuffer {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("varint at offset {offset} exceeds 64 bits")]
    VarintOverflow { offset: usize },
    #[error("invalid wire type {wire_type} at offset {offset}")]
    InvalidWireType { offset: usize, wire_type: u8 },
    #[error("group wire type for field {number} at offset {offset} is not supported")]
    Group { offset: usize, number: u32 },
    #[error("invalid field number at offset {offset}")]
    InvalidFieldNumber { offset: usize },
    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },
}

impl WireError {
    /// Offset (relative to the decoded slice) where decoding stopped.
    pub fn offset(&self) -> usize {
        match self {
            WireError::EndOfBuffer { offset, .. }
            | WireError::VarintOverflow { offset }
            | WireError::InvalidWireType { offset, .. }
            | WireError::Group { offset, .. }
            | WireError::InvalidFieldNumber { offset }
            | WireError::InvalidUtf8 { offset } => *offset,
        }
    }

    /// Same error with its offset moved by `by`, for slices decoded at a
    /// known position inside a larger buffer.
    pub fn shifted(self, by: usize) -> Self {
        match self {
            WireError::EndOfBuffer {
                offset,
                needed,
                available,
            } => WireError::EndOfBuffer {
                offset: offset + by,
                needed,
                available,
            },
            WireError::VarintOverflow { offset } => WireError::VarintOverflow {
                offset: offset + by,
            },
            WireError::InvalidWireType { offset, wire_type } => WireError::InvalidWireType {
                offset: offset + by,
                wire_type,
            },
            WireError::Group { offset, number } => WireError::Group {
                offset: offset + by,
                number,
            },
            WireError::InvalidFieldNumber { offset } => WireError::InvalidFieldNumber {
                offset: offset + by,
            },
            WireError::InvalidUtf8 { offset } => WireError::InvalidUtf8 {
                offset: offset + by,
            },
        }
    }

    /// Whether the input simply ran out, as opposed to containing bad bytes.
    pub fn is_truncation(&self) -> bool {
        matches!(self, WireError::EndOfBuffer { .. })
    }
}

impl From<BufferError> for WireError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::EndOfBuffer {
                offset,
                needed,
                available,
            } => WireError::EndOfBuffer {
                offset,
                needed,
                available,
            },
            BufferError::InvalidUtf8 { offset } => WireError::InvalidUtf8 { offset },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    Len,
    Fixed32,
}

impl WireType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Varint => "varint",
            Self::Fixed64 => "fixed64",
            Self::Len => "len",
            Self::Fixed32 => "fixed32",
        }
    }
}

/// One raw value as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Len(&'a [u8]),
    Fixed32(u32),
}

impl WireValue<'_> {
    pub fn wire_type(&self) -> WireType {
        match self {
            WireValue::Varint(_) => WireType::Varint,
            WireValue::Fixed64(_) => WireType::Fixed64,
            WireValue::Len(_) => WireType::Len,
            WireValue::Fixed32(_) => WireType::Fixed32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireField<'a> {
    pub number: u32,
    pub value: WireValue<'a>,
    /// Offset of the field's tag within the decoded slice.
    pub offset: usize,
    /// Offset of the value's first byte, after any length prefix.
    pub value_offset: usize,
}

/// Iterates the fields of one protobuf message.
///
/// Yields `Err` at most once; the iterator is fused after an error.
pub struct WireReader<'a> {
    reader: Reader<'a>,
    failed: bool,
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: Reader::new(bytes),
            failed: false,
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.reader.x
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    fn field(&mut self) -> Result<WireField<'a>, WireError> {
        let offset = self.reader.x;
        let tag = read_varint(&mut self.reader)?;
        let number = u32::try_from(tag >> 3)
            .ok()
            .filter(|n| *n != 0)
            .ok_or(WireError::InvalidFieldNumber { offset })?;
        let mut value_offset = self.reader.x;
        let value = match (tag & 0x07) as u8 {
            0 => WireValue::Varint(read_varint(&mut self.reader)?),
            1 => WireValue::Fixed64(self.reader.u64()?),
            2 => {
                let len_offset = self.reader.x;
                let len = read_varint(&mut self.reader)?;
                let len = usize::try_from(len).map_err(|_| WireError::EndOfBuffer {
                    offset: len_offset,
                    needed: usize::MAX,
                    available: self.reader.size(),
                })?;
                value_offset = self.reader.x;
                WireValue::Len(self.reader.buf(len)?)
            }
            5 => WireValue::Fixed32(self.reader.u32()?),
            3 | 4 => return Err(WireError::Group { offset, number }),
            wire_type => return Err(WireError::InvalidWireType { offset, wire_type }),
        };
        Ok(WireField {
            number,
            value,
            offset,
            value_offset,
        })
    }
}

impl<'a> Iterator for WireReader<'a> {
    type Item = Result<WireField<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_empty() {
            return None;
        }
        let start = self.reader.x;
        match self.field() {
            Ok(field) => Some(Ok(field)),
            Err(err) => {
                self.failed = true;
                self.reader.x = start;
                Some(Err(err))
            }
        }
    }
}

/// Reads a base-128 varint.
pub fn read_varint(reader: &mut Reader<'_>) -> Result<u64, WireError> {
    let start = reader.x;
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let byte = match reader.u8() {
            Ok(byte) => byte,
            Err(err) => {
                reader.x = start;
                return Err(err.into());
            }
        };
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            reader.x = start;
            return Err(WireError::VarintOverflow { offset: start });
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    reader.x = start;
    Err(WireError::VarintOverflow { offset: start })
}

#[inline]
pub fn zigzag32(n: u64) -> i32 {
    let n = n as u32;
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

#[inline]
pub fn zigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nethook_buffers::Writer;

    #[test]
    fn reads_each_wire_type() {
        let mut w = Writer::new();
        w.varint(1 << 3);
        w.varint(150);
        w.varint((2 << 3) | 1);
        w.u64(u64::MAX);
        w.varint((3 << 3) | 2);
        w.varint(3);
        w.utf8("abc");
        w.varint((4 << 3) | 5);
        w.u32(7);
        let data = w.flush();

        let fields: Vec<_> = WireReader::new(&data).collect::<Result<_, _>>().unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].value, WireValue::Varint(150));
        assert_eq!(fields[1].value, WireValue::Fixed64(u64::MAX));
        assert_eq!(fields[2].value, WireValue::Len(b"abc"));
        assert_eq!(fields[2].value_offset, fields[2].offset + 2);
        assert_eq!(fields[3].value, WireValue::Fixed32(7));
        assert_eq!(fields[3].number, 4);
    }

    #[test]
    fn overrunning_length_is_truncation() {
        let mut w = Writer::new();
        w.varint((1 << 3) | 2);
        w.varint(10);
        w.buf(&[1, 2, 3]);
        let data = w.flush();

        let mut reader = WireReader::new(&data);
        let err = reader.next().unwrap().unwrap_err();
        assert!(err.is_truncation());
        assert_eq!(
            err,
            WireError::EndOfBuffer {
                offset: 2,
                needed: 10,
                available: 3,
            }
        );
        assert!(reader.next().is_none());
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn rejects_long_varint() {
        let data = [0xffu8; 11];
        let mut reader = Reader::new(&data);
        assert_eq!(
            read_varint(&mut reader),
            Err(WireError::VarintOverflow { offset: 0 })
        );
    }

    #[test]
    fn rejects_groups_and_bad_wire_types() {
        let data = [(1 << 3) | 3];
        let err = WireReader::new(&data).next().unwrap().unwrap_err();
        assert!(matches!(err, WireError::Group { number: 1, .. }));

        let data = [(1 << 3) | 6];
        let err = WireReader::new(&data).next().unwrap().unwrap_err();
        assert_eq!(
            err,
            WireError::InvalidWireType {
                offset: 0,
                wire_type: 6,
            }
        );
    }

    #[test]
    fn zigzag_decoding() {
        assert_eq!(zigzag32(0), 0);
        assert_eq!(zigzag32(1), -1);
        assert_eq!(zigzag32(2), 1);
        assert_eq!(zigzag64(3), -2);
        assert_eq!(zigzag64(u64::MAX), i64::MIN);
    }
}
