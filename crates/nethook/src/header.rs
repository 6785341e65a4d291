//! Packet header decoding.
//!
//! Three envelope shapes exist, selected by the protobuf mask on the raw
//! type and, for unmasked types, by the message type itself:
//!
//! | shape    | layout                                                           | bytes |
//! |----------|------------------------------------------------------------------|-------|
//! | simple   | type, target job, source job                                     | 20    |
//! | extended | type, size, version, target job, source job, canary, steam id, session | 36 |
//! | protobuf | masked type, header length, protobuf header message              | 8 + n |

use nethook_buffers::Reader;
use serde::Serialize;

use crate::emsg::{self, JOB_ID_NONE};
use crate::error::HeaderError;
use crate::value::Scalar;
use crate::wire::{WireReader, WireValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRole {
    Target,
    Source,
}

impl JobRole {
    pub fn label(self) -> &'static str {
        match self {
            JobRole::Target => "target_job_id",
            JobRole::Source => "source_job_id",
        }
    }
}

/// A present job id linking a request to its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Correlation {
    pub role: JobRole,
    pub job_id: u64,
}

/// Fields of the protobuf-framed header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProtoHeader {
    pub steam_id: Option<u64>,
    pub client_session_id: Option<i32>,
    pub routing_app_id: Option<u32>,
    pub target_job_name: Option<String>,
    pub eresult: Option<i32>,
    pub error_message: Option<String>,
    /// Header fields this decoder does not name, in wire order.
    pub unknown: Vec<(u32, Scalar)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum HeaderKind {
    Simple,
    Extended {
        header_size: u8,
        header_version: u16,
        canary: u8,
        steam_id: u64,
        session_id: i32,
    },
    Protobuf(ProtoHeader),
}

impl HeaderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderKind::Simple => "simple",
            HeaderKind::Extended { .. } => "extended",
            HeaderKind::Protobuf(_) => "protobuf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedHeader {
    /// Type as read, including the protobuf mask.
    pub raw_type: u32,
    /// Discriminator with the mask cleared. Authoritative over the filename.
    pub message_type: u32,
    pub correlation_ids: Vec<Correlation>,
    /// Exact number of payload bytes the header occupies.
    pub header_byte_length: usize,
    pub kind: HeaderKind,
}

impl DecodedHeader {
    pub fn is_proto(&self) -> bool {
        emsg::is_proto(self.raw_type)
    }

    pub fn job(&self, role: JobRole) -> Option<u64> {
        self.correlation_ids
            .iter()
            .find(|c| c.role == role)
            .map(|c| c.job_id)
    }
}

fn correlations(target: Option<u64>, source: Option<u64>) -> Vec<Correlation> {
    [(JobRole::Target, target), (JobRole::Source, source)]
        .into_iter()
        .filter_map(|(role, id)| {
            id.filter(|id| *id != JOB_ID_NONE)
                .map(|job_id| Correlation { role, job_id })
        })
        .collect()
}

/// Decodes the header at the front of `payload`.
pub fn decode_header(payload: &[u8]) -> Result<DecodedHeader, HeaderError> {
    let mut r = Reader::new(payload);
    let raw_type = r.u32()?;
    let message_type = emsg::strip_proto_mask(raw_type);

    let (kind, target, source) = if emsg::is_proto(raw_type) {
        let header_length = r.u32()? as usize;
        let block_start = r.x;
        let block = r.buf(header_length)?;
        let (proto, target, source) =
            decode_proto_header(block).map_err(|e| HeaderError::from(e.shifted(block_start)))?;
        (HeaderKind::Protobuf(proto), target, source)
    } else if emsg::uses_simple_header(message_type) {
        let target = r.u64()?;
        let source = r.u64()?;
        (HeaderKind::Simple, Some(target), Some(source))
    } else {
        let header_size = r.u8()?;
        let header_version = r.u16()?;
        let target = r.u64()?;
        let source = r.u64()?;
        let canary = r.u8()?;
        let steam_id = r.u64()?;
        let session_id = r.i32()?;
        if usize::from(header_size) != emsg::EXTENDED_HEADER_SIZE
            || canary != emsg::EXTENDED_HEADER_CANARY
        {
            tracing::debug!(
                header_size,
                canary,
                message_type,
                "unexpected extended header markers"
            );
        }
        let kind = HeaderKind::Extended {
            header_size,
            header_version,
            canary,
            steam_id,
            session_id,
        };
        (kind, Some(target), Some(source))
    };

    Ok(DecodedHeader {
        raw_type,
        message_type,
        correlation_ids: correlations(target, source),
        header_byte_length: r.x,
        kind,
    })
}

type ProtoParts = (ProtoHeader, Option<u64>, Option<u64>);

fn decode_proto_header(block: &[u8]) -> Result<ProtoParts, crate::wire::WireError> {
    let mut header = ProtoHeader::default();
    let mut target = None;
    let mut source = None;
    for field in WireReader::new(block) {
        let field = field?;
        match (field.number, field.value) {
            (1, WireValue::Fixed64(v)) => header.steam_id = Some(v),
            (2, WireValue::Varint(v)) => header.client_session_id = Some(v as i32),
            (3, WireValue::Varint(v)) => header.routing_app_id = Some(v as u32),
            (10, WireValue::Fixed64(v)) => source = Some(v),
            (11, WireValue::Fixed64(v)) => target = Some(v),
            (12, WireValue::Len(bytes)) => match std::str::from_utf8(bytes) {
                Ok(s) => header.target_job_name = Some(s.to_owned()),
                Err(_) => header.unknown.push((12, Scalar::Bytes(bytes.to_vec()))),
            },
            (13, WireValue::Varint(v)) => header.eresult = Some(v as i32),
            (14, WireValue::Len(bytes)) => match std::str::from_utf8(bytes) {
                Ok(s) => header.error_message = Some(s.to_owned()),
                Err(_) => header.unknown.push((14, Scalar::Bytes(bytes.to_vec()))),
            },
            (number, value) => header.unknown.push((number, Scalar::from_wire(value))),
        }
    }
    Ok((header, target, source))
}
