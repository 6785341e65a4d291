//! Full-packet decoding: header, then the body selected by the header's
//! message type.

use serde::{Serialize, Serializer};

use crate::body::{decode_body_at, DecodedBody};
use crate::error::HeaderError;
use crate::header::{decode_header, DecodedHeader};
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedPacket {
    /// Registry name of the wire message type.
    pub message_name: Option<String>,
    #[serde(serialize_with = "serialize_header")]
    pub header: Result<DecodedHeader, HeaderError>,
    /// Not attempted when the header failed.
    pub body: Option<DecodedBody>,
}

impl DecodedPacket {
    pub fn message_type(&self) -> Option<u32> {
        self.header.as_ref().ok().map(|h| h.message_type)
    }
}

pub fn decode_packet(bytes: &[u8], registry: &Registry) -> DecodedPacket {
    decode_packet_at(bytes, registry, 0)
}

pub(crate) fn decode_packet_at(bytes: &[u8], registry: &Registry, depth: usize) -> DecodedPacket {
    match decode_header(bytes) {
        Ok(header) => {
            let body_bytes = &bytes[header.header_byte_length..];
            let body = decode_body_at(header.message_type, body_bytes, registry, depth);
            DecodedPacket {
                message_name: registry.emsg_name(header.message_type).map(str::to_owned),
                header: Ok(header),
                body: Some(body),
            }
        }
        Err(err) => {
            tracing::debug!(len = bytes.len(), %err, "header decode failed");
            DecodedPacket {
                message_name: None,
                header: Err(err),
                body: None,
            }
        }
    }
}

fn serialize_header<S: Serializer>(
    header: &Result<DecodedHeader, HeaderError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    #[serde(untagged)]
    enum Repr<'a> {
        Decoded(&'a DecodedHeader),
        Failed { error: String },
    }
    match header {
        Ok(header) => Repr::Decoded(header),
        Err(err) => Repr::Failed {
            error: err.to_string(),
        },
    }
    .serialize(serializer)
}
