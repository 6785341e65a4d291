//! Message-type discriminator constants.

/// Bit set on the raw wire type when the header is protobuf-framed.
pub const PROTO_MASK: u32 = 0x8000_0000;

/// Job id value meaning "no job".
pub const JOB_ID_NONE: u64 = u64::MAX;

/// Canary byte expected in an extended header.
pub const EXTENDED_HEADER_CANARY: u8 = 239;

/// Size of an extended header, also written into its `header_size` byte.
pub const EXTENDED_HEADER_SIZE: usize = 36;

/// Size of a simple (channel handshake) header.
pub const SIMPLE_HEADER_SIZE: usize = 20;

pub const MULTI: u32 = 1;
pub const CHANNEL_ENCRYPT_REQUEST: u32 = 1303;
pub const CHANNEL_ENCRYPT_RESPONSE: u32 = 1304;
pub const CHANNEL_ENCRYPT_RESULT: u32 = 1305;

/// Clears the protobuf mask.
#[inline]
pub fn strip_proto_mask(raw: u32) -> u32 {
    raw & !PROTO_MASK
}

#[inline]
pub fn is_proto(raw: u32) -> bool {
    raw & PROTO_MASK != 0
}

/// Message types framed with the 20-byte simple header.
pub fn uses_simple_header(emsg: u32) -> bool {
    matches!(
        emsg,
        CHANNEL_ENCRYPT_REQUEST | CHANNEL_ENCRYPT_RESPONSE | CHANNEL_ENCRYPT_RESULT
    )
}
