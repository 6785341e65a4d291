//! Fixture builders shared by the integration matrices.
#![allow(dead_code)]

use std::path::Path;

use nethook_analyzer::emsg::{JOB_ID_NONE, PROTO_MASK};
use nethook_buffers::Writer;

/// Minimal protobuf encoder for fixtures.
#[derive(Default)]
pub struct Proto(Writer);

impl Proto {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(&mut self, number: u32, wire_type: u8) {
        self.0.varint(u64::from((number << 3) | u32::from(wire_type)));
    }

    pub fn varint(mut self, number: u32, value: u64) -> Self {
        self.key(number, 0);
        self.0.varint(value);
        self
    }

    pub fn fixed64(mut self, number: u32, value: u64) -> Self {
        self.key(number, 1);
        self.0.u64(value);
        self
    }

    pub fn fixed32(mut self, number: u32, value: u32) -> Self {
        self.key(number, 5);
        self.0.u32(value);
        self
    }

    pub fn bytes(mut self, number: u32, value: &[u8]) -> Self {
        self.key(number, 2);
        self.0.varint(value.len() as u64);
        self.0.buf(value);
        self
    }

    pub fn string(self, number: u32, value: &str) -> Self {
        self.bytes(number, value.as_bytes())
    }

    pub fn message(self, number: u32, value: Proto) -> Self {
        self.bytes(number, &value.finish())
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.0.flush()
    }
}

/// Packet with a protobuf header carrying an optional target job id.
pub fn proto_packet(emsg: u32, target_job: Option<u64>, body: &[u8]) -> Vec<u8> {
    let mut header = Proto::new().fixed64(1, 76561197960287930);
    if let Some(job) = target_job {
        header = header.fixed64(11, job);
    }
    let header = header.finish();

    let mut w = Writer::new();
    w.u32(PROTO_MASK | emsg);
    w.u32(header.len() as u32);
    w.buf(&header);
    w.buf(body);
    w.flush()
}

/// Packet with the 36-byte extended header.
pub fn extended_packet(emsg: u32, body: &[u8]) -> Vec<u8> {
    let mut w = Writer::new();
    w.u32(emsg);
    w.u8(36);
    w.u16(2);
    w.u64(JOB_ID_NONE);
    w.u64(JOB_ID_NONE);
    w.u8(239);
    w.u64(76561197960287930);
    w.i32(1);
    w.buf(body);
    w.flush()
}

/// Packet with the 20-byte handshake header.
pub fn simple_packet(emsg: u32, body: &[u8]) -> Vec<u8> {
    let mut w = Writer::new();
    w.u32(emsg);
    w.u64(JOB_ID_NONE);
    w.u64(JOB_ID_NONE);
    w.buf(body);
    w.flush()
}

/// Concatenates packets as `[u32 length][packet]` items.
pub fn multi_items(packets: &[Vec<u8>]) -> Vec<u8> {
    let mut w = Writer::new();
    for packet in packets {
        w.u32(packet.len() as u32);
        w.buf(packet);
    }
    w.flush()
}

pub fn write_dump(dir: &Path, files: &[(&str, &[u8])]) {
    for (name, bytes) in files {
        std::fs::write(dir.join(name), bytes).unwrap();
    }
}
