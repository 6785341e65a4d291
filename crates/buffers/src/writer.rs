//! Auto-growing little-endian binary writer.

/// A binary writer that appends little-endian values to a growing buffer.
///
/// # Example
///
/// ```
/// use nethook_buffers::Writer;
///
/// let mut writer = Writer::new();
/// writer.u32(0x8000_0001);
/// writer.buf(&[0xaa, 0xbb]);
/// assert_eq!(writer.flush(), vec![0x01, 0x00, 0x00, 0x80, 0xaa, 0xbb]);
/// assert!(writer.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Writer {
    uint8: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.uint8.len()
    }

    /// Returns `true` if nothing has been written since the last flush.
    pub fn is_empty(&self) -> bool {
        self.uint8.is_empty()
    }

    /// Discards everything written so far.
    pub fn reset(&mut self) {
        self.uint8.clear();
    }

    /// Takes the written bytes, leaving the writer empty.
    pub fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.uint8)
    }

    pub fn u8(&mut self, val: u8) {
        self.uint8.push(val);
    }

    pub fn i8(&mut self, val: i8) {
        self.uint8.push(val as u8);
    }

    pub fn u16(&mut self, val: u16) {
        self.uint8.extend_from_slice(&val.to_le_bytes());
    }

    pub fn i16(&mut self, val: i16) {
        self.uint8.extend_from_slice(&val.to_le_bytes());
    }

    pub fn u32(&mut self, val: u32) {
        self.uint8.extend_from_slice(&val.to_le_bytes());
    }

    pub fn i32(&mut self, val: i32) {
        self.uint8.extend_from_slice(&val.to_le_bytes());
    }

    pub fn u64(&mut self, val: u64) {
        self.uint8.extend_from_slice(&val.to_le_bytes());
    }

    pub fn i64(&mut self, val: i64) {
        self.uint8.extend_from_slice(&val.to_le_bytes());
    }

    pub fn f32(&mut self, val: f32) {
        self.uint8.extend_from_slice(&val.to_le_bytes());
    }

    pub fn f64(&mut self, val: f64) {
        self.uint8.extend_from_slice(&val.to_le_bytes());
    }

    /// Appends raw bytes.
    pub fn buf(&mut self, bytes: &[u8]) {
        self.uint8.extend_from_slice(bytes);
    }

    /// Appends the UTF-8 bytes of `s` without a length prefix.
    pub fn utf8(&mut self, s: &str) {
        self.uint8.extend_from_slice(s.as_bytes());
    }

    /// Appends a base-128 varint.
    pub fn varint(&mut self, mut val: u64) {
        while val >= 0x80 {
            self.uint8.push((val as u8) | 0x80);
            val >>= 7;
        }
        self.uint8.push(val as u8);
    }
}
