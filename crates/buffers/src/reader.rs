//! Binary buffer reader with cursor tracking.

use std::str;

use crate::BufferError;

/// A little-endian binary reader over a byte slice.
///
/// The reader maintains a cursor position. Every read checks the remaining
/// length first and leaves the cursor untouched when it fails, so a caller can
/// report exactly how far decoding got.
///
/// # Example
///
/// ```
/// use nethook_buffers::Reader;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05];
/// let mut reader = Reader::new(&data);
///
/// assert_eq!(reader.u8().unwrap(), 0x01);
/// assert_eq!(reader.u16().unwrap(), 0x0302);
/// assert_eq!(reader.x, 3);
/// assert!(reader.u32().is_err());
/// assert_eq!(reader.x, 3);
/// ```
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    /// The underlying byte slice.
    pub uint8: &'a [u8],
    /// Current cursor position.
    pub x: usize,
    /// End position (exclusive).
    pub end: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader for the given byte slice.
    pub fn new(uint8: &'a [u8]) -> Self {
        let end = uint8.len();
        Self { uint8, x: 0, end }
    }

    /// Creates a reader from a slice with custom start and end positions.
    ///
    /// `end` is clamped to the slice length and `x` to `end`.
    pub fn from_slice(uint8: &'a [u8], x: usize, end: usize) -> Self {
        let end = end.min(uint8.len());
        Self {
            uint8,
            x: x.min(end),
            end,
        }
    }

    /// Returns the number of remaining bytes.
    pub fn size(&self) -> usize {
        self.end - self.x
    }

    /// Returns `true` when no bytes remain.
    pub fn is_empty(&self) -> bool {
        self.x >= self.end
    }

    /// Peeks at the current byte without advancing the cursor.
    pub fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.uint8[self.x])
        }
    }

    fn ensure(&self, needed: usize) -> Result<(), BufferError> {
        let available = self.size();
        if needed > available {
            return Err(BufferError::EndOfBuffer {
                offset: self.x,
                needed,
                available,
            });
        }
        Ok(())
    }

    /// Advances the cursor by the given number of bytes.
    pub fn skip(&mut self, length: usize) -> Result<(), BufferError> {
        self.ensure(length)?;
        self.x += length;
        Ok(())
    }

    /// Returns a subarray of the given size and advances the cursor.
    pub fn buf(&mut self, size: usize) -> Result<&'a [u8], BufferError> {
        self.ensure(size)?;
        let x = self.x;
        self.x += size;
        Ok(&self.uint8[x..self.x])
    }

    /// Returns every remaining byte and moves the cursor to the end.
    pub fn rest(&mut self) -> &'a [u8] {
        let x = self.x;
        self.x = self.end;
        &self.uint8[x..self.end]
    }

    /// Creates a new Reader over the next `size` bytes and advances the cursor.
    pub fn cut(&mut self, size: usize) -> Result<Reader<'a>, BufferError> {
        self.ensure(size)?;
        let slice = Reader::from_slice(self.uint8, self.x, self.x + size);
        self.x += size;
        Ok(slice)
    }

    #[inline]
    fn array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.uint8[self.x..self.x + N]);
        self.x += N;
        Ok(out)
    }

    /// Reads an unsigned 8-bit integer.
    #[inline]
    pub fn u8(&mut self) -> Result<u8, BufferError> {
        self.ensure(1)?;
        let val = self.uint8[self.x];
        self.x += 1;
        Ok(val)
    }

    /// Reads a signed 8-bit integer.
    #[inline]
    pub fn i8(&mut self) -> Result<i8, BufferError> {
        Ok(self.u8()? as i8)
    }

    /// Reads an unsigned 16-bit integer (little-endian).
    #[inline]
    pub fn u16(&mut self) -> Result<u16, BufferError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    /// Reads a signed 16-bit integer (little-endian).
    #[inline]
    pub fn i16(&mut self) -> Result<i16, BufferError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    /// Reads an unsigned 32-bit integer (little-endian).
    #[inline]
    pub fn u32(&mut self) -> Result<u32, BufferError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Reads a signed 32-bit integer (little-endian).
    #[inline]
    pub fn i32(&mut self) -> Result<i32, BufferError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    /// Reads an unsigned 64-bit integer (little-endian).
    #[inline]
    pub fn u64(&mut self) -> Result<u64, BufferError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Reads a signed 64-bit integer (little-endian).
    #[inline]
    pub fn i64(&mut self) -> Result<i64, BufferError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// Reads a 32-bit floating point number (little-endian).
    #[inline]
    pub fn f32(&mut self) -> Result<f32, BufferError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Reads a 64-bit floating point number (little-endian).
    #[inline]
    pub fn f64(&mut self) -> Result<f64, BufferError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    /// Reads a UTF-8 string of the given size.
    ///
    /// On invalid UTF-8 the cursor is not advanced.
    pub fn utf8(&mut self, size: usize) -> Result<&'a str, BufferError> {
        self.ensure(size)?;
        let start = self.x;
        let s = str::from_utf8(&self.uint8[start..start + size])
            .map_err(|_| BufferError::InvalidUtf8 { offset: start })?;
        self.x += size;
        Ok(s)
    }
}
