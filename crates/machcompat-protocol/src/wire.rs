//! # Wire Cursors
//!
//! Bounds-checked readers and writers over raw message buffers.
//!
//! Every Mach field this crate handles is a 32-bit scalar, a byte inside a
//! descriptor, or a 64-bit out-of-line address. All of them are stored in the
//! host's native byte order: the foreign process and the shim share a machine.

use thiserror::Error;

/// Errors raised while decoding a request or encoding a reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError
{
    /// The request ended before a required field.
    #[error("Truncated message: needed {needed} bytes, got {available}")]
    Truncated
    {
        /// Bytes required to decode the structure.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// The caller's reply buffer cannot hold the encoded reply plus trailer.
    #[error("Reply buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall
    {
        /// Bytes required (reply body plus trailer).
        needed: usize,
        /// Capacity the caller declared.
        capacity: usize,
    },

    /// The header's declared size disagrees with the buffer it arrived in.
    #[error("Declared message size {declared} exceeds buffer length {available}")]
    SizeMismatch
    {
        /// `msgh_size` from the header.
        declared: u32,
        /// Length of the buffer.
        available: usize,
    },

    /// A descriptor carried a type other than the one the schema expects.
    #[error("Unexpected descriptor type {found} (expected {expected})")]
    UnexpectedDescriptor
    {
        /// Expected descriptor type.
        expected: u8,
        /// Descriptor type found on the wire.
        found: u8,
    },

    /// A complex request declared the wrong number of descriptors.
    #[error("Unexpected descriptor count {found} (expected {expected})")]
    DescriptorCount
    {
        /// Descriptors the schema requires.
        expected: u32,
        /// Descriptors declared in the body.
        found: u32,
    },

    /// The message id does not name a trap we route.
    #[error("Unknown message id {0}")]
    UnknownMessage(i32),
}

/// Sequential reader over a request buffer.
#[derive(Debug)]
pub struct WireReader<'a>
{
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a>
{
    /// Start reading at the beginning of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self
    {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize
    {
        self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WireError>
    {
        let end = self.pos + N;
        let Some(bytes) = self.buf.get(self.pos..end) else {
            return Err(WireError::Truncated {
                needed: end,
                available: self.buf.len(),
            });
        };
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Ok(out)
    }

    /// Read one byte.
    pub fn u8(&mut self) -> Result<u8, WireError>
    {
        Ok(self.take::<1>()?[0])
    }

    /// Read a native-endian `u16`.
    pub fn u16(&mut self) -> Result<u16, WireError>
    {
        Ok(u16::from_ne_bytes(self.take()?))
    }

    /// Read a native-endian `u32`.
    pub fn u32(&mut self) -> Result<u32, WireError>
    {
        Ok(u32::from_ne_bytes(self.take()?))
    }

    /// Read a native-endian `i32`.
    pub fn i32(&mut self) -> Result<i32, WireError>
    {
        Ok(i32::from_ne_bytes(self.take()?))
    }

    /// Read a native-endian `u64`.
    pub fn u64(&mut self) -> Result<u64, WireError>
    {
        Ok(u64::from_ne_bytes(self.take()?))
    }

    /// Skip `n` bytes (padding, NDR record).
    pub fn skip(&mut self, n: usize) -> Result<(), WireError>
    {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(WireError::Truncated {
                needed: end,
                available: self.buf.len(),
            });
        }
        self.pos = end;
        Ok(())
    }
}

/// Sequential writer into a caller-supplied reply buffer.
///
/// The writer never grows the buffer. Callers size-check with
/// [`WireWriter::reserve`] before emitting anything, so a failed encode leaves
/// the buffer untouched.
#[derive(Debug)]
pub struct WireWriter<'a>
{
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WireWriter<'a>
{
    /// Start writing at the beginning of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self
    {
        Self { buf, pos: 0 }
    }

    /// Fail unless `total` bytes fit in the buffer.
    pub fn reserve(&self, total: usize) -> Result<(), WireError>
    {
        if total > self.buf.len() {
            return Err(WireError::BufferTooSmall {
                needed: total,
                capacity: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Bytes written so far.
    #[must_use]
    pub fn position(&self) -> usize
    {
        self.pos
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), WireError>
    {
        let end = self.pos + bytes.len();
        let capacity = self.buf.len();
        let Some(dst) = self.buf.get_mut(self.pos..end) else {
            return Err(WireError::BufferTooSmall { needed: end, capacity });
        };
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Write one byte.
    pub fn u8(&mut self, v: u8) -> Result<(), WireError>
    {
        self.put(&[v])
    }

    /// Write a native-endian `u16`.
    pub fn u16(&mut self, v: u16) -> Result<(), WireError>
    {
        self.put(&v.to_ne_bytes())
    }

    /// Write a native-endian `u32`.
    pub fn u32(&mut self, v: u32) -> Result<(), WireError>
    {
        self.put(&v.to_ne_bytes())
    }

    /// Write a native-endian `i32`.
    pub fn i32(&mut self, v: i32) -> Result<(), WireError>
    {
        self.put(&v.to_ne_bytes())
    }

    /// Write a native-endian `u64`.
    pub fn u64(&mut self, v: u64) -> Result<(), WireError>
    {
        self.put(&v.to_ne_bytes())
    }

    /// Write raw bytes.
    pub fn bytes(&mut self, v: &[u8]) -> Result<(), WireError>
    {
        self.put(v)
    }
}
