//! # ByteBuffer
//!
//! Immutable, reference-counted byte storage backed by [`bytes::Bytes`].
//!
//! Cloning or [`share`](ByteBuffer::share)-ing a buffer hands out another
//! handle to the same allocation; the storage is released when the last
//! handle drops. [`sub`](ByteBuffer::sub) and
//! [`decompress`](ByteBuffer::decompress) always allocate fresh storage.
//!
//! A buffer may carry one trailing zero byte (the terminator) for callers
//! that treat the contents as text. The terminator is never counted in
//! [`len`](ByteBuffer::len) and never shows up in [`as_bytes`](ByteBuffer::as_bytes).

use std::fmt::{self, Write as _};
use std::ops::Deref;

use bytes::{Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::utils::compression::{self, CompressionKind};

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct ByteBuffer {
    /// Contents, plus the terminator byte when `terminated` is set
    data: Bytes,
    terminated: bool,
}

impl ByteBuffer {
    /// Copy `bytes` into a new buffer.
    pub fn copy_from(bytes: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(bytes),
            terminated: false,
        }
    }

    /// Copy `bytes` into a new buffer followed by a zero terminator.
    pub fn copy_from_terminated(bytes: &[u8]) -> Self {
        let mut data = BytesMut::with_capacity(bytes.len() + 1);
        data.extend_from_slice(bytes);
        data.extend_from_slice(&[0]);
        Self {
            data: data.freeze(),
            terminated: true,
        }
    }

    /// A zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: BytesMut::zeroed(len).freeze(),
            terminated: false,
        }
    }

    /// A zero-filled buffer of `len` bytes with a terminator.
    pub fn zeroed_terminated(len: usize) -> Self {
        Self {
            data: BytesMut::zeroed(len + 1).freeze(),
            terminated: true,
        }
    }

    /// Wrap existing storage without copying.
    pub fn from_bytes(data: Bytes) -> Self {
        Self {
            data,
            terminated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() - usize::from(self.terminated)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Contents including the trailing zero, for terminated buffers only.
    pub fn as_bytes_with_terminator(&self) -> Option<&[u8]> {
        self.terminated.then_some(&self.data[..])
    }

    pub fn byte_at(&self, index: usize) -> Option<u8> {
        self.as_bytes().get(index).copied()
    }

    /// Another handle to the same storage.
    pub fn share(&self) -> Self {
        self.clone()
    }

    /// Whether two handles point at the same storage.
    pub fn shares_storage(&self, other: &ByteBuffer) -> bool {
        self.data.as_ptr() == other.data.as_ptr() && self.data.len() == other.data.len()
    }

    /// Copy `[offset, offset + len)` into an independent buffer.
    pub fn sub(&self, offset: usize, len: usize) -> Result<Self> {
        check_range(offset, len, self.len())?;
        Ok(Self::copy_from(&self.as_bytes()[offset..offset + len]))
    }

    /// Like [`sub`](Self::sub), with a terminator on the copy.
    pub fn sub_terminated(&self, offset: usize, len: usize) -> Result<Self> {
        check_range(offset, len, self.len())?;
        Ok(Self::copy_from_terminated(
            &self.as_bytes()[offset..offset + len],
        ))
    }

    /// Inflate the zlib or gzip stream starting at `offset`.
    ///
    /// The result keeps bytes `[0, offset)` verbatim followed by the inflated
    /// output. `self` is left untouched whether or not inflation succeeds.
    pub fn decompress(&self, offset: usize) -> Result<Self> {
        self.decompress_with(offset, CompressionKind::Zlib)
    }

    /// [`decompress`](Self::decompress) for an explicit compression format.
    pub fn decompress_with(&self, offset: usize, kind: CompressionKind) -> Result<Self> {
        if offset > self.len() {
            return Err(ProtocolError::OutOfBounds {
                offset,
                len: 0,
                available: self.len(),
            });
        }

        let (prefix, stream) = self.as_bytes().split_at(offset);
        let inflated = compression::decompress(stream, &kind)?;

        let mut out = BytesMut::with_capacity(prefix.len() + inflated.len() + 1);
        out.extend_from_slice(prefix);
        out.extend_from_slice(&inflated);
        if self.terminated {
            out.extend_from_slice(&[0]);
        }
        Ok(Self {
            data: out.freeze(),
            terminated: self.terminated,
        })
    }

    /// Compare the contents with `text`.
    pub fn eq_str(&self, text: &str) -> bool {
        self.as_bytes() == text.as_bytes()
    }

    /// `Data(<len>):` followed by every byte as two hex digits.
    pub fn hex_dump(&self) -> String {
        let mut out = String::with_capacity(16 + self.len() * 3);
        let _ = write!(out, "Data({}):", self.len());
        for byte in self.as_bytes() {
            let _ = write!(out, "{byte:02x} ");
        }
        out
    }

    /// The underlying storage, terminator excluded.
    pub fn into_bytes(self) -> Bytes {
        let len = self.len();
        let mut data = self.data;
        data.truncate(len);
        data
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(data: Bytes) -> Self {
        Self::from_bytes(data)
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(Bytes::from(data))
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(data: &[u8]) -> Self {
        Self::copy_from(data)
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex_dump())
    }
}

/// Reject views that would reach past `available`.
pub(crate) fn check_range(offset: usize, len: usize, available: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= available => Ok(()),
        _ => Err(ProtocolError::OutOfBounds {
            offset,
            len,
            available,
        }),
    }
}
