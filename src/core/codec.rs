//! # Frame Codecs
//!
//! A [`FrameCodec`] knows the fixed width of a frame header and how to
//! translate between header bytes and the payload length that follows.
//! It is stateless; the transports own all buffering.
//!
//! ## Variants
//! - [`LengthCodec`]: big-endian length prefix, 1, 2, 4 or 8 bytes wide
//!   (4 by default)
//! - [`MarkedLengthCodec`]: one marker byte followed by a 2-byte
//!   big-endian length
//!
//! A header announcing a zero length is invalid for every codec.

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Default length prefix width in bytes
pub const DEFAULT_HEADER_WIDTH: usize = 4;

pub trait FrameCodec: Send + Sync + fmt::Debug {
    /// Fixed header width in bytes.
    fn header_size(&self) -> usize;

    /// Payload length announced by `header`.
    ///
    /// `header` must hold at least [`header_size`](Self::header_size) bytes;
    /// only that many are inspected.
    fn parse(&self, header: &[u8]) -> Result<usize>;

    /// Append the header announcing `length` payload bytes to `dst`.
    fn build_header(&self, length: usize, dst: &mut BytesMut) -> Result<()>;

    /// Largest length the header can express.
    fn max_length(&self) -> usize;

    /// Header announcing `length` payload bytes, as a standalone buffer.
    fn header(&self, length: usize) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.header_size());
        self.build_header(length, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Codec used when nothing else is configured.
pub fn default_codec() -> Arc<dyn FrameCodec> {
    Arc::new(LengthCodec::default())
}

/// Big-endian length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthCodec {
    width: usize,
}

impl LengthCodec {
    pub fn new(width: usize) -> Result<Self> {
        match width {
            1 | 2 | 4 | 8 => Ok(Self { width }),
            _ => Err(ProtocolError::ConfigError(format!(
                "Unsupported length prefix width: {width}"
            ))),
        }
    }

    pub fn u8() -> Self {
        Self { width: 1 }
    }

    pub fn u16() -> Self {
        Self { width: 2 }
    }

    pub fn u32() -> Self {
        Self { width: 4 }
    }

    pub fn u64() -> Self {
        Self { width: 8 }
    }
}

impl Default for LengthCodec {
    fn default() -> Self {
        Self {
            width: DEFAULT_HEADER_WIDTH,
        }
    }
}

impl FrameCodec for LengthCodec {
    fn header_size(&self) -> usize {
        self.width
    }

    fn parse(&self, header: &[u8]) -> Result<usize> {
        if header.len() < self.width {
            return Err(ProtocolError::InvalidHeader);
        }
        let mut prefix = &header[..self.width];
        let length = prefix.get_uint(self.width);
        match usize::try_from(length) {
            Ok(0) | Err(_) => Err(ProtocolError::InvalidHeader),
            Ok(length) => Ok(length),
        }
    }

    fn build_header(&self, length: usize, dst: &mut BytesMut) -> Result<()> {
        if length == 0 {
            return Err(ProtocolError::InvalidHeader);
        }
        if length > self.max_length() {
            return Err(ProtocolError::OversizedPacket(length));
        }
        dst.put_uint(length as u64, self.width);
        Ok(())
    }

    fn max_length(&self) -> usize {
        if self.width >= std::mem::size_of::<usize>() {
            usize::MAX
        } else {
            (1usize << (self.width * 8)) - 1
        }
    }
}

/// Marker byte plus a 2-byte big-endian length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkedLengthCodec {
    marker: u8,
}

impl MarkedLengthCodec {
    pub const DEFAULT_MARKER: u8 = b'^';

    pub fn new(marker: u8) -> Self {
        Self { marker }
    }

    pub fn marker(&self) -> u8 {
        self.marker
    }
}

impl Default for MarkedLengthCodec {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MARKER)
    }
}

impl FrameCodec for MarkedLengthCodec {
    fn header_size(&self) -> usize {
        3
    }

    fn parse(&self, header: &[u8]) -> Result<usize> {
        match header {
            [marker, hi, lo, ..] if *marker == self.marker => {
                match u16::from_be_bytes([*hi, *lo]) {
                    0 => Err(ProtocolError::InvalidHeader),
                    length => Ok(usize::from(length)),
                }
            }
            _ => Err(ProtocolError::InvalidHeader),
        }
    }

    fn build_header(&self, length: usize, dst: &mut BytesMut) -> Result<()> {
        if length == 0 {
            return Err(ProtocolError::InvalidHeader);
        }
        let length =
            u16::try_from(length).map_err(|_| ProtocolError::OversizedPacket(length))?;
        dst.put_u8(self.marker);
        dst.put_u16(length);
        Ok(())
    }

    fn max_length(&self) -> usize {
        usize::from(u16::MAX)
    }
}
