//! Stream framing on top of a [`FrameCodec`].
//!
//! [`FramingCodec`] is the read-side state machine of a TCP connection,
//! expressed as a `tokio_util` decoder:
//!
//! ```text
//! AwaitingHeader --header_size() bytes, parse() ok--> AwaitingBody(len)
//! AwaitingBody(len) --len bytes--> emit Frame, back to AwaitingHeader
//! ```
//!
//! An invalid header, a length above the configured maximum, or end of
//! stream in the middle of a frame all surface as errors.
//!
//! Payloads are split off the read buffer and frozen, so a decoded
//! [`Frame`] shares storage with the bytes that were read instead of
//! copying them.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::codec::FrameCodec;
use crate::error::ProtocolError;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Bytes,
    pub payload: Bytes,
}

#[derive(Debug)]
enum DecodeState {
    AwaitingHeader,
    AwaitingBody { header: Bytes, length: usize },
}

#[derive(Debug)]
pub struct FramingCodec {
    codec: Arc<dyn FrameCodec>,
    max_frame_size: usize,
    state: DecodeState,
}

impl FramingCodec {
    pub fn new(codec: Arc<dyn FrameCodec>, max_frame_size: usize) -> Self {
        Self {
            codec,
            max_frame_size,
            state: DecodeState::AwaitingHeader,
        }
    }

    pub fn codec(&self) -> &Arc<dyn FrameCodec> {
        &self.codec
    }

    /// Whether the decoder sits between frames.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::AwaitingHeader)
    }
}

impl Decoder for FramingCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if let DecodeState::AwaitingHeader = self.state {
            let header_size = self.codec.header_size();
            if src.len() < header_size {
                src.reserve(header_size - src.len());
                return Ok(None);
            }

            let header = src.split_to(header_size).freeze();
            let length = self.codec.parse(&header)?;
            if length > self.max_frame_size {
                return Err(ProtocolError::OversizedPacket(length));
            }
            self.state = DecodeState::AwaitingBody { header, length };
        }

        let DecodeState::AwaitingBody { length, .. } = self.state else {
            return Ok(None);
        };
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let payload = src.split_to(length).freeze();
        match std::mem::replace(&mut self.state, DecodeState::AwaitingHeader) {
            DecodeState::AwaitingBody { header, .. } => Ok(Some(Frame { header, payload })),
            DecodeState::AwaitingHeader => Err(ProtocolError::InvalidHeader),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        match self.state {
            DecodeState::AwaitingHeader if src.is_empty() => Ok(None),
            DecodeState::AwaitingHeader => Err(ProtocolError::FrameLengthMismatch {
                expected: self.codec.header_size(),
                actual: src.len(),
            }),
            DecodeState::AwaitingBody { length, .. } => Err(ProtocolError::FrameLengthMismatch {
                expected: length,
                actual: src.len(),
            }),
        }
    }
}

impl Encoder<&[u8]> for FramingCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.reserve(self.codec.header_size() + payload.len());
        self.codec.build_header(payload.len(), dst)?;
        dst.put_slice(payload);
        Ok(())
    }
}
