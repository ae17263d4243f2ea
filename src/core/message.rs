//! # CommandMessage
//!
//! One parsed frame: the header bytes, a view into the payload storage and
//! the [`Writer`] it arrived from.
//!
//! Messages are cheap to clone and never copy their payload. [`slice`]
//! produces a narrower view over the same storage, which lets a handler
//! consume a payload field by field while earlier views are dropped.
//!
//! [`slice`]: CommandMessage::slice

use std::fmt;
use std::sync::Arc;

use crate::core::buffer::{check_range, ByteBuffer};
use crate::error::Result;
use crate::protocol::writer::{Writer, WriterId};

#[derive(Clone)]
pub struct CommandMessage {
    writer: Arc<dyn Writer>,
    header: ByteBuffer,
    payload: ByteBuffer,
    offset: usize,
    length: usize,
}

impl CommandMessage {
    /// A message viewing all of `payload`.
    pub fn new(writer: Arc<dyn Writer>, header: ByteBuffer, payload: ByteBuffer) -> Self {
        let length = payload.len();
        Self {
            writer,
            header,
            payload,
            offset: 0,
            length,
        }
    }

    /// Bytes of this view.
    pub fn data(&self) -> &[u8] {
        &self.payload.as_bytes()[self.offset..self.offset + self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Start of this view within the payload storage.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn byte_at(&self, index: usize) -> Option<u8> {
        self.data().get(index).copied()
    }

    /// View `[offset, offset + len)` of this view, sharing storage.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        check_range(offset, len, self.length)?;
        Ok(Self {
            writer: Arc::clone(&self.writer),
            header: self.header.share(),
            payload: self.payload.share(),
            offset: self.offset + offset,
            length: len,
        })
    }

    /// View from `offset` to the end of this view.
    pub fn slice_from(&self, offset: usize) -> Result<Self> {
        check_range(offset, 0, self.length)?;
        self.slice(offset, self.length - offset)
    }

    /// Independent copy of this view's bytes.
    pub fn to_buffer(&self) -> ByteBuffer {
        ByteBuffer::copy_from(self.data())
    }

    pub fn header(&self) -> &ByteBuffer {
        &self.header
    }

    /// The whole payload storage this view points into.
    pub fn payload(&self) -> &ByteBuffer {
        &self.payload
    }

    pub fn writer(&self) -> &Arc<dyn Writer> {
        &self.writer
    }

    /// Id of the originating writer.
    pub fn id(&self) -> WriterId {
        self.writer.id()
    }

    /// Send `payload` back to where this message came from.
    pub async fn reply(&self, payload: &[u8]) -> Result<usize> {
        self.writer.write(payload).await
    }
}

impl fmt::Debug for CommandMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandMessage")
            .field("writer", &self.writer.id())
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}
