//! # Error Types
//!
//! Error handling for the framing transport.
//!
//! This module defines every error variant that can surface from socket
//! operations, from OS-level I/O failures to framing violations.
//!
//! ## Error Categories
//! - **Transport Errors**: I/O failures reported by the operating system
//! - **Protocol Errors**: invalid headers, oversized frames, short reads, closed connections
//! - **Decode Errors**: decompression failures
//! - **View Errors**: out-of-range sub-views of buffers and messages
//! - **Configuration Errors**: invalid files, variables or addresses
//!
//! Admission refusals are not errors; they surface as
//! [`Admission::Refuse`](crate::protocol::handler::Admission::Refuse).
//!
//! ## Example Usage
//! ```rust
//! use sockframe::error::{ProtocolError, Result};
//! use sockframe::core::codec::{FrameCodec, LengthCodec};
//!
//! fn frame_length(header: &[u8]) -> Result<usize> {
//!     LengthCodec::default().parse(header)
//! }
//!
//! assert!(matches!(frame_length(&[0, 0, 0, 0]), Err(ProtocolError::InvalidHeader)));
//! assert_eq!(frame_length(&[0, 0, 0, 5]).unwrap(), 5);
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Lifecycle errors
    pub const ERR_ALREADY_STARTED: &str = "Connection already started";
    pub const ERR_ACCEPTOR_STARTED: &str = "Acceptor already started";
    pub const ERR_MONITOR_STARTED: &str = "UDP monitor already started";

    /// Synchronization errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

/// ProtocolError is the primary error type for all transport operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Frame too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Frame length mismatch: header declared {expected} bytes, received {actual}")]
    FrameLengthMismatch { expected: usize, actual: usize },

    #[error("Range {offset}+{len} out of bounds for {available} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// True for OS-level failures (the transport error class).
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }

    /// True for framing violations that terminate a TCP connection.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidHeader
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::FrameLengthMismatch { .. }
                | ProtocolError::ConnectionClosed
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
