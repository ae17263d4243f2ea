//! # Core Components
//!
//! Buffers, header codecs, stream framing and parsed messages.
//!
//! This module provides the transport-independent foundation: how bytes are
//! stored and shared, how a frame header maps to a payload length, and how a
//! complete frame is presented to the application.
//!
//! ## Components
//! - **ByteBuffer**: immutable, reference-counted byte storage
//! - **FrameCodec**: header width and header/length translation
//! - **FramingCodec**: tokio decoder running the header/body state machine
//! - **CommandMessage**: one parsed frame plus the writer it came from
//!
//! ## Wire Format (default codec)
//! ```text
//! [Length(4, big-endian)] [Payload(Length)]
//! ```
//!
//! ## Limits
//! - Zero-length frames are invalid
//! - Frame lengths above the configured maximum close the connection
//!   before any body byte is buffered

pub mod buffer;
pub mod codec;
pub mod framing;
pub mod message;
