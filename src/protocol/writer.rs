//! Send destinations.
//!
//! A [`Writer`] is anything a frame can be sent back to: a TCP connection
//! (many frames over its lifetime) or a UDP reply writer (one datagram per
//! write, addressed to the peer that produced it). Every writer carries a
//! [`WriterId`] drawn from one process-wide counter, so ids are unique
//! across transports and never reused while the process runs.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;

use crate::core::buffer::ByteBuffer;
use crate::error::Result;

static NEXT_WRITER_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide unique writer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriterId(u64);

impl WriterId {
    /// Allocate the next id.
    pub fn next() -> Self {
        WriterId(NEXT_WRITER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait Writer: Send + Sync + fmt::Debug {
    fn id(&self) -> WriterId;

    /// Address of the remote end, when known.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Frame `payload` with the writer's codec and send it.
    ///
    /// Resolves to the number of payload bytes written.
    fn write<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, Result<usize>>;

    fn write_buffer<'a>(&'a self, buffer: &'a ByteBuffer) -> BoxFuture<'a, Result<usize>> {
        self.write(buffer.as_bytes())
    }

    /// Stop the destination. For TCP this closes the socket.
    fn close(&self);

    /// Remote address rendered as text, empty when unknown.
    fn address(&self) -> String {
        self.peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    }
}
