//! # TCP Connection
//!
//! Per-socket protocol engine shared by accepted and dialed connections.
//!
//! ## Read side
//! [`TcpConnection::start`] spawns one task that owns an `Arc` of the
//! connection and drives a [`FramingCodec`] over the read half. Reads are
//! strictly sequential, so frames reach the [`CommandHandler`] in arrival
//! order. The first failure (I/O error, invalid or oversized header, end of
//! stream mid-frame, clean end of stream, or [`close`](TcpConnection::close))
//! moves the connection to its terminal state and produces exactly one
//! [`ConnectionLifecycle::on_close`] call.
//!
//! ## Write side
//! Each write sends the header and then the payload while holding the
//! write-half lock, so frames never interleave. A failed header write skips
//! the payload. Writes are independent of the read task.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bytes::BytesMut;
use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::config::FrameLimits;
use crate::core::buffer::ByteBuffer;
use crate::core::codec::FrameCodec;
use crate::core::framing::{Frame, FramingCodec};
use crate::core::message::CommandMessage;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handler::{CommandHandler, ConnectionLifecycle};
use crate::protocol::writer::{Writer, WriterId};

pub struct TcpConnection {
    id: WriterId,
    peer: SocketAddr,
    local: SocketAddr,
    codec: RwLock<Arc<dyn FrameCodec>>,
    limits: FrameLimits,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    handler: Arc<dyn CommandHandler>,
    lifecycle: Arc<dyn ConnectionLifecycle>,
    started: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl TcpConnection {
    /// Wrap a connected stream. The connection does nothing until started.
    pub fn new(
        stream: TcpStream,
        codec: Arc<dyn FrameCodec>,
        limits: FrameLimits,
        handler: Arc<dyn CommandHandler>,
        lifecycle: Arc<dyn ConnectionLifecycle>,
    ) -> Result<Arc<Self>> {
        let peer = stream.peer_addr()?;
        let local = stream.local_addr()?;
        let (reader, writer) = stream.into_split();

        Ok(Arc::new(Self {
            id: WriterId::next(),
            peer,
            local,
            codec: RwLock::new(codec),
            limits,
            reader: Mutex::new(Some(reader)),
            writer: tokio::sync::Mutex::new(Some(writer)),
            handler,
            lifecycle,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }))
    }

    pub fn id(&self) -> WriterId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn limits(&self) -> FrameLimits {
        self.limits
    }

    /// Codec currently bound to this connection.
    pub fn codec(&self) -> Arc<dyn FrameCodec> {
        match self.codec.read() {
            Ok(codec) => Arc::clone(&*codec),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Replace the codec. Only allowed before [`start`](Self::start).
    pub fn set_codec(&self, codec: Arc<dyn FrameCodec>) -> Result<()> {
        if self.is_started() {
            return Err(ProtocolError::Custom(constants::ERR_ALREADY_STARTED.into()));
        }
        let mut slot = self
            .codec
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.into()))?;
        *slot = codec;
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    /// Arm the read loop. Must be called from within a tokio runtime, once.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ProtocolError::Custom(constants::ERR_ALREADY_STARTED.into()));
        }
        if self.cancel.is_cancelled() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let reader = self
            .reader
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.into()))?
            .take()
            .ok_or(ProtocolError::ConnectionClosed)?;

        tokio::spawn(Arc::clone(self).read_loop(reader));
        Ok(())
    }

    /// Close the socket.
    ///
    /// A started connection finishes its read loop and reports `on_close`;
    /// a connection that was never started is simply dropped.
    pub fn close(&self) {
        self.cancel.cancel();
        if !self.is_started() {
            self.closed.store(true, Ordering::Release);
            if let Ok(mut reader) = self.reader.lock() {
                reader.take();
            }
            if let Ok(mut writer) = self.writer.try_lock() {
                writer.take();
            }
        }
    }

    #[instrument(name = "tcp_connection", skip_all, fields(id = %self.id, peer = %self.peer))]
    async fn read_loop(self: Arc<Self>, reader: OwnedReadHalf) {
        let framing = FramingCodec::new(self.codec(), self.limits.max_frame_size);
        let mut frames = FramedRead::new(reader, framing);

        let error = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break ProtocolError::ConnectionClosed,
                next = frames.next() => match next {
                    Some(Ok(frame)) => self.deliver(frame),
                    Some(Err(e)) => break e,
                    None => break ProtocolError::ConnectionClosed,
                },
            }
        };

        drop(frames);
        self.finish(error).await;
    }

    fn deliver(self: &Arc<Self>, frame: Frame) {
        trace!(bytes = frame.payload.len(), "Frame received");
        let writer: Arc<dyn Writer> = Arc::clone(self) as Arc<dyn Writer>;
        let message = CommandMessage::new(
            writer,
            ByteBuffer::from_bytes(frame.header),
            ByteBuffer::from_bytes(frame.payload),
        );
        if let Err(e) = self.handler.on_command(message) {
            debug!(error = %e, "Command handler reported an error");
        }
    }

    async fn finish(self: &Arc<Self>, error: ProtocolError) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match &error {
            ProtocolError::ConnectionClosed => debug!("Connection closed"),
            e => warn!(error = %e, "Read failed, closing connection"),
        }

        self.cancel.cancel();
        self.writer.lock().await.take();
        self.lifecycle.on_close(self, &error);
    }

    /// Send one frame: header, then payload.
    pub async fn send(&self, payload: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let codec = self.codec();
        let mut header = BytesMut::with_capacity(codec.header_size());
        codec.build_header(payload.len(), &mut header)?;

        tokio::select! {
            _ = self.cancel.cancelled() => Err(ProtocolError::ConnectionClosed),
            written = self.write_frame(&header, payload) => written,
        }
    }

    async fn write_frame(&self, header: &[u8], payload: &[u8]) -> Result<usize> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ProtocolError::ConnectionClosed)?;
        let written = write_header_then_payload(writer, header, payload).await?;
        trace!(bytes = written, "Frame sent");
        Ok(written)
    }
}

/// Header first; the payload is only attempted once the header is out.
async fn write_header_then_payload<W>(
    writer: &mut W,
    header: &[u8],
    payload: &[u8],
) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(header).await?;
    writer.write_all(payload).await?;
    Ok(payload.len())
}

impl Writer for TcpConnection {
    fn id(&self) -> WriterId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }

    fn write<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, Result<usize>> {
        Box::pin(self.send(payload))
    }

    fn close(&self) {
        TcpConnection::close(self);
    }
}

impl fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("local", &self.local)
            .field("started", &self.is_started())
            .field("closed", &self.is_closed())
            .finish()
    }
}
