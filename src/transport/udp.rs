//! # UDP Monitor
//!
//! One bound datagram socket serving any number of peers.
//!
//! Every received datagram is parsed with the monitor's codec. Datagrams
//! that are shorter than a header, carry an invalid header, or announce more
//! payload than they contain are dropped without surfacing an error; the
//! receive is re-armed either way. Valid datagrams become one
//! [`CommandMessage`] whose writer is an ephemeral [`UdpReplyWriter`]
//! addressed back to the sender.
//!
//! Sends build header and payload into one buffer and go out as a single
//! datagram. There is no retry, backpressure or partial-send handling.
//!
//! [`UdpMonitor::close`] releases the socket: the receive loop stops and
//! every later send, including replies through writers handed out earlier,
//! fails with [`ProtocolError::ConnectionClosed`]. Receive errors that only
//! concern one datagram or one peer are logged and the receive re-armed.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use bytes::BytesMut;
use futures::future::BoxFuture;
use tokio::net::UdpSocket;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{FrameLimits, NetworkConfig};
use crate::core::buffer::ByteBuffer;
use crate::core::codec::{default_codec, FrameCodec};
use crate::core::framing::FramingCodec;
use crate::core::message::CommandMessage;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handler::CommandHandler;
use crate::protocol::writer::{Writer, WriterId};

pub struct UdpMonitor {
    socket: RwLock<Option<Arc<UdpSocket>>>,
    local: SocketAddr,
    codec: Arc<dyn FrameCodec>,
    limits: FrameLimits,
    handler: Arc<dyn CommandHandler>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl UdpMonitor {
    /// Bind `endpoint` with the default codec and limits.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn bind(endpoint: SocketAddr, handler: Arc<dyn CommandHandler>) -> Result<Arc<Self>> {
        Self::bind_with(endpoint, default_codec(), FrameLimits::default(), handler)
    }

    /// Bind `endpoint` with an explicit codec and limits.
    #[instrument(skip(codec, handler))]
    pub fn bind_with(
        endpoint: SocketAddr,
        codec: Arc<dyn FrameCodec>,
        limits: FrameLimits,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Arc<Self>> {
        if limits.max_datagram_size <= codec.header_size() {
            return Err(ProtocolError::ConfigError(format!(
                "Datagram size {} leaves no room after a {}-byte header",
                limits.max_datagram_size,
                codec.header_size()
            )));
        }

        let socket = bind_socket(endpoint)?;
        let local = socket.local_addr()?;
        info!(address = %local, "UDP monitor bound");

        Ok(Arc::new(Self {
            socket: RwLock::new(Some(Arc::new(socket))),
            local,
            codec,
            limits,
            handler,
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }))
    }

    /// Bind the address, codec and limits from `config`.
    pub fn from_config(
        config: &NetworkConfig,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Arc<Self>> {
        Self::bind_with(
            config.udp.socket_addr()?,
            config.transport.build_codec()?,
            config.limits(),
            handler,
        )
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn codec(&self) -> &Arc<dyn FrameCodec> {
        &self.codec
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Arm the receive loop.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ProtocolError::Custom(constants::ERR_MONITOR_STARTED.into()));
        }
        tokio::spawn(Arc::clone(self).receive_loop());
        Ok(())
    }

    /// Stop receiving and release the socket.
    pub fn close(&self) {
        self.cancel.cancel();
        match self.socket.write() {
            Ok(mut slot) => drop(slot.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }

    /// Handle to the bound socket while the monitor is open.
    fn socket(&self) -> Result<Arc<UdpSocket>> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let slot = self
            .socket
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.into()))?;
        slot.clone().ok_or(ProtocolError::ConnectionClosed)
    }

    #[instrument(name = "udp_monitor", skip_all, fields(local = %self.local))]
    async fn receive_loop(self: Arc<Self>) {
        let Ok(socket) = self.socket() else {
            return;
        };
        let mut buf = vec![0u8; self.limits.max_datagram_size];

        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = socket.recv_from(&mut buf) => received,
            };
            match received {
                Ok((n, remote)) => {
                    self.dispatch(&buf[..n], remote);
                }
                Err(e) if is_per_datagram(&e) => {
                    warn!(error = %e, "Receive error for a single datagram, re-arming");
                }
                Err(e) => {
                    error!(error = %e, "Receive failed, monitor stopping");
                    self.close();
                    break;
                }
            }
        }

        debug!("UDP monitor stopped");
    }

    /// Parse one datagram and hand it to the handler.
    ///
    /// Returns whether the datagram was delivered.
    fn dispatch(self: &Arc<Self>, datagram: &[u8], remote: SocketAddr) -> bool {
        let header_size = self.codec.header_size();
        if datagram.len() < header_size {
            debug!(peer = %remote, bytes = datagram.len(), "Datagram shorter than header, dropped");
            return false;
        }

        let length = match self.codec.parse(&datagram[..header_size]) {
            Ok(length) => length,
            Err(e) => {
                debug!(peer = %remote, error = %e, "Invalid frame header, dropped");
                return false;
            }
        };
        let available = datagram.len() - header_size;
        if length > available {
            debug!(
                peer = %remote,
                declared = length,
                available,
                "Frame longer than datagram, dropped"
            );
            return false;
        }

        trace!(peer = %remote, bytes = length, "Datagram received");
        let header = ByteBuffer::copy_from(&datagram[..header_size]);
        let payload = ByteBuffer::copy_from(&datagram[header_size..header_size + length]);
        let writer: Arc<dyn Writer> = Arc::new(UdpReplyWriter::new(Arc::clone(self), remote));

        if let Err(e) = self
            .handler
            .on_command(CommandMessage::new(writer, header, payload))
        {
            debug!(error = %e, "Command handler reported an error");
        }
        true
    }

    /// Send one framed datagram to `remote`.
    ///
    /// Resolves to the number of payload bytes sent.
    pub async fn send_to(&self, remote: SocketAddr, payload: &[u8]) -> Result<usize> {
        let socket = self.socket()?;
        let mut framing = FramingCodec::new(Arc::clone(&self.codec), usize::MAX);
        let mut datagram = BytesMut::new();
        framing.encode(payload, &mut datagram)?;

        let sent = socket.send_to(&datagram, remote).await?;
        trace!(peer = %remote, bytes = sent, "Datagram sent");
        Ok(sent.saturating_sub(self.codec.header_size()))
    }

    /// Parse `host` as an IP address and send to it.
    pub async fn send_to_host(&self, host: &str, port: u16, payload: &[u8]) -> Result<usize> {
        let ip = host
            .parse::<IpAddr>()
            .map_err(|e| ProtocolError::ConfigError(format!("Invalid address '{host}': {e}")))?;
        self.send_to(SocketAddr::new(ip, port), payload).await
    }
}

impl fmt::Debug for UdpMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpMonitor")
            .field("local", &self.local)
            .field("codec", &self.codec)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Writer for replies to one datagram's sender.
#[derive(Debug)]
pub struct UdpReplyWriter {
    id: WriterId,
    monitor: Arc<UdpMonitor>,
    remote: SocketAddr,
}

impl UdpReplyWriter {
    pub fn new(monitor: Arc<UdpMonitor>, remote: SocketAddr) -> Self {
        Self {
            id: WriterId::next(),
            monitor,
            remote,
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl Writer for UdpReplyWriter {
    fn id(&self) -> WriterId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.remote)
    }

    fn write<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, Result<usize>> {
        Box::pin(self.monitor.send_to(self.remote, payload))
    }

    /// Replies share the monitor's socket, so there is nothing to close.
    fn close(&self) {}
}

/// Receive failures caused by one datagram or one peer, not by the socket.
///
/// Oversized datagrams surface as `WSAEMSGSIZE` on Windows, and an ICMP
/// unreachable from a peer shows up as a reset or refusal on the next receive.
fn is_per_datagram(e: &io::Error) -> bool {
    const WSAEMSGSIZE: i32 = 10040;
    if cfg!(windows) && e.raw_os_error() == Some(WSAEMSGSIZE) {
        return true;
    }
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Datagram socket with `SO_REUSEADDR` applied before bind.
fn bind_socket(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    Ok(UdpSocket::from_std(socket.into())?)
}
