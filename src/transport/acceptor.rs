//! # TCP Acceptor
//!
//! Listens on an endpoint, wraps every accepted socket in a
//! [`TcpConnection`] and asks the [`ConnectionLifecycle`] whether to keep it.
//!
//! ## Admission
//! - [`Admission::Accept`]: start with the acceptor's codec
//! - [`Admission::AcceptWith`]: bind the given codec, then start
//! - [`Admission::Refuse`]: close without starting; no frame is ever read
//!
//! The next accept is armed regardless of the admission outcome. An error
//! on the listening socket itself stops the acceptor.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{FrameLimits, NetworkConfig, DEFAULT_BACKLOG};
use crate::core::codec::{default_codec, FrameCodec};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handler::{Admission, CommandHandler, ConnectionLifecycle};
use crate::transport::tcp::TcpConnection;

pub struct Acceptor {
    codec: Arc<dyn FrameCodec>,
    limits: FrameLimits,
    backlog: u32,
    handler: Arc<dyn CommandHandler>,
    lifecycle: Arc<dyn ConnectionLifecycle>,
    local_addr: OnceLock<SocketAddr>,
    cancel: CancellationToken,
}

impl Acceptor {
    pub fn new(handler: Arc<dyn CommandHandler>, lifecycle: Arc<dyn ConnectionLifecycle>) -> Self {
        Self {
            codec: default_codec(),
            limits: FrameLimits::default(),
            backlog: DEFAULT_BACKLOG,
            handler,
            lifecycle,
            local_addr: OnceLock::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Acceptor using the codec, limits and backlog from `config`.
    pub fn from_config(
        config: &NetworkConfig,
        handler: Arc<dyn CommandHandler>,
        lifecycle: Arc<dyn ConnectionLifecycle>,
    ) -> Result<Self> {
        Ok(Self::new(handler, lifecycle)
            .with_codec(config.transport.build_codec()?)
            .with_limits(config.limits())
            .with_backlog(config.server.backlog))
    }

    /// Default codec for accepted connections.
    pub fn with_codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_limits(mut self, limits: FrameLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Bound address once [`start`](Self::start) succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Bind, listen and start accepting in a background task.
    ///
    /// Bind and listen failures are returned directly. Returns the bound
    /// address, which differs from `endpoint` when port 0 was requested.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    #[instrument(skip(self))]
    pub fn start(self: &Arc<Self>, endpoint: SocketAddr) -> Result<SocketAddr> {
        if self.local_addr.get().is_some() {
            return Err(ProtocolError::Custom(constants::ERR_ACCEPTOR_STARTED.into()));
        }
        let listener = bind_listener(endpoint, self.backlog)?;
        let local = listener.local_addr()?;
        let _ = self.local_addr.set(local);
        info!(address = %local, "Listening");

        tokio::spawn(Arc::clone(self).accept_loop(listener));
        Ok(local)
    }

    /// Stop accepting. Connections already started are unaffected.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut incoming = TcpListenerStream::new(listener);

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = incoming.next() => next,
            };
            match next {
                Some(Ok(stream)) => self.admit(stream),
                Some(Err(e)) => {
                    error!(error = %e, "Accept failed, acceptor stopping");
                    self.cancel.cancel();
                    break;
                }
                None => break,
            }
        }

        info!("Acceptor stopped");
    }

    fn admit(&self, stream: TcpStream) {
        let connection = match TcpConnection::new(
            stream,
            Arc::clone(&self.codec),
            self.limits,
            Arc::clone(&self.handler),
            Arc::clone(&self.lifecycle),
        ) {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "Dropping accepted socket");
                return;
            }
        };
        let peer = connection.peer_addr();

        let codec = match self.lifecycle.on_connect(&connection) {
            Admission::Accept => None,
            Admission::AcceptWith(codec) => Some(codec),
            Admission::Refuse => {
                warn!(peer = %peer, "Connection refused by admission policy");
                connection.close();
                return;
            }
        };

        let started = match codec {
            Some(codec) => connection
                .set_codec(codec)
                .and_then(|()| connection.start()),
            None => connection.start(),
        };
        match started {
            Ok(()) => info!(peer = %peer, id = %connection.id(), "Accepted connection"),
            Err(e) => {
                debug!(peer = %peer, error = %e, "Accepted connection could not start");
                connection.close();
            }
        }
    }
}

/// Listening socket with `SO_REUSEADDR` applied before bind.
fn bind_listener(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    Ok(TcpListener::from_std(socket.into())?)
}
