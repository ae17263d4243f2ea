//! # TCP Connector
//!
//! Dials a remote endpoint and turns the socket into a started
//! [`TcpConnection`]. A fixed local endpoint may be bound first (with
//! `SO_REUSEADDR`) for outbound connections that need a stable source port;
//! otherwise the socket is opened with `TCP_NODELAY`.
//!
//! Local setup failures are returned to the caller. The outcome of the dial
//! itself is reported exactly once through
//! [`ConnectionLifecycle::on_connected`] and also returned.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpSocket, TcpStream};
use tracing::{info, instrument, warn};

use crate::config::{FrameLimits, NetworkConfig};
use crate::core::codec::{default_codec, FrameCodec};
use crate::error::{ProtocolError, Result};
use crate::protocol::handler::{CommandHandler, ConnectionLifecycle};
use crate::transport::tcp::TcpConnection;

#[derive(Clone)]
pub struct Connector {
    codec: Arc<dyn FrameCodec>,
    limits: FrameLimits,
    local: Option<SocketAddr>,
    nodelay: bool,
    handler: Arc<dyn CommandHandler>,
    lifecycle: Arc<dyn ConnectionLifecycle>,
}

impl Connector {
    pub fn new(handler: Arc<dyn CommandHandler>, lifecycle: Arc<dyn ConnectionLifecycle>) -> Self {
        Self {
            codec: default_codec(),
            limits: FrameLimits::default(),
            local: None,
            nodelay: true,
            handler,
            lifecycle,
        }
    }

    /// Connector using the codec, limits and local endpoint from `config`.
    pub fn from_config(
        config: &NetworkConfig,
        handler: Arc<dyn CommandHandler>,
        lifecycle: Arc<dyn ConnectionLifecycle>,
    ) -> Result<Self> {
        let mut connector = Self::new(handler, lifecycle)
            .with_codec(config.transport.build_codec()?)
            .with_limits(config.limits())
            .with_nodelay(config.client.nodelay);
        if let Some(local) = config.client.local_socket_addr()? {
            connector = connector.with_local_addr(local);
        }
        Ok(connector)
    }

    pub fn with_codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_limits(mut self, limits: FrameLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Bind this local endpoint before dialing.
    pub fn with_local_addr(mut self, local: SocketAddr) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Dial `remote` and start the resulting connection.
    #[instrument(skip(self))]
    pub async fn connect(&self, remote: SocketAddr) -> Result<Arc<TcpConnection>> {
        let socket = self.open(remote)?;

        let connection = match socket.connect(remote).await {
            Ok(stream) => self.establish(stream),
            Err(e) => Err(ProtocolError::from(e)),
        };

        match connection {
            Ok(connection) => {
                info!(
                    remote = %remote,
                    local = %connection.local_addr(),
                    id = %connection.id(),
                    "Connected"
                );
                self.lifecycle.on_connected(remote, Ok(&connection));
                connection.start()?;
                Ok(connection)
            }
            Err(e) => {
                warn!(remote = %remote, error = %e, "Connect failed");
                self.lifecycle.on_connected(remote, Err(&e));
                Err(e)
            }
        }
    }

    /// Parse `host` as an IP address and dial it.
    pub async fn connect_host(&self, host: &str, port: u16) -> Result<Arc<TcpConnection>> {
        let ip = host
            .parse::<IpAddr>()
            .map_err(|e| ProtocolError::ConfigError(format!("Invalid address '{host}': {e}")))?;
        self.connect(SocketAddr::new(ip, port)).await
    }

    fn open(&self, remote: SocketAddr) -> Result<TcpSocket> {
        let socket = if remote.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if let Some(local) = self.local {
            socket.set_reuseaddr(true)?;
            socket.bind(local)?;
        }
        Ok(socket)
    }

    fn establish(&self, stream: TcpStream) -> Result<Arc<TcpConnection>> {
        if self.local.is_none() && self.nodelay {
            stream.set_nodelay(true)?;
        }
        TcpConnection::new(
            stream,
            Arc::clone(&self.codec),
            self.limits,
            Arc::clone(&self.handler),
            Arc::clone(&self.lifecycle),
        )
    }
}
