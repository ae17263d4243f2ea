//! # sockframe
//!
//! Length-framed messages over TCP and UDP on a tokio event loop.
//!
//! Every frame is a fixed-width header announcing a payload length,
//! followed by exactly that many payload bytes. The header format is
//! pluggable through [`FrameCodec`]; the default is a 4-byte big-endian
//! length.
//!
//! ## Pieces
//! - [`Acceptor`] listens and admits connections through a
//!   [`ConnectionLifecycle`] hook, optionally choosing a codec per connection
//! - [`Connector`] dials out and starts the same state machine
//! - [`TcpConnection`] reads frames in order and writes header + payload
//! - [`UdpMonitor`] serves many peers from one socket
//! - [`CommandMessage`] carries one parsed frame, sliceable without copying
//! - [`ByteBuffer`] is the shared, immutable storage underneath
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use sockframe::{Acceptor, CommandMessage, DefaultLifecycle, Result};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<()> {
//!     let echo = |message: CommandMessage| -> Result<()> {
//!         tokio::spawn(async move {
//!             let _ = message.reply(message.data()).await;
//!         });
//!         Ok(())
//!     };
//!     let acceptor = Arc::new(Acceptor::new(Arc::new(echo), Arc::new(DefaultLifecycle)));
//!     let addr = acceptor.start("127.0.0.1:9000".parse().unwrap())?;
//!     println!("listening on {addr}");
//!     std::future::pending::<()>().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::config::{FrameLimits, NetworkConfig};
pub use crate::core::buffer::ByteBuffer;
pub use crate::core::codec::{FrameCodec, LengthCodec, MarkedLengthCodec};
pub use crate::core::message::CommandMessage;
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::handler::{
    Admission, CommandHandler, ConnectionLifecycle, DefaultLifecycle,
};
pub use crate::protocol::writer::{Writer, WriterId};
pub use crate::transport::acceptor::Acceptor;
pub use crate::transport::connector::Connector;
pub use crate::transport::tcp::TcpConnection;
pub use crate::transport::udp::{UdpMonitor, UdpReplyWriter};
