//! Application-facing callbacks.
//!
//! [`CommandHandler`] receives every parsed frame. [`ConnectionLifecycle`]
//! decides admission of accepted connections and observes dial results and
//! closures. Both are invoked from the task driving the transport, so they
//! must not block; spawn a task for anything slow.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::core::codec::FrameCodec;
use crate::core::message::CommandMessage;
use crate::error::{ProtocolError, Result};
use crate::transport::tcp::TcpConnection;

pub trait CommandHandler: Send + Sync {
    /// Called once per complete frame, in arrival order per connection or
    /// monitor. An error is logged and otherwise ignored.
    fn on_command(&self, message: CommandMessage) -> Result<()>;
}

impl<F> CommandHandler for F
where
    F: Fn(CommandMessage) -> Result<()> + Send + Sync,
{
    fn on_command(&self, message: CommandMessage) -> Result<()> {
        self(message)
    }
}

/// Outcome of the admission hook for an accepted connection.
#[derive(Debug, Clone)]
pub enum Admission {
    /// Start the connection with the acceptor's codec.
    Accept,
    /// Start the connection with a different codec.
    AcceptWith(Arc<dyn FrameCodec>),
    /// Close the connection without starting it.
    Refuse,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Admission::Refuse)
    }
}

impl From<bool> for Admission {
    fn from(accept: bool) -> Self {
        if accept {
            Admission::Accept
        } else {
            Admission::Refuse
        }
    }
}

pub trait ConnectionLifecycle: Send + Sync {
    /// Admission hook for a freshly accepted connection.
    fn on_connect(&self, _connection: &Arc<TcpConnection>) -> Admission {
        Admission::Accept
    }

    /// Result of an outbound dial, reported exactly once per attempt.
    fn on_connected(
        &self,
        _remote: SocketAddr,
        _outcome: std::result::Result<&Arc<TcpConnection>, &ProtocolError>,
    ) {
    }

    /// A started connection reached its terminal state.
    fn on_close(&self, _connection: &Arc<TcpConnection>, _error: &ProtocolError) {}
}

/// Accepts everything and ignores notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLifecycle;

impl ConnectionLifecycle for DefaultLifecycle {}
