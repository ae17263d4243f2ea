//! # Transports
//!
//! Socket-level state machines driven by the tokio runtime.
//!
//! ## Components
//! - **TcpConnection**: per-socket header/body read loop and ordered writes
//! - **Acceptor**: listen, admit, start
//! - **Connector**: dial, optionally from a fixed local endpoint, start
//! - **UdpMonitor**: one socket, many peers, one reply writer per datagram
//!
//! Every started object is kept alive by the task driving it, so dropping
//! the application's handle does not abort in-flight work. `close()` is the
//! only cancellation primitive.

pub mod acceptor;
pub mod connector;
pub mod tcp;
pub mod udp;
