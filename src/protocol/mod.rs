//! # Protocol Roles
//!
//! The capabilities the transports talk to: [`writer::Writer`] for send
//! destinations and the [`handler`] traits implemented by the application.

pub mod handler;
pub mod writer;
