//! Shared fixtures for the socket-level integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sockframe::{
    Admission, CommandHandler, CommandMessage, ConnectionLifecycle, FrameCodec, ProtocolError,
    Result, TcpConnection, WriterId,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

/// Wait for the next item or fail the test.
pub async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Assert nothing more arrives within a short grace period.
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut UnboundedReceiver<T>) {
    if let Ok(Some(item)) = timeout(Duration::from_millis(200), rx.recv()).await {
        panic!("unexpected event: {item:?}");
    }
}

#[derive(Debug, Clone)]
pub struct Received {
    pub id: WriterId,
    pub peer: Option<SocketAddr>,
    pub header: Vec<u8>,
    pub data: Vec<u8>,
}

/// Handler forwarding every message's bytes into a channel.
pub fn collecting() -> (Arc<dyn CommandHandler>, UnboundedReceiver<Received>) {
    let (tx, rx) = unbounded_channel();
    let handler = move |message: CommandMessage| -> Result<()> {
        let _ = tx.send(Received {
            id: message.id(),
            peer: message.writer().peer_addr(),
            header: message.header().to_vec(),
            data: message.data().to_vec(),
        });
        Ok(())
    };
    (Arc::new(handler), rx)
}

/// Handler replying with the received payload and forwarding it.
pub fn echoing() -> (Arc<dyn CommandHandler>, UnboundedReceiver<Received>) {
    let (tx, rx) = unbounded_channel();
    let handler = move |message: CommandMessage| -> Result<()> {
        let _ = tx.send(Received {
            id: message.id(),
            peer: message.writer().peer_addr(),
            header: message.header().to_vec(),
            data: message.data().to_vec(),
        });
        tokio::spawn(async move {
            let _ = message.reply(message.data()).await;
        });
        Ok(())
    };
    (Arc::new(handler), rx)
}

#[derive(Debug)]
pub enum Event {
    Admitted(Arc<TcpConnection>),
    Connected(SocketAddr, std::result::Result<WriterId, String>),
    Closed(WriterId, String),
}

/// Lifecycle recording every callback; admission is configurable.
pub struct Recorder {
    events: UnboundedSender<Event>,
    refuse_first: usize,
    codec: Option<Arc<dyn FrameCodec>>,
    seen: AtomicUsize,
    closes: Mutex<Vec<WriterId>>,
}

impl Recorder {
    pub fn accepting() -> (Arc<Self>, UnboundedReceiver<Event>) {
        Self::build(0, None)
    }

    /// Refuse the first `count` accepted connections.
    pub fn refusing(count: usize) -> (Arc<Self>, UnboundedReceiver<Event>) {
        Self::build(count, None)
    }

    /// Admit every connection with `codec`.
    pub fn with_codec(codec: Arc<dyn FrameCodec>) -> (Arc<Self>, UnboundedReceiver<Event>) {
        Self::build(0, Some(codec))
    }

    fn build(
        refuse_first: usize,
        codec: Option<Arc<dyn FrameCodec>>,
    ) -> (Arc<Self>, UnboundedReceiver<Event>) {
        let (events, rx) = unbounded_channel();
        let recorder = Arc::new(Self {
            events,
            refuse_first,
            codec,
            seen: AtomicUsize::new(0),
            closes: Mutex::new(Vec::new()),
        });
        (recorder, rx)
    }

    /// Close notifications observed for `id`.
    pub fn close_count(&self, id: WriterId) -> usize {
        self.closes.lock().unwrap().iter().filter(|c| **c == id).count()
    }
}

impl ConnectionLifecycle for Recorder {
    fn on_connect(&self, connection: &Arc<TcpConnection>) -> Admission {
        let _ = self.events.send(Event::Admitted(Arc::clone(connection)));
        if self.seen.fetch_add(1, Ordering::SeqCst) < self.refuse_first {
            return Admission::Refuse;
        }
        match &self.codec {
            Some(codec) => Admission::AcceptWith(Arc::clone(codec)),
            None => Admission::Accept,
        }
    }

    fn on_connected(
        &self,
        remote: SocketAddr,
        outcome: std::result::Result<&Arc<TcpConnection>, &ProtocolError>,
    ) {
        let outcome = outcome.map(|c| c.id()).map_err(|e| e.to_string());
        let _ = self.events.send(Event::Connected(remote, outcome));
    }

    fn on_close(&self, connection: &Arc<TcpConnection>, error: &ProtocolError) {
        self.closes.lock().unwrap().push(connection.id());
        let _ = self
            .events
            .send(Event::Closed(connection.id(), error.to_string()));
    }
}

/// Next event that is not an admission.
pub async fn next_non_admission(rx: &mut UnboundedReceiver<Event>) -> Event {
    loop {
        match next(rx).await {
            Event::Admitted(_) => continue,
            other => return other,
        }
    }
}

/// Next admitted connection.
pub async fn next_admitted(rx: &mut UnboundedReceiver<Event>) -> Arc<TcpConnection> {
    loop {
        if let Event::Admitted(connection) = next(rx).await {
            return connection;
        }
    }
}

pub fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}
