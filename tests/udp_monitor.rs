//! Datagram handling of the UDP monitor over loopback

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use common::{assert_quiet, collecting, echoing, loopback, next, WAIT};
use sockframe::config::NetworkConfig;
use sockframe::{CommandMessage, FrameLimits, LengthCodec, ProtocolError, UdpMonitor, Writer};
use tokio::net::UdpSocket;
use tokio::time::timeout;

#[tokio::test]
async fn test_malformed_datagrams_dropped_and_monitor_stays_armed() {
    let (handler, mut messages) = collecting();
    let monitor = UdpMonitor::bind(loopback(), handler).unwrap();
    monitor.start().unwrap();

    let peer = UdpSocket::bind(loopback()).await.unwrap();
    let target = monitor.local_addr();

    // Declares 9 bytes, carries 2
    peer.send_to(&[0, 0, 0, 9, 1, 2], target).await.unwrap();
    // Shorter than a header
    peer.send_to(&[0, 1], target).await.unwrap();
    // Zero length
    peer.send_to(&[0, 0, 0, 0], target).await.unwrap();
    // Valid
    peer.send_to(&[0, 0, 0, 2, b'o', b'k'], target).await.unwrap();

    let message = next(&mut messages).await;
    assert_eq!(message.data, b"ok");
    assert_eq!(message.header, vec![0, 0, 0, 2]);
    assert_eq!(message.peer, Some(peer.local_addr().unwrap()));
    assert_quiet(&mut messages).await;
}

#[tokio::test]
async fn test_reply_goes_back_to_sender() {
    let (server_handler, mut server_messages) = echoing();
    let server = UdpMonitor::bind(loopback(), server_handler).unwrap();
    server.start().unwrap();

    let (client_handler, mut client_messages) = collecting();
    let client = UdpMonitor::bind(loopback(), client_handler).unwrap();
    client.start().unwrap();

    let sent = client.send_to(server.local_addr(), b"ping").await.unwrap();
    assert_eq!(sent, 4);

    let at_server = next(&mut server_messages).await;
    assert_eq!(at_server.data, b"ping");
    assert_eq!(at_server.peer, Some(client.local_addr()));

    let reply = next(&mut client_messages).await;
    assert_eq!(reply.data, b"ping");
    assert_eq!(reply.peer, Some(server.local_addr()));
}

#[tokio::test]
async fn test_each_datagram_gets_a_fresh_writer() {
    let (handler, mut messages) = collecting();
    let monitor = UdpMonitor::bind(loopback(), handler).unwrap();
    monitor.start().unwrap();

    let peer = UdpSocket::bind(loopback()).await.unwrap();
    peer.send_to(&[0, 0, 0, 1, 1], monitor.local_addr()).await.unwrap();
    peer.send_to(&[0, 0, 0, 1, 2], monitor.local_addr()).await.unwrap();

    let first = next(&mut messages).await;
    let second = next(&mut messages).await;
    assert_eq!(first.data, vec![1]);
    assert_eq!(second.data, vec![2]);
    assert!(first.id < second.id);
}

#[tokio::test]
async fn test_send_to_frames_the_payload() {
    let (handler, _messages) = collecting();
    let monitor = UdpMonitor::bind_with(
        loopback(),
        Arc::new(LengthCodec::u16()),
        FrameLimits::default(),
        handler,
    )
    .unwrap();

    let peer = UdpSocket::bind(loopback()).await.unwrap();
    monitor
        .send_to(peer.local_addr().unwrap(), b"abc")
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let (n, from) = timeout(WAIT, peer.recv_from(&mut buf))
        .await
        .expect("datagram arrives")
        .unwrap();
    assert_eq!(&buf[..n], &[0, 3, b'a', b'b', b'c']);
    assert_eq!(from, monitor.local_addr());
}

#[tokio::test]
async fn test_send_to_host_rejects_unparsable_address() {
    let (handler, _messages) = collecting();
    let monitor = UdpMonitor::bind(loopback(), handler).unwrap();

    let result = monitor.send_to_host("nowhere", 9, b"x").await;
    assert!(matches!(result, Err(ProtocolError::ConfigError(_))));

    let port = monitor.local_addr().port();
    let sent = monitor.send_to_host("127.0.0.1", port, b"self").await.unwrap();
    assert_eq!(sent, 4);
}

#[tokio::test]
async fn test_oversized_frame_rejected_on_send() {
    let (handler, _messages) = collecting();
    let monitor = UdpMonitor::bind_with(
        loopback(),
        Arc::new(LengthCodec::u8()),
        FrameLimits::default(),
        handler,
    )
    .unwrap();

    let result = monitor.send_to(monitor.local_addr(), &[0u8; 300]).await;
    assert!(matches!(result, Err(ProtocolError::OversizedPacket(300))));
}

#[tokio::test]
async fn test_close_stops_delivery() {
    let (handler, mut messages) = collecting();
    let monitor = UdpMonitor::bind(loopback(), handler).unwrap();
    monitor.start().unwrap();
    monitor.close();
    assert!(monitor.is_closed());

    let peer = UdpSocket::bind(loopback()).await.unwrap();
    peer.send_to(&[0, 0, 0, 1, 1], monitor.local_addr())
        .await
        .unwrap();
    assert_quiet(&mut messages).await;

    let peer_addr = peer.local_addr().unwrap();
    assert!(matches!(
        monitor.send_to(peer_addr, b"after-close").await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_reply_writer_fails_after_close() {
    let (tx, mut writers) = tokio::sync::mpsc::unbounded_channel();
    let handler = move |message: CommandMessage| -> sockframe::Result<()> {
        let _ = tx.send(Arc::clone(message.writer()));
        Ok(())
    };
    let monitor = UdpMonitor::bind(loopback(), Arc::new(handler)).unwrap();
    monitor.start().unwrap();

    let peer = UdpSocket::bind(loopback()).await.unwrap();
    peer.send_to(&[0, 0, 0, 1, 7], monitor.local_addr())
        .await
        .unwrap();
    let writer = next(&mut writers).await;
    assert_eq!(writer.write(b"open").await.unwrap(), 4);

    monitor.close();
    assert!(matches!(
        writer.write(b"closed").await,
        Err(ProtocolError::ConnectionClosed)
    ));

    // Only the reply sent before close reached the peer
    let mut buf = [0u8; 64];
    let (n, _) = timeout(WAIT, peer.recv_from(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..n], &[0, 0, 0, 4, b'o', b'p', b'e', b'n']);
    assert!(
        timeout(std::time::Duration::from_millis(200), peer.recv_from(&mut buf))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_from_config() {
    let config = NetworkConfig::default_with_overrides(|c| {
        c.udp.address = "127.0.0.1:0".to_string();
        c.udp.max_datagram_size = 64;
    });
    let (handler, mut messages) = collecting();
    let monitor = UdpMonitor::from_config(&config, handler).unwrap();
    monitor.start().unwrap();

    let peer = UdpSocket::bind(loopback()).await.unwrap();
    peer.send_to(&[0, 0, 0, 3, b'c', b'f', b'g'], monitor.local_addr())
        .await
        .unwrap();
    assert_eq!(next(&mut messages).await.data, b"cfg");
}
