//! Framing behavior of TCP connections over loopback

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use common::{
    assert_quiet, collecting, echoing, loopback, next, next_admitted, next_non_admission, Event,
    Recorder, WAIT,
};
use sockframe::{Acceptor, CommandHandler, Connector, FrameLimits, ProtocolError, Writer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

fn serve(
    handler: Arc<dyn CommandHandler>,
    recorder: &Arc<Recorder>,
) -> (Arc<Acceptor>, SocketAddr) {
    let acceptor = Arc::new(Acceptor::new(handler, recorder.clone()));
    let addr = acceptor.start(loopback()).expect("acceptor starts");
    (acceptor, addr)
}

#[tokio::test]
async fn test_exact_frame_delivers_one_message() {
    let (handler, mut messages) = collecting();
    let (recorder, _events) = Recorder::accepting();
    let (_acceptor, addr) = serve(handler, &recorder);

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&[0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o'])
        .await
        .unwrap();

    let message = next(&mut messages).await;
    assert_eq!(message.header, vec![0, 0, 0, 5]);
    assert_eq!(message.data, b"hello");
    assert_eq!(message.peer, Some(client.local_addr().unwrap()));
    assert_quiet(&mut messages).await;
}

#[tokio::test]
async fn test_truncated_body_closes_exactly_once() {
    let (handler, mut messages) = collecting();
    let (recorder, mut events) = Recorder::accepting();
    let (_acceptor, addr) = serve(handler, &recorder);

    let mut client = TcpStream::connect(addr).await.unwrap();
    let admitted = next_admitted(&mut events).await;
    client.write_all(&[0, 0, 0, 5, 1, 2, 3]).await.unwrap();
    drop(client);

    match next_non_admission(&mut events).await {
        Event::Closed(id, error) => {
            assert_eq!(id, admitted.id());
            assert!(error.contains("Frame length mismatch"), "got: {error}");
        }
        other => panic!("expected close, got {other:?}"),
    }

    assert_quiet(&mut events).await;
    assert_quiet(&mut messages).await;
    assert_eq!(recorder.close_count(admitted.id()), 1);
    assert!(admitted.is_closed());
}

#[tokio::test]
async fn test_frames_delivered_in_arrival_order() {
    let (handler, mut messages) = collecting();
    let (recorder, _events) = Recorder::accepting();
    let (_acceptor, addr) = serve(handler, &recorder);

    let mut client = TcpStream::connect(addr).await.unwrap();

    // Header split from body, body split in two
    client.write_all(&[0, 0]).await.unwrap();
    client.write_all(&[0, 3, b'o']).await.unwrap();
    client.write_all(b"ne").await.unwrap();
    // Two frames in a single write
    client
        .write_all(&[0, 0, 0, 3, b't', b'w', b'o', 0, 0, 0, 5, b't', b'h', b'r', b'e', b'e'])
        .await
        .unwrap();

    let received: Vec<Vec<u8>> = vec![
        next(&mut messages).await.data,
        next(&mut messages).await.data,
        next(&mut messages).await.data,
    ];
    assert_eq!(received, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
}

#[tokio::test]
async fn test_invalid_header_closes_connection() {
    let (handler, mut messages) = collecting();
    let (recorder, mut events) = Recorder::accepting();
    let (_acceptor, addr) = serve(handler, &recorder);

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&[0, 0, 0, 0, 9, 9]).await.unwrap();

    match next_non_admission(&mut events).await {
        Event::Closed(_, error) => assert!(error.contains("Invalid frame header"), "got: {error}"),
        other => panic!("expected close, got {other:?}"),
    }

    let mut buf = [0u8; 8];
    let read = timeout(WAIT, client.read(&mut buf)).await.expect("peer closes");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert_quiet(&mut messages).await;
}

#[tokio::test]
async fn test_oversized_header_closes_connection() {
    let (handler, mut messages) = collecting();
    let (recorder, mut events) = Recorder::accepting();
    let acceptor = Arc::new(
        Acceptor::new(handler, recorder.clone()).with_limits(FrameLimits {
            max_frame_size: 16,
            ..FrameLimits::default()
        }),
    );
    let addr = acceptor.start(loopback()).unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&[0, 0, 0, 16]).await.unwrap();
    client.write_all(&[7u8; 16]).await.unwrap();
    client.write_all(&[0, 0, 0, 17]).await.unwrap();

    assert_eq!(next(&mut messages).await.data, vec![7u8; 16]);
    match next_non_admission(&mut events).await {
        Event::Closed(_, error) => assert!(error.contains("Frame too large"), "got: {error}"),
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_clean_eof_reports_connection_closed() {
    let (handler, _messages) = collecting();
    let (recorder, mut events) = Recorder::accepting();
    let (_acceptor, addr) = serve(handler, &recorder);

    let client = TcpStream::connect(addr).await.unwrap();
    let admitted = next_admitted(&mut events).await;
    drop(client);

    match next_non_admission(&mut events).await {
        Event::Closed(id, error) => {
            assert_eq!(id, admitted.id());
            assert_eq!(error, ProtocolError::ConnectionClosed.to_string());
        }
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_echo_between_acceptor_and_connector() {
    let (server_handler, mut server_messages) = echoing();
    let (server_recorder, _server_events) = Recorder::accepting();
    let (_acceptor, addr) = serve(server_handler, &server_recorder);

    let (client_handler, mut client_messages) = collecting();
    let (client_recorder, _client_events) = Recorder::accepting();
    let connector = Connector::new(client_handler, client_recorder);
    let connection = connector.connect(addr).await.expect("connects");

    let sent = connection.send(b"ping").await.unwrap();
    assert_eq!(sent, 4);

    let at_server = next(&mut server_messages).await;
    assert_eq!(at_server.data, b"ping");
    assert_eq!(at_server.peer, Some(connection.local_addr()));

    let echoed = next(&mut client_messages).await;
    assert_eq!(echoed.data, b"ping");
    assert_eq!(echoed.id, connection.id());
    assert_ne!(echoed.id, at_server.id);
}

#[tokio::test]
async fn test_close_reports_once_and_rejects_writes() {
    let (handler, _messages) = collecting();
    let (recorder, mut events) = Recorder::accepting();
    let (_acceptor, addr) = serve(handler, &recorder);

    let mut client = TcpStream::connect(addr).await.unwrap();
    let admitted = next_admitted(&mut events).await;

    admitted.close();
    admitted.close();

    match next_non_admission(&mut events).await {
        Event::Closed(id, error) => {
            assert_eq!(id, admitted.id());
            assert_eq!(error, ProtocolError::ConnectionClosed.to_string());
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_quiet(&mut events).await;

    let mut buf = [0u8; 8];
    let read = timeout(WAIT, client.read(&mut buf)).await.expect("peer closes");
    assert!(matches!(read, Ok(0) | Err(_)));

    let write = admitted.write(b"late").await;
    assert!(matches!(write, Err(ProtocolError::ConnectionClosed)));
    assert_eq!(recorder.close_count(admitted.id()), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_never_interleave() {
    const TASKS: u8 = 8;
    const FRAMES: usize = 50;

    let (server_handler, _server_messages) = collecting();
    let (server_recorder, mut server_events) = Recorder::accepting();
    let (_acceptor, addr) = serve(server_handler, &server_recorder);

    let (client_handler, mut client_messages) = collecting();
    let (client_recorder, _client_events) = Recorder::accepting();
    let _connection = Connector::new(client_handler, client_recorder)
        .connect(addr)
        .await
        .unwrap();
    let server_side = next_admitted(&mut server_events).await;

    let mut writers = Vec::new();
    for tag in 1..=TASKS {
        let connection = Arc::clone(&server_side);
        writers.push(tokio::spawn(async move {
            for i in 0..FRAMES {
                let payload = vec![tag; 100 + i * 37];
                connection.send(&payload).await.unwrap();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let mut per_tag = [0usize; TASKS as usize + 1];
    for _ in 0..(TASKS as usize * FRAMES) {
        let message = next(&mut client_messages).await;
        let tag = message.data[0];
        // A frame assembled from two writers would mix tags
        assert!(message.data.iter().all(|b| *b == tag));
        assert_eq!(message.data.len(), 100 + per_tag[tag as usize] * 37);
        per_tag[tag as usize] += 1;
    }
    assert!(per_tag[1..].iter().all(|count| *count == FRAMES));
}
