//! Integration tests for the WebSocket transport.
//!
//! These tests spin up a real WebSocket server and client on loopback to
//! verify frames, close codes and the captured request path.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use tessera_transport::{
        Connection, Frame, Transport, WebSocketConnection, WebSocketTransport,
    };
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds on a random port, connects one client to `path`, and returns
    /// both ends.
    async fn pair(path: &str) -> (WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr");

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let (client, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
                .await
                .expect("client should connect");
        let server = server_handle.await.expect("task should complete");
        (server, client)
    }

    #[tokio::test]
    async fn test_websocket_send_and_receive_text() {
        let (server_conn, mut client_ws) = pair("/gateway").await;
        assert!(server_conn.id().into_inner() > 0);
        assert_eq!(server_conn.path(), "/gateway");

        server_conn
            .send_text("hello from server")
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), "hello from server");

        client_ws
            .send(Message::Text("hello from client".to_string().into()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, Frame::Text("hello from client".into()));
    }

    #[tokio::test]
    async fn test_websocket_binary_frames_are_surfaced_as_binary() {
        let (server_conn, mut client_ws) = pair("/").await;

        client_ws
            .send(Message::Binary(vec![1u8, 2, 3].into()))
            .await
            .unwrap();
        let received = server_conn.recv().await.unwrap().unwrap();
        assert_eq!(received, Frame::Binary(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (server_conn, mut client_ws) = pair("/").await;

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_close_carries_code_and_reason() {
        let (server_conn, mut client_ws) = pair("/lobby/x/connect").await;

        server_conn
            .close(4002, "Connected from another location")
            .await
            .expect("close should succeed");

        match client_ws.next().await {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(u16::from(frame.code), 4002);
                assert_eq!(
                    frame.reason.as_str(),
                    "Connected from another location"
                );
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_send_does_not_wait_for_pending_recv() {
        let (server_conn, mut client_ws) = pair("/").await;
        let server_conn = std::sync::Arc::new(server_conn);

        let reader = std::sync::Arc::clone(&server_conn);
        let pending = tokio::spawn(async move { reader.recv().await });

        // The reader task holds the source lock; sending must still work.
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            server_conn.send_text("ping"),
        )
        .await
        .expect("send should not block")
        .expect("send should succeed");

        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), "ping");

        client_ws.send(Message::Text("pong".to_string().into())).await.unwrap();
        let got = pending.await.unwrap().unwrap();
        assert_eq!(got, Some(Frame::Text("pong".into())));
    }

    #[tokio::test]
    async fn test_plain_http_client_fails_the_upgrade() {
        use tessera_transport::TransportError;
        use tokio::io::AsyncWriteExt;

        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr");

        let client = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
                .await
                .unwrap();
            stream
        });

        let handshake = transport.accept_stream().await.expect("tcp accept");
        match handshake.complete().await {
            Err(TransportError::UpgradeFailed { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(conn) => panic!("upgrade should fail, got {conn:?}"),
        }
        drop(client.await);
    }

    #[tokio::test]
    async fn test_silent_client_handshake_times_out() {
        use std::time::Duration;
        use tessera_transport::TransportError;

        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind")
            .handshake_timeout(Duration::from_millis(100));
        let addr = transport.local_addr().expect("local addr");

        // Connects and then says nothing.
        let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();

        let handshake = transport.accept_stream().await.expect("tcp accept");
        assert_eq!(handshake.peer_addr().ip(), addr.ip());
        match tokio::time::timeout(Duration::from_secs(2), handshake.complete()).await {
            Ok(Err(TransportError::UpgradeFailed { reason, .. })) => {
                assert_eq!(reason, "handshake timed out");
            }
            Ok(other) => panic!("expected a timed-out upgrade, got {other:?}"),
            Err(_) => panic!("handshake timeout was not enforced"),
        }
    }

    #[tokio::test]
    async fn test_pending_handshake_does_not_hold_up_the_next_client() {
        use std::time::Duration;

        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr");

        let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();
        let stalled = transport.accept_stream().await.expect("tcp accept");
        let stalled = tokio::spawn(stalled.complete());

        let client = tokio::spawn(async move {
            tokio_tungstenite::connect_async(format!("ws://{addr}/gateway"))
                .await
                .map(|(ws, _)| ws)
        });
        let conn = tokio::time::timeout(Duration::from_secs(2), async {
            transport
                .accept_stream()
                .await
                .expect("tcp accept")
                .complete()
                .await
                .expect("upgrade should succeed")
        })
        .await
        .expect("second client was held up by the first");
        assert_eq!(conn.path(), "/gateway");
        assert!(client.await.unwrap().is_ok());

        stalled.abort();
    }

    #[tokio::test]
    async fn test_bind_to_taken_port_reports_address() {
        use tessera_transport::TransportError;

        let first = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap().to_string();
        match WebSocketTransport::bind(&addr).await {
            Err(TransportError::BindFailed { addr: reported, .. }) => {
                assert_eq!(reported, addr)
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second bind should fail"),
        }
    }
}
