//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener and a `tokio-tungstenite` client so the
//! frames actually cross a socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use duelroom_transport::{Connection, Transport, WebSocketTransport};
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect_client(addr: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        ws
    }

    async fn bound_transport() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bound_transport().await;
        let server = tokio::spawn(async move { transport.accept().await.expect("accept") });
        let mut client = connect_client(&addr).await;
        let conn = server.await.expect("task should complete");

        assert!(conn.id().into_inner() > 0);

        conn.send(br#"{"type":"pong"}"#).await.expect("send");
        let msg = client.next().await.expect("frame").expect("ok");
        assert!(msg.is_text(), "JSON frames go out as text");
        assert_eq!(msg.into_data().as_ref(), br#"{"type":"pong"}"#);

        client
            .send(Message::text(r#"{"type":"ping"}"#))
            .await
            .expect("client send");
        let received = conn.recv().await.expect("recv").expect("some");
        assert_eq!(received, br#"{"type":"ping"}"#);
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_close() {
        let (mut transport, addr) = bound_transport().await;
        let server = tokio::spawn(async move { transport.accept().await.expect("accept") });
        let mut client = connect_client(&addr).await;
        let conn = server.await.expect("task");

        client.close(None).await.expect("close");

        let received = conn.recv().await.expect("recv");
        assert!(received.is_none(), "clean close should yield None");
    }

    #[tokio::test]
    async fn test_websocket_send_while_recv_pending() {
        // A reader parked in recv() must not block a concurrent send().
        let (mut transport, addr) = bound_transport().await;
        let server = tokio::spawn(async move { transport.accept().await.expect("accept") });
        let mut client = connect_client(&addr).await;
        let conn = Arc::new(server.await.expect("task"));

        let reader = Arc::clone(&conn);
        let pending = tokio::spawn(async move { reader.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(2), conn.send(b"hello"))
            .await
            .expect("send must not wait for the reader")
            .expect("send ok");
        let msg = client.next().await.expect("frame").expect("ok");
        assert_eq!(msg.into_data().as_ref(), b"hello");

        client.send(Message::text("bye")).await.expect("client send");
        let got = pending.await.expect("join").expect("recv").expect("some");
        assert_eq!(got, b"bye");
    }

    #[tokio::test]
    async fn test_websocket_connection_ids_are_unique() {
        let (mut transport, addr) = bound_transport().await;
        let server = tokio::spawn(async move {
            let a = transport.accept().await.expect("accept a");
            let b = transport.accept().await.expect("accept b");
            (a, b)
        });
        let _c1 = connect_client(&addr).await;
        let _c2 = connect_client(&addr).await;
        let (a, b) = server.await.expect("task");
        assert_ne!(a.id(), b.id());
    }
}
