//! WebSocket transport against a real listener on an OS-assigned port.

#[cfg(feature = "websocket")]
mod websocket {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use futures_util::{SinkExt, StreamExt};
    use laneforge_transport::{
        Connection, ConnectionSlot, InboundUnit, NetHeader, Transport, TransportError,
        WebSocketConnection, WebSocketTransport,
    };
    use tokio::io::AsyncWriteExt;
    use tokio_tungstenite::tungstenite::Message;

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds, connects one client and returns both ends.
    async fn pair() -> (WebSocketConnection, Client) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = transport.bound_addr().unwrap();
        assert_eq!(transport.local_addr().unwrap(), addr);

        let accept = tokio::spawn(async move { transport.accept().await.unwrap() });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        (accept.await.unwrap(), client)
    }

    #[tokio::test]
    async fn test_websocket_units_flow_both_ways() {
        let (conn, mut client) = pair().await;

        let outgoing = NetHeader::frame(122, br#"{"local_id":5000}"#).unwrap();
        conn.send(&outgoing).await.unwrap();
        let received = client.next().await.unwrap().unwrap();
        assert_eq!(received.into_data().as_ref(), outgoing.as_slice());

        let incoming = NetHeader::frame(1, br#"{"protocol_version":1}"#).unwrap();
        client.send(Message::Binary(incoming.into())).await.unwrap();
        let bytes = conn.recv().await.unwrap().unwrap();
        let unit = InboundUnit::parse(ConnectionSlot::new(4), bytes).unwrap();
        assert_eq!(unit.slot, ConnectionSlot::new(4));
        assert_eq!(unit.message_type(), 1);

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_websocket_client_close_ends_recv() {
        let (conn, mut client) = pair().await;
        client.send(Message::Close(None)).await.unwrap();
        assert!(conn.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_websocket_text_frames_are_skipped() {
        let (conn, mut client) = pair().await;
        client.send(Message::Text("hi".into())).await.unwrap();
        let unit = NetHeader::frame(10, b"").unwrap();
        client.send(Message::Binary(unit.clone().into())).await.unwrap();
        assert_eq!(conn.recv().await.unwrap(), Some(unit));
    }

    #[tokio::test]
    async fn test_websocket_send_not_blocked_by_parked_reader() {
        let (conn, mut client) = pair().await;
        let conn = Arc::new(conn);
        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::task::yield_now().await;

        let unit = NetHeader::frame(110, b"{}").unwrap();
        conn.send(&unit).await.unwrap();
        let received = client.next().await.unwrap().unwrap();
        assert_eq!(received.into_data().as_ref(), unit.as_slice());

        client.send(Message::Close(None)).await.unwrap();
        assert!(reader.await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_websocket_plain_tcp_peer_fails_upgrade() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        let accept = tokio::spawn(async move { transport.accept().await });

        let mut tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
        tcp.write_all(b"not an http request\r\n\r\n").await.unwrap();

        let err = accept.await.unwrap().err().unwrap();
        assert!(matches!(err, TransportError::Upgrade { .. }));
        assert!(err.peer().is_some());
    }

    #[tokio::test]
    async fn test_websocket_bind_failure_names_address() {
        let err = WebSocketTransport::bind("not-an-address").await.err().unwrap();
        assert!(matches!(err, TransportError::Bind { .. }));
        assert!(err.to_string().contains("not-an-address"));
    }
}
