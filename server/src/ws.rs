//! WebSocket connection handler.
//!
//! Upgrades a request, registers the socket with the hub and pumps frames in
//! both directions until either side closes.

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use fanout_hub::liveness::PING_FRAME;
use fanout_hub::{
    ClientMessage, ConnectionId, ConnectionManager, Delivery, Envelope, Frame, HubError,
    PersonalMessage,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// WebSocket upgrade handler for the default channel.
pub async fn ws_default_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let channel = state.default_channel.to_string();
    ws.on_upgrade(move |socket| handle_connection(socket, channel, state))
}

/// WebSocket upgrade handler for a named channel.
pub async fn ws_channel_handler(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, channel, state))
}

/// Handles an upgraded socket for its whole lifetime.
async fn handle_connection(socket: WebSocket, channel: String, state: AppState) {
    let manager = state.manager;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = manager.outbound_channel();
    let connection_id = match manager.connect(tx, &channel).await {
        Ok(id) => id,
        Err(e) => {
            warn!(channel, error = %e, "Rejecting WebSocket connection");
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
    };

    // Single writer for the socket
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                Frame::Text(text) => {
                    let is_ping = &*text == PING_FRAME;
                    if ws_sender.send(Message::Text(text.to_string().into())).await.is_err() {
                        break;
                    }
                    // Protocol ping too; standard clients auto-reply with a pong.
                    if is_ping && ws_sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                Frame::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });
    let mut writer_done = false;

    loop {
        let incoming = tokio::select! {
            _ = &mut writer => {
                writer_done = true;
                debug!(connection_id = %connection_id, "Socket closed by hub");
                break;
            }
            incoming = ws_receiver.next() => incoming,
        };

        let msg = match incoming {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
            None => break,
        };

        match msg {
            Message::Text(text) => {
                manager.touch(connection_id).await;
                if let Err(e) = handle_text_message(&manager, connection_id, text.as_str()).await {
                    debug!(connection_id = %connection_id, error = %e, "Reply not delivered");
                }
            }
            Message::Pong(_) | Message::Ping(_) | Message::Binary(_) => {
                manager.touch(connection_id).await;
            }
            Message::Close(_) => {
                info!(connection_id = %connection_id, "WebSocket close requested");
                break;
            }
        }
    }

    manager.disconnect(connection_id, &channel).await;
    if !writer_done {
        if let Err(e) = writer.await {
            warn!(connection_id = %connection_id, error = %e, "Socket writer ended abnormally");
        }
    }
}

/// Replies to a text frame from a client.
///
/// Pongs only count as liveness; a ping gets a pong back; anything else is
/// echoed as a personal message. Returns `None` when no reply is sent.
///
/// # Errors
///
/// Returns [`HubError::Stopped`] if the hub is stopped.
pub async fn handle_text_message(
    manager: &ConnectionManager,
    id: ConnectionId,
    text: &str,
) -> Result<Option<Delivery>, HubError> {
    match ClientMessage::parse(text) {
        Some(ClientMessage::Pong) => Ok(None),
        Some(ClientMessage::Ping) => manager.send_to(id, &Envelope::pong()).await.map(Some),
        None => manager
            .send_to(id, &PersonalMessage::echo(text))
            .await
            .map(Some),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fanout_hub::HubConfig;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message as ClientFrame;

    use super::*;
    use crate::config::ServerConfig;
    use crate::server::Server;

    async fn connected() -> (ConnectionManager, ConnectionId, tokio::sync::mpsc::Receiver<Frame>) {
        let manager = ConnectionManager::new(HubConfig::default()).expect("manager");
        let (tx, rx) = manager.outbound_channel();
        let id = manager.connect(tx, "metrics").await.expect("connect");
        (manager, id, rx)
    }

    #[tokio::test]
    async fn test_free_text_is_echoed() {
        let (manager, id, mut rx) = connected().await;

        let delivery = handle_text_message(&manager, id, "hello")
            .await
            .expect("handle");
        assert_eq!(delivery, Some(Delivery::Delivered));
        assert_eq!(
            rx.recv().await,
            Some(Frame::Text(Arc::from(r#"{"message":"Message received: hello"}"#)))
        );
    }

    #[tokio::test]
    async fn test_ping_gets_pong() {
        let (manager, id, mut rx) = connected().await;

        handle_text_message(&manager, id, r#"{"type":"ping"}"#)
            .await
            .expect("handle");
        assert_eq!(rx.recv().await, Some(Frame::Text(Arc::from(r#"{"type":"pong"}"#))));
    }

    #[tokio::test]
    async fn test_pong_is_not_answered() {
        let (manager, id, mut rx) = connected().await;

        let delivery = handle_text_message(&manager, id, r#"{"type":"pong"}"#)
            .await
            .expect("handle");
        assert_eq!(delivery, None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let (manager, id, _rx) = connected().await;
        manager.disconnect(id, "metrics").await;

        let delivery = handle_text_message(&manager, id, "hello")
            .await
            .expect("handle");
        assert_eq!(delivery, Some(Delivery::UnknownConnection));
    }

    #[tokio::test]
    async fn test_reply_after_stop() {
        let (manager, id, _rx) = connected().await;
        manager.stop().await;

        let result = handle_text_message(&manager, id, "hello").await;
        assert_eq!(result, Err(HubError::Stopped));
    }

    #[tokio::test]
    async fn test_socket_answering_protocol_pings_stays_connected() {
        let config = ServerConfig::default().with_hub(HubConfig::default().with_ping_interval(100));
        let state = AppState::from_config(&config).expect("state");
        let manager = Arc::clone(&state.manager);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(Server::new(config, state).serve(listener, async move {
            let _ = shutdown_rx.await;
        }));

        // The client only reads; tungstenite answers protocol pings on its own.
        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("connect");

        let deadline = tokio::time::Instant::now() + Duration::from_millis(650);
        let mut text_pings = 0;
        let mut protocol_pings = 0;
        loop {
            match tokio::time::timeout_at(deadline, client.next()).await {
                Err(_) => break,
                Ok(Some(Ok(ClientFrame::Text(text)))) => {
                    assert_eq!(text.as_str(), PING_FRAME);
                    text_pings += 1;
                }
                Ok(Some(Ok(ClientFrame::Ping(_)))) => protocol_pings += 1,
                Ok(Some(Ok(ClientFrame::Close(_)))) | Ok(None) => {
                    panic!("server closed a responsive socket")
                }
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(e))) => panic!("socket error: {e}"),
            }
        }

        assert!(text_pings >= 3, "text pings: {text_pings}");
        assert!(protocol_pings >= 3, "protocol pings: {protocol_pings}");
        assert_eq!(manager.channel_size("metrics").await, 1);
        assert_eq!(manager.metrics().stale_evictions(), 0);

        // Free text round-trips through the real socket.
        client
            .send(ClientFrame::Text("hello".into()))
            .await
            .expect("send");
        let reply = loop {
            match client.next().await {
                Some(Ok(ClientFrame::Text(text))) if text.as_str() != PING_FRAME => break text,
                Some(Ok(_)) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        };
        assert_eq!(reply.as_str(), r#"{"message":"Message received: hello"}"#);

        let _ = shutdown_tx.send(());
        tokio_test::assert_ok!(server.await.expect("join"));
        assert_eq!(manager.connection_count().await, 0);
    }
}
