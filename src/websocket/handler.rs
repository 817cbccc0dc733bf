//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.
//! Each connection runs a read task feeding the stroke relay and a write task
//! draining the client's event bus subscription.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;

use super::messages::{ClientMessage, ServerMessage};
use crate::api::AppState;
use crate::bus::{BusEvent, Subscription};
use crate::relay::{RelayError, SegmentMode};
use crate::session::{ClientId, ClosedSignal};

/// GET /ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    upgrade(ws, state, None, peer.map(|ConnectInfo(addr)| addr.to_string())).await
}

/// GET /ws/:label
///
/// The label is whatever the client put in the path; it is kept for display
/// only and never used as the connection identity.
pub async fn labeled_websocket_handler(
    ws: WebSocketUpgrade,
    Path(label): Path<String>,
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    upgrade(
        ws,
        state,
        Some(label),
        peer.map(|ConnectInfo(addr)| addr.to_string()),
    )
    .await
}

/// Register the client, then upgrade.
///
/// Registration happens before the upgrade so a full hub rejects the
/// handshake instead of accepting and immediately closing.
async fn upgrade(
    ws: WebSocketUpgrade,
    state: Arc<AppState>,
    label: Option<String>,
    peer: Option<String>,
) -> Response {
    let (client_id, closed) = match state.registry.register(label, peer).await {
        Ok(registered) => registered,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting WebSocket connection");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    let subscription = state.bus.subscribe(client_id);
    state.bus.send_to(
        client_id,
        BusEvent::critical(ServerMessage::Welcome { client_id }),
    );
    if state.settings.replay_on_join {
        state.relay.replay_to(client_id);
    }

    let failed_state = Arc::clone(&state);
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(client_id = %client_id, error = %e, "WebSocket upgrade failed");
        tokio::spawn(async move { disconnect(&failed_state, client_id).await });
    })
    .on_upgrade(move |socket| handle_socket(socket, state, client_id, subscription, closed))
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    client_id: ClientId,
    subscription: Subscription,
    closed: ClosedSignal,
) {
    let (mut sender, mut receiver) = socket.split();

    // Task to forward bus events to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            match serde_json::to_string(&event.message) {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        tracing::debug!(
                            client_id = %client_id,
                            "WebSocket send failed, closing connection"
                        );
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                }
            }
        }
        // Subscription closed by the hub
        let _ = sender.send(Message::Close(None)).await;
    });

    let state_for_recv = Arc::clone(&state);

    // Task to receive frames from the WebSocket and dispatch them
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&state_for_recv, client_id, msg) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        client_id = %client_id,
                        error = %e,
                        "Connection lost"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
        _ = closed => {
            send_task.abort();
            recv_task.abort();
        }
    }

    disconnect(&state, client_id).await;
}

/// Release everything a connection holds. Safe to call more than once.
async fn disconnect(state: &AppState, client_id: ClientId) {
    state.bus.unsubscribe(client_id);
    state.registry.unregister(client_id).await;
    state.relay.forget_client(client_id);
}

/// Handle a received WebSocket frame
///
/// Returns false if the connection should be closed.
fn handle_ws_message(state: &AppState, client_id: ClientId, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_client_message(state, client_id, client_msg),
                Err(e) => {
                    tracing::debug!(
                        client_id = %client_id,
                        error = %e,
                        "Malformed client message dropped"
                    );
                    reply_error(state, client_id, format!("Invalid message format: {}", e));
                }
            }
            true
        }
        Message::Binary(_) => {
            reply_error(state, client_id, "Binary messages not supported");
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(client_id = %client_id, "Client requested close");
            false
        }
    }
}

/// Dispatch a parsed client message
fn handle_client_message(state: &AppState, client_id: ClientId, message: ClientMessage) {
    let outcome = match message {
        ClientMessage::Drawing(segment) => state
            .relay
            .on_segment(client_id, segment.id, segment.points, SegmentMode::Snapshot)
            .map(|_| ()),
        ClientMessage::Append(segment) => state
            .relay
            .on_segment(client_id, segment.id, segment.points, SegmentMode::Append)
            .map(|_| ()),
        ClientMessage::StrokeEnd(stroke) => state.relay.end_stroke(client_id, stroke.id),
        ClientMessage::Clear => {
            state.relay.clear(client_id);
            Ok(())
        }
        ClientMessage::Sync => {
            state.relay.replay_to(client_id);
            Ok(())
        }
        ClientMessage::Ping => {
            state
                .bus
                .send_to(client_id, BusEvent::critical(ServerMessage::Pong));
            Ok(())
        }
    };

    match outcome {
        Ok(()) => {}
        Err(e @ RelayError::InvalidPoints(_)) => {
            tracing::debug!(client_id = %client_id, error = %e, "Malformed segment dropped");
            reply_error(state, client_id, e.to_string());
        }
        Err(e) => {
            tracing::debug!(client_id = %client_id, error = %e, "Segment discarded");
        }
    }
}

fn reply_error(state: &AppState, client_id: ClientId, message: impl Into<String>) {
    state
        .bus
        .send_to(client_id, BusEvent::critical(ServerMessage::error(message)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::relay::Point;

    async fn connected(state: &AppState) -> (ClientId, Subscription, ClosedSignal) {
        let (id, closed) = state.registry.register(None, None).await.unwrap();
        let sub = state.bus.subscribe(id);
        (id, sub, closed)
    }

    fn text(json: &str) -> Message {
        Message::Text(json.to_string())
    }

    #[tokio::test]
    async fn test_drawing_frame_relayed_to_others() {
        let state = AppState::for_tests(&Config::default());
        let (a, sub_a, _ca) = connected(&state).await;
        let (_b, sub_b, _cb) = connected(&state).await;

        assert!(handle_ws_message(
            &state,
            a,
            text(r#"{"type":"drawing","payload":{"id":"s1","points":[1,1,2,2]}}"#)
        ));

        let event = sub_b.recv().await.unwrap();
        match &event.message {
            ServerMessage::Drawing(drawing) => {
                assert_eq!(drawing.owner, a);
                assert_eq!(drawing.points, vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)]);
            }
            other => panic!("Expected Drawing, got {:?}", other),
        }
        assert_eq!(sub_a.pending(), 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection() {
        let state = AppState::for_tests(&Config::default());
        let (a, sub_a, _ca) = connected(&state).await;

        assert!(handle_ws_message(&state, a, text("{not json")));
        assert!(handle_ws_message(&state, a, Message::Binary(vec![1, 2, 3])));

        for _ in 0..2 {
            let event = sub_a.recv().await.unwrap();
            assert!(matches!(event.message, ServerMessage::Error { .. }));
        }
    }

    #[tokio::test]
    async fn test_ownership_violation_is_silent() {
        let state = AppState::for_tests(&Config::default());
        let (a, _sub_a, _ca) = connected(&state).await;
        let (b, sub_b, _cb) = connected(&state).await;
        let (_c, sub_c, _cc) = connected(&state).await;

        let frame = r#"{"type":"drawing","payload":{"id":"s1","points":[5,5]}}"#;
        handle_ws_message(&state, a, text(frame));
        handle_ws_message(&state, b, text(frame));

        // c saw only a's stroke, b got no error frame back
        assert_eq!(sub_c.pending(), 1);
        sub_b.recv().await.unwrap();
        assert_eq!(sub_b.pending(), 0);
    }

    #[tokio::test]
    async fn test_ping_and_close() {
        let state = AppState::for_tests(&Config::default());
        let (a, sub_a, _ca) = connected(&state).await;

        assert!(handle_ws_message(&state, a, text(r#"{"type":"ping"}"#)));
        assert!(matches!(sub_a.recv().await.unwrap().message, ServerMessage::Pong));

        assert!(!handle_ws_message(&state, a, Message::Close(None)));
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up() {
        let state = AppState::for_tests(&Config::default());
        let (a, sub_a, closed) = connected(&state).await;

        disconnect(&state, a).await;
        disconnect(&state, a).await;

        assert_eq!(state.registry.count().await, 0);
        assert!(!state.bus.is_subscribed(a));
        assert!(sub_a.recv().await.is_none());
        assert!(closed.await.is_ok());
    }
}
