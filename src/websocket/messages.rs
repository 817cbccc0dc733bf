//! WebSocket Message Types
//!
//! Defines all message types for WebSocket communication between whiteboard
//! clients and the Sketchroom hub. Frames are JSON objects tagged by `type`
//! with their body under `payload`.

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::relay::{DrawingEvent, StrokeId};
use crate::session::ClientId;

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Full cumulative point list of a stroke
    Drawing(SegmentPayload),
    /// Points to append to a stroke
    Append(SegmentPayload),
    /// Pointer released; the stroke takes no further points
    StrokeEnd(StrokeRef),
    /// Clear the canvas
    Clear,
    /// Ask for the current canvas
    Sync,
    /// Ping for keepalive
    Ping,
}

/// Stroke id plus points, as sent by the drawing client
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentPayload {
    pub id: StrokeId,
    #[serde(with = "crate::relay::flat_points")]
    pub points: Vec<crate::relay::Point>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrokeRef {
    pub id: StrokeId,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Welcome {
        /// Identity assigned to this connection
        client_id: ClientId,
    },
    /// Stroke created or extended by another client
    Drawing(DrawingEvent),
    /// A stroke was finalized by its owner
    StrokeEnd { id: StrokeId, owner: ClientId },
    /// The shared canvas was cleared
    Clear { by: ClientId },
    /// Outcome of an analysis request, sent to every client
    AnalysisResult(AnalysisResult),
    /// Pong response to ping
    Pong,
    /// Error message
    Error {
        /// Error description
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{Point, SegmentMode};

    #[test]
    fn test_client_message_deserialize_drawing() {
        let json = r#"{"type": "drawing", "payload": {"id": "s1", "points": [1, 1, 2.5, 2]}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Drawing(segment) => {
                assert_eq!(segment.id, "s1");
                assert_eq!(segment.points, vec![Point::new(1.0, 1.0), Point::new(2.5, 2.0)]);
            }
            _ => panic!("Expected Drawing"),
        }
    }

    #[test]
    fn test_client_message_rejects_odd_coordinates() {
        let json = r#"{"type": "drawing", "payload": {"id": "s1", "points": [1, 1, 2]}}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_client_message_deserialize_controls() {
        let clear: ClientMessage = serde_json::from_str(r#"{"type": "clear"}"#).unwrap();
        assert!(matches!(clear, ClientMessage::Clear));

        let ping: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(ping, ClientMessage::Ping));

        let end: ClientMessage =
            serde_json::from_str(r#"{"type": "stroke_end", "payload": {"id": "s9"}}"#).unwrap();
        assert!(matches!(end, ClientMessage::StrokeEnd(StrokeRef { id }) if id == "s9"));
    }

    #[test]
    fn test_client_message_unknown_type() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "paint"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn test_server_message_serialize_drawing() {
        let msg = ServerMessage::Drawing(DrawingEvent {
            id: "s1".to_string(),
            points: vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)],
            owner: ClientId::new(4),
            seq: 2,
            mode: SegmentMode::Snapshot,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "drawing");
        assert_eq!(value["payload"]["id"], "s1");
        assert_eq!(value["payload"]["owner"], 4);
        assert_eq!(value["payload"]["seq"], 2);
        assert_eq!(value["payload"]["mode"], "snapshot");
        assert_eq!(value["payload"]["points"], serde_json::json!([1.0, 1.0, 2.0, 2.0]));
    }

    #[test]
    fn test_server_message_serialize_pong_and_welcome() {
        let json = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);

        let welcome = serde_json::to_value(&ServerMessage::Welcome {
            client_id: ClientId::new(12),
        })
        .unwrap();
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["payload"]["client_id"], 12);
    }
}
