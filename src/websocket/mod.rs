//! Connection Gateway
//!
//! Terminates whiteboard WebSocket connections.
//!
//! ## Architecture
//!
//! - **Handler**: registers the client, upgrades, and runs one read task and
//!   one write task per connection
//! - **Messages**: client and server frame formats
//!
//! Connections never write to each other's sockets; everything flows through
//! the event bus.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8000/ws');
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'drawing') drawLine(msg.payload);
//!   if (msg.type === 'analysis_result') showAnalysis(msg.payload);
//! };
//!
//! ws.send(JSON.stringify({type: 'drawing', payload: {id: strokeId, points: [x0, y0, x1, y1]}}));
//! ```

mod handler;
mod messages;

pub use handler::{labeled_websocket_handler, websocket_handler};
pub use messages::{ClientMessage, SegmentPayload, ServerMessage, StrokeRef};
