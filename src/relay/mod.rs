//! Stroke Relay
//!
//! Validates drawing segments coming from one client, keeps an append-only
//! point log per stroke, and publishes the resulting drawing events to every
//! other client through the event bus.
//!
//! Ownership is structural: the first segment of a stroke fixes its owner and
//! any later segment from a different client is refused without an event.

mod types;

pub use types::{flat_points, DrawingEvent, Point, SegmentMode, Stroke, StrokeId};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::bus::{BusEvent, EventBus};
use crate::config::CanvasConfig;
use crate::session::ClientId;
use crate::websocket::ServerMessage;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bounding box points are clamped into
    pub canvas: CanvasConfig,
    /// `clear` wipes every stroke and is broadcast, instead of discarding only
    /// the sender's strokes
    pub broadcast_clear: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            broadcast_clear: true,
        }
    }
}

/// What a `clear` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearOutcome {
    /// Strokes discarded
    pub removed: usize,
    /// Whether the other clients were told
    pub broadcast: bool,
}

#[derive(Default)]
struct RelayState {
    strokes: HashMap<StrokeId, Stroke>,
    /// Next sequence number per client
    sequences: HashMap<ClientId, u64>,
    next_ordinal: u64,
}

impl RelayState {
    fn next_seq(&mut self, client: ClientId) -> u64 {
        let seq = self.sequences.entry(client).or_insert(0);
        *seq += 1;
        *seq
    }
}

/// Relays strokes between clients
pub struct StrokeRelay {
    state: Mutex<RelayState>,
    bus: Arc<EventBus>,
    config: RelayConfig,
}

impl StrokeRelay {
    pub fn new(bus: Arc<EventBus>, config: RelayConfig) -> Self {
        Self {
            state: Mutex::new(RelayState::default()),
            bus,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Accept a segment for `stroke_id` from `client`.
    ///
    /// Out-of-bounds points are clamped. An unseen stroke id starts a new
    /// stroke owned by `client`. On success the event is published to every
    /// client except the sender and returned.
    pub fn on_segment(
        &self,
        client: ClientId,
        stroke_id: StrokeId,
        points: Vec<Point>,
        mode: SegmentMode,
    ) -> Result<DrawingEvent, RelayError> {
        if points.is_empty() {
            return Err(RelayError::InvalidPoints("segment has no points".to_string()));
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(RelayError::InvalidPoints(
                "segment has non-finite coordinates".to_string(),
            ));
        }

        let points: Vec<Point> = points
            .into_iter()
            .map(|p| p.clamped(&self.config.canvas))
            .collect();

        let event = {
            let mut state = self.lock();

            if let Some(stroke) = state.strokes.get(&stroke_id) {
                if stroke.owner != client {
                    return Err(RelayError::OwnershipViolation {
                        stroke: stroke_id,
                        owner: stroke.owner,
                    });
                }
                if stroke.finalized {
                    return Err(RelayError::StrokeFinalized(stroke_id));
                }
            }

            let seq = state.next_seq(client);
            let ordinal = state.next_ordinal;

            let stroke = state
                .strokes
                .entry(stroke_id.clone())
                .or_insert_with(|| Stroke {
                    id: stroke_id.clone(),
                    owner: client,
                    points: Vec::new(),
                    finalized: false,
                    created_at: Utc::now(),
                    last_seq: 0,
                    ordinal,
                });
            let created = stroke.last_seq == 0;

            match mode {
                SegmentMode::Snapshot => {
                    if points.len() > stroke.points.len() {
                        let known = stroke.points.len();
                        stroke.points.extend_from_slice(&points[known..]);
                    }
                }
                SegmentMode::Append => stroke.points.extend_from_slice(&points),
            }
            stroke.last_seq = seq;

            if created {
                state.next_ordinal += 1;
                tracing::debug!(client_id = %client, stroke = %stroke_id, "Stroke started");
            }

            let event = DrawingEvent {
                id: stroke_id,
                points,
                owner: client,
                seq,
                mode,
            };

            // Published under the lock so bus order matches canvas order
            self.bus.publish(
                BusEvent::droppable(ServerMessage::Drawing(event.clone())).from_client(client),
                Some(client),
            );
            event
        };

        Ok(event)
    }

    /// Finalize a stroke; only its owner may do so
    pub fn end_stroke(&self, client: ClientId, stroke_id: StrokeId) -> Result<(), RelayError> {
        {
            let mut state = self.lock();
            let stroke = state
                .strokes
                .get_mut(&stroke_id)
                .ok_or_else(|| RelayError::UnknownStroke(stroke_id.clone()))?;

            if stroke.owner != client {
                return Err(RelayError::OwnershipViolation {
                    stroke: stroke_id,
                    owner: stroke.owner,
                });
            }
            if stroke.finalized {
                return Err(RelayError::StrokeFinalized(stroke_id));
            }
            stroke.finalized = true;

            self.bus.publish(
                BusEvent::critical(ServerMessage::StrokeEnd {
                    id: stroke_id,
                    owner: client,
                })
                .from_client(client),
                Some(client),
            );
        }
        Ok(())
    }

    /// Handle a clear request from `client`
    pub fn clear(&self, client: ClientId) -> ClearOutcome {
        let removed = {
            let mut state = self.lock();
            let before = state.strokes.len();
            if self.config.broadcast_clear {
                state.strokes.clear();
            } else {
                state.strokes.retain(|_, stroke| stroke.owner != client);
            }
            if self.config.broadcast_clear {
                self.bus.publish(
                    BusEvent::critical(ServerMessage::Clear { by: client }).from_client(client),
                    Some(client),
                );
            }
            before - state.strokes.len()
        };

        tracing::info!(
            client_id = %client,
            removed,
            broadcast = self.config.broadcast_clear,
            "Canvas cleared"
        );

        ClearOutcome {
            removed,
            broadcast: self.config.broadcast_clear,
        }
    }

    /// Every stroke on the canvas, oldest first
    pub fn snapshot(&self) -> Vec<Stroke> {
        let mut strokes: Vec<Stroke> = self.lock().strokes.values().cloned().collect();
        strokes.sort_by_key(|s| s.ordinal);
        strokes
    }

    /// Messages that rebuild the current canvas on a fresh client
    pub fn replay_messages(&self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        for stroke in self.snapshot() {
            let finalized = stroke.finalized;
            let id = stroke.id.clone();
            let owner = stroke.owner;
            messages.push(ServerMessage::Drawing(DrawingEvent {
                id: stroke.id,
                points: stroke.points,
                owner: stroke.owner,
                seq: stroke.last_seq,
                mode: SegmentMode::Snapshot,
            }));
            if finalized {
                messages.push(ServerMessage::StrokeEnd { id, owner });
            }
        }
        messages
    }

    /// Queue the current canvas for one client. Returns the strokes sent.
    ///
    /// Frames go out as replay events, so a large canvas never counts
    /// against the client's critical budget.
    pub fn replay_to(&self, client: ClientId) -> usize {
        let mut strokes = 0;
        for message in self.replay_messages() {
            let is_stroke = matches!(message, ServerMessage::Drawing(_));
            if !self.bus.send_to(client, BusEvent::replay(message)) {
                break;
            }
            if is_stroke {
                strokes += 1;
            }
        }
        tracing::debug!(client_id = %client, strokes, "Replayed canvas");
        strokes
    }

    /// Drop per-client bookkeeping once a client disconnects.
    /// Its strokes stay on the canvas.
    pub fn forget_client(&self, client: ClientId) {
        self.lock().sequences.remove(&client);
    }

    pub fn stroke_count(&self) -> usize {
        self.lock().strokes.len()
    }
}

/// Errors that can occur while relaying strokes
#[derive(Debug, Error, PartialEq)]
pub enum RelayError {
    #[error("Stroke {stroke} belongs to {owner}")]
    OwnershipViolation { stroke: StrokeId, owner: ClientId },

    #[error("Stroke {0} is already finished")]
    StrokeFinalized(StrokeId),

    #[error("Unknown stroke {0}")]
    UnknownStroke(StrokeId),

    #[error("Invalid points: {0}")]
    InvalidPoints(String),
}
