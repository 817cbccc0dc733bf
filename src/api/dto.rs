//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};

use crate::analysis::RequestId;
use crate::bus::BusStats;
use crate::session::ClientInfo;

// ============================================
// ANALYSIS DTOs
// ============================================

/// Analysis submission, as posted by the whiteboard
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    /// Canvas export as a base64 data URL
    pub image_data_url: String,
    /// Connection id of the submitter, if it has one
    #[serde(default)]
    pub client_id: Option<u64>,
}

/// Acknowledgment of a submission.
///
/// Deliberately carries no analysis: the result is broadcast over the
/// realtime channel to every client.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeAccepted {
    /// Always "accepted"
    pub status: String,
    pub request_id: RequestId,
}

// ============================================
// CLIENT DTOs
// ============================================

#[derive(Debug, Serialize)]
pub struct ClientsResponse {
    pub count: usize,
    pub max_clients: usize,
    pub clients: Vec<ClientInfo>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Root greeting
#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

/// Full health status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy or saturated
    pub status: String,
    pub clients: usize,
    pub max_clients: usize,
    pub strokes: usize,
    pub pending_analyses: usize,
    pub classifier: String,
    pub bus: BusStatsDto,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct BusStatsDto {
    pub subscribers: usize,
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub evicted_subscribers: u64,
}

impl From<BusStats> for BusStatsDto {
    fn from(stats: BusStats) -> Self {
        Self {
            subscribers: stats.subscribers,
            published: stats.published,
            delivered: stats.delivered,
            dropped: stats.dropped,
            evicted_subscribers: stats.evicted_subscribers,
        }
    }
}
