//! Analysis Coordinator
//!
//! Runs image analyses against the external classifier and broadcasts every
//! outcome to all connected clients.
//!
//! The submission path only acknowledges; the result always travels over the
//! realtime channel, including back to the requester.

mod classifier;
mod coordinator;
mod snapshot;

pub use classifier::{
    from_config as classifier_from_config, Classification, Classifier, ClassifierError,
    HttpClassifier, MockClassifier,
};
pub use coordinator::{AnalysisCoordinator, CoordinatorConfig, RequestStatusView};
pub use snapshot::{ImageSnapshot, SnapshotError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of an analysis request
pub type RequestId = Uuid;

/// Lifecycle of an analysis request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisStatus::Pending)
    }
}

/// Outcome broadcast to every client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub request_id: RequestId,
    pub status: AnalysisStatus,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl AnalysisResult {
    pub fn completed(request_id: RequestId, classification: Classification) -> Self {
        Self {
            request_id,
            status: AnalysisStatus::Completed,
            description: classification.description,
            tags: classification.tags,
            confidence: classification.confidence,
        }
    }

    /// Failure-shaped result so waiting clients never hang silently
    pub fn failed(request_id: RequestId, reason: &ClassifierError) -> Self {
        Self {
            request_id,
            status: AnalysisStatus::Failed,
            description: format!("Analysis failed: {}", reason),
            tags: Vec::new(),
            confidence: None,
        }
    }
}
