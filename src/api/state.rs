//! Application State
//!
//! Shared state accessible by all API and WebSocket handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::analysis::{
    classifier_from_config, AnalysisCoordinator, Classifier, ClassifierError, CoordinatorConfig,
};
use crate::bus::{BusConfig, EventBus};
use crate::config::{Config, HubSettings};
use crate::relay::{RelayConfig, StrokeRelay};
use crate::session::SessionRegistry;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Connected clients
    pub registry: Arc<SessionRegistry>,
    /// Fan-out to connected clients
    pub bus: Arc<EventBus>,
    /// Stroke validation and relay
    pub relay: Arc<StrokeRelay>,
    /// Image analysis requests
    pub coordinator: Arc<AnalysisCoordinator>,
    /// Hub behavior switches
    pub settings: Arc<HubSettings>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create state with the classifier selected by configuration
    pub fn new(config: &Config) -> Result<Self, ClassifierError> {
        let classifier = classifier_from_config(&config.classifier)?;
        Ok(Self::with_classifier(config, classifier))
    }

    /// Create state around an explicit classifier
    pub fn with_classifier(config: &Config, classifier: Arc<dyn Classifier>) -> Self {
        let bus = Arc::new(EventBus::new(BusConfig {
            droppable_queue_size: config.hub.droppable_queue_size,
            critical_queue_size: config.hub.critical_queue_size,
        }));

        let relay = Arc::new(StrokeRelay::new(
            Arc::clone(&bus),
            RelayConfig {
                canvas: config.canvas,
                broadcast_clear: config.hub.broadcast_clear,
            },
        ));

        let coordinator = Arc::new(AnalysisCoordinator::new(
            classifier,
            Arc::clone(&bus),
            CoordinatorConfig {
                timeout: config.classifier.timeout(),
                retain_finished: config.classifier.retain_finished,
            },
        ));

        Self {
            registry: Arc::new(SessionRegistry::new(config.hub.max_clients)),
            bus,
            relay,
            coordinator,
            settings: Arc::new(config.hub.clone()),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// State backed by a near-instant mock classifier
    #[cfg(test)]
    pub(crate) fn for_tests(config: &Config) -> Self {
        let classifier = Arc::new(crate::analysis::MockClassifier::new(
            std::time::Duration::from_millis(5),
        ));
        Self::with_classifier(config, classifier)
    }
}
