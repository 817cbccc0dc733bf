use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use super::{
    AnalysisResult, AnalysisStatus, Classifier, ClassifierError, ImageSnapshot, RequestId,
};
use crate::bus::{BusEvent, EventBus};
use crate::session::ClientId;
use crate::websocket::ServerMessage;

/// Configuration for the analysis coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Deadline for one classifier call
    pub timeout: Duration,
    /// Finished requests kept for status lookups
    pub retain_finished: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retain_finished: 256,
        }
    }
}

struct AnalysisRequest {
    client: Option<ClientId>,
    status: AnalysisStatus,
    image_bytes: usize,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    result: Option<AnalysisResult>,
}

/// Status of a request as reported by the API
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatusView {
    pub request_id: RequestId,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    pub image_bytes: usize,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
}

#[derive(Default)]
struct RequestTable {
    requests: HashMap<RequestId, AnalysisRequest>,
    /// Terminal requests, oldest first
    finished: VecDeque<RequestId>,
    pending: usize,
}

impl RequestTable {
    /// Move a pending request to its terminal state.
    ///
    /// Returns false if the request is unknown or already terminal, so each
    /// request settles exactly once.
    fn settle(&mut self, id: RequestId, result: &AnalysisResult, retain: usize) -> bool {
        let Some(request) = self.requests.get_mut(&id) else {
            return false;
        };
        if request.status.is_terminal() {
            return false;
        }

        request.status = result.status;
        request.finished_at = Some(Utc::now());
        request.result = Some(result.clone());
        self.pending -= 1;

        self.finished.push_back(id);
        while self.finished.len() > retain {
            if let Some(old) = self.finished.pop_front() {
                self.requests.remove(&old);
            }
        }
        true
    }
}

/// Coordinates analysis requests and their broadcasts
pub struct AnalysisCoordinator {
    classifier: Arc<dyn Classifier>,
    bus: Arc<EventBus>,
    table: Arc<Mutex<RequestTable>>,
    config: CoordinatorConfig,
}

impl AnalysisCoordinator {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        bus: Arc<EventBus>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            classifier,
            bus,
            table: Arc::new(Mutex::new(RequestTable::default())),
            config,
        }
    }

    /// Start analysing `image` and return at once.
    ///
    /// The classifier runs in its own task bounded by the configured
    /// deadline; its outcome is broadcast to every client. Nothing cancels
    /// the task, including the requester disconnecting.
    pub fn submit(&self, client: Option<ClientId>, image: ImageSnapshot) -> RequestId {
        let id = Uuid::new_v4();

        {
            let mut table = lock(&self.table);
            table.requests.insert(
                id,
                AnalysisRequest {
                    client,
                    status: AnalysisStatus::Pending,
                    image_bytes: image.len(),
                    submitted_at: Utc::now(),
                    finished_at: None,
                    result: None,
                },
            );
            table.pending += 1;
        }

        tracing::info!(
            request_id = %id,
            client_id = ?client.map(|c| c.to_string()),
            bytes = image.len(),
            classifier = self.classifier.name(),
            "Analysis submitted"
        );

        let classifier = Arc::clone(&self.classifier);
        let bus = Arc::clone(&self.bus);
        let table = Arc::clone(&self.table);
        let timeout = self.config.timeout;
        let retain = self.config.retain_finished.max(1);

        tokio::spawn(async move {
            let call = AssertUnwindSafe(classifier.classify(&image)).catch_unwind();
            let outcome = tokio::time::timeout(timeout, call).await;

            let result = match outcome {
                Ok(Ok(Ok(classification))) => AnalysisResult::completed(id, classification),
                Ok(Ok(Err(e))) => {
                    tracing::warn!(request_id = %id, error = %e, "Classifier failed");
                    AnalysisResult::failed(id, &e)
                }
                Ok(Err(panic)) => {
                    let e = ClassifierError::Panicked(panic_message(&*panic));
                    tracing::error!(request_id = %id, error = %e, "Classifier panicked");
                    AnalysisResult::failed(id, &e)
                }
                Err(_) => {
                    tracing::warn!(
                        request_id = %id,
                        timeout_secs = timeout.as_secs_f64(),
                        "Classifier timed out"
                    );
                    AnalysisResult::failed(id, &ClassifierError::Timeout(timeout))
                }
            };

            if !lock(&table).settle(id, &result, retain) {
                return;
            }

            let status = result.status;
            let recipients = bus.publish(
                BusEvent::critical(ServerMessage::AnalysisResult(result)),
                None,
            );
            tracing::info!(request_id = %id, ?status, recipients, "Analysis broadcast");
        });

        id
    }

    /// Status of a pending or recently finished request
    pub fn status(&self, id: RequestId) -> Option<RequestStatusView> {
        let table = lock(&self.table);
        table.requests.get(&id).map(|request| RequestStatusView {
            request_id: id,
            status: request.status,
            client_id: request.client,
            image_bytes: request.image_bytes,
            submitted_at: request.submitted_at,
            finished_at: request.finished_at,
            result: request.result.clone(),
        })
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.table).pending
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock(table: &Mutex<RequestTable>) -> MutexGuard<'_, RequestTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Classification;
    use crate::bus::Subscription;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers after `delay` with a fixed result or error
    struct ScriptedClassifier {
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                delay,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Classifier for ScriptedClassifier {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn classify(&self, _image: &ImageSnapshot) -> Result<Classification, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ClassifierError::Api {
                    status: 500,
                    message: "model crashed".to_string(),
                });
            }
            Ok(Classification {
                description: "a cat".to_string(),
                tags: vec!["animal".to_string()],
                confidence: None,
            })
        }
    }

    struct PanickingClassifier;

    #[async_trait]
    impl Classifier for PanickingClassifier {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn classify(&self, _image: &ImageSnapshot) -> Result<Classification, ClassifierError> {
            panic!("model exploded");
        }
    }

    fn image() -> ImageSnapshot {
        ImageSnapshot::new("image/png", vec![1, 2, 3, 4])
    }

    async fn next_result(sub: &Subscription) -> AnalysisResult {
        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("no broadcast")
            .unwrap();
        match &event.message {
            ServerMessage::AnalysisResult(result) => result.clone(),
            other => panic!("Expected AnalysisResult, got {:?}", other),
        }
    }

    fn coordinator(
        classifier: Arc<dyn Classifier>,
        timeout: Duration,
    ) -> (Arc<EventBus>, AnalysisCoordinator) {
        let bus = Arc::new(EventBus::default());
        let coordinator = AnalysisCoordinator::new(
            classifier,
            Arc::clone(&bus),
            CoordinatorConfig {
                timeout,
                retain_finished: 8,
            },
        );
        (bus, coordinator)
    }

    #[tokio::test]
    async fn test_success_broadcast_to_everyone_including_requester() {
        let classifier = ScriptedClassifier::new(Duration::from_millis(10), false);
        let (bus, coordinator) = coordinator(classifier.clone(), Duration::from_secs(5));
        let requester = ClientId::new(1);
        let sub_requester = bus.subscribe(requester);
        let sub_other = bus.subscribe(ClientId::new(2));

        let id = coordinator.submit(Some(requester), image());
        assert_eq!(coordinator.status(id).unwrap().status, AnalysisStatus::Pending);

        for sub in [&sub_requester, &sub_other] {
            let result = next_result(sub).await;
            assert_eq!(result.request_id, id);
            assert_eq!(result.status, AnalysisStatus::Completed);
            assert_eq!(result.description, "a cat");
            assert_eq!(result.tags, vec!["animal"]);
        }

        let view = coordinator.status(id).unwrap();
        assert_eq!(view.status, AnalysisStatus::Completed);
        assert_eq!(view.client_id, Some(requester));
        assert!(view.finished_at.is_some());
        assert_eq!(coordinator.pending_count(), 0);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_classifier_error_broadcasts_failure() {
        let classifier = ScriptedClassifier::new(Duration::from_millis(1), true);
        let (bus, coordinator) = coordinator(classifier, Duration::from_secs(5));
        let sub = bus.subscribe(ClientId::new(1));

        let id = coordinator.submit(None, image());
        let result = next_result(&sub).await;

        assert_eq!(result.request_id, id);
        assert_eq!(result.status, AnalysisStatus::Failed);
        assert!(result.tags.is_empty());
        assert!(result.description.contains("model crashed"));
        assert_eq!(coordinator.status(id).unwrap().status, AnalysisStatus::Failed);
    }

    #[tokio::test]
    async fn test_classifier_panic_broadcasts_failure() {
        let (bus, coordinator) =
            coordinator(Arc::new(PanickingClassifier), Duration::from_secs(5));
        let sub_a = bus.subscribe(ClientId::new(1));
        let sub_b = bus.subscribe(ClientId::new(2));

        let id = coordinator.submit(Some(ClientId::new(1)), image());

        for sub in [&sub_a, &sub_b] {
            let result = next_result(sub).await;
            assert_eq!(result.request_id, id);
            assert_eq!(result.status, AnalysisStatus::Failed);
            assert!(result.tags.is_empty());
            assert!(result.description.contains("model exploded"));
        }
        assert_eq!(coordinator.status(id).unwrap().status, AnalysisStatus::Failed);
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_broadcasts_failure_once() {
        let classifier = ScriptedClassifier::new(Duration::from_secs(60), false);
        let (bus, coordinator) = coordinator(classifier, Duration::from_millis(50));
        let sub = bus.subscribe(ClientId::new(1));

        let id = coordinator.submit(Some(ClientId::new(1)), image());
        let result = next_result(&sub).await;

        assert_eq!(result.status, AnalysisStatus::Failed);
        assert!(result.tags.is_empty());
        assert!(result.description.contains("did not respond"));
        assert_eq!(coordinator.status(id).unwrap().status, AnalysisStatus::Failed);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sub.pending(), 0);
    }

    #[tokio::test]
    async fn test_requester_disconnect_does_not_cancel() {
        let classifier = ScriptedClassifier::new(Duration::from_millis(20), false);
        let (bus, coordinator) = coordinator(classifier, Duration::from_secs(5));
        let requester = ClientId::new(1);
        let _sub_requester = bus.subscribe(requester);
        let sub_other = bus.subscribe(ClientId::new(2));

        let id = coordinator.submit(Some(requester), image());
        bus.unsubscribe(requester);

        let result = next_result(&sub_other).await;
        assert_eq!(result.request_id, id);
        assert_eq!(result.status, AnalysisStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_independent() {
        let classifier = ScriptedClassifier::new(Duration::from_millis(10), false);
        let (bus, coordinator) = coordinator(classifier.clone(), Duration::from_secs(5));
        let sub = bus.subscribe(ClientId::new(1));

        let first = coordinator.submit(Some(ClientId::new(2)), image());
        let second = coordinator.submit(Some(ClientId::new(3)), image());
        assert_ne!(first, second);

        let mut seen = vec![next_result(&sub).await.request_id, next_result(&sub).await.request_id];
        seen.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(seen, expected);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_settle_happens_once() {
        let mut table = RequestTable::default();
        let id = Uuid::new_v4();
        table.requests.insert(
            id,
            AnalysisRequest {
                client: None,
                status: AnalysisStatus::Pending,
                image_bytes: 0,
                submitted_at: Utc::now(),
                finished_at: None,
                result: None,
            },
        );
        table.pending = 1;

        let done = AnalysisResult::completed(
            id,
            Classification {
                description: "a cat".to_string(),
                tags: Vec::new(),
                confidence: None,
            },
        );
        let failed = AnalysisResult::failed(id, &ClassifierError::Unavailable);

        assert!(table.settle(id, &done, 8));
        assert!(!table.settle(id, &failed, 8));
        assert_eq!(table.requests[&id].status, AnalysisStatus::Completed);
        assert_eq!(table.pending, 0);
        assert!(!table.settle(Uuid::new_v4(), &done, 8));
    }

    #[test]
    fn test_finished_history_is_bounded() {
        let mut table = RequestTable::default();
        let ids: Vec<_> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            table.requests.insert(
                *id,
                AnalysisRequest {
                    client: None,
                    status: AnalysisStatus::Pending,
                    image_bytes: 0,
                    submitted_at: Utc::now(),
                    finished_at: None,
                    result: None,
                },
            );
            table.pending += 1;
        }

        for id in &ids {
            let result = AnalysisResult::failed(*id, &ClassifierError::Unavailable);
            assert!(table.settle(*id, &result, 2));
        }

        assert!(!table.requests.contains_key(&ids[0]));
        assert!(table.requests.contains_key(&ids[1]));
        assert!(table.requests.contains_key(&ids[2]));
    }
}
