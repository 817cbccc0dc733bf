//! Per-subscriber outbound queue.
//!
//! A single FIFO holds every delivery class so events from one source keep
//! their publish order. Counters per bounded class drive the overflow policy.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use super::{BusEvent, Delivery};

/// Result of enqueueing one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    /// Event queued
    Queued,
    /// Event queued after evicting the oldest droppable event
    QueuedWithDrop,
    /// Too many undelivered critical events; the queue is now closed
    Overflow,
    /// Queue was already closed
    Closed,
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<Arc<BusEvent>>,
    droppable: usize,
    critical: usize,
    closed: bool,
}

pub(crate) struct SubscriberQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    droppable_limit: usize,
    critical_limit: usize,
}

impl SubscriberQueue {
    pub(crate) fn new(droppable_limit: usize, critical_limit: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            droppable_limit: droppable_limit.max(1),
            critical_limit: critical_limit.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, event: Arc<BusEvent>) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            match event.delivery {
                Delivery::Droppable => {
                    let mut outcome = PushOutcome::Queued;
                    if state.droppable >= self.droppable_limit {
                        if let Some(pos) = state
                            .events
                            .iter()
                            .position(|e| e.delivery == Delivery::Droppable)
                        {
                            state.events.remove(pos);
                            state.droppable -= 1;
                            outcome = PushOutcome::QueuedWithDrop;
                        }
                    }
                    state.droppable += 1;
                    state.events.push_back(event);
                    outcome
                }
                Delivery::Replay => {
                    state.events.push_back(event);
                    PushOutcome::Queued
                }
                Delivery::Critical => {
                    if state.critical >= self.critical_limit {
                        state.closed = true;
                        state.events.clear();
                        state.droppable = 0;
                        state.critical = 0;
                        PushOutcome::Overflow
                    } else {
                        state.critical += 1;
                        state.events.push_back(event);
                        PushOutcome::Queued
                    }
                }
            }
        };

        self.notify.notify_one();
        outcome
    }

    fn try_pop(&self) -> Result<Option<Arc<BusEvent>>, ()> {
        let mut state = self.lock();
        if state.closed {
            return Err(());
        }
        let event = state.events.pop_front();
        if let Some(event) = &event {
            match event.delivery {
                Delivery::Droppable => state.droppable -= 1,
                Delivery::Critical => state.critical -= 1,
                Delivery::Replay => {}
            }
        }
        Ok(event)
    }

    /// Wait for the next event; `None` once the queue is closed
    pub(crate) async fn recv(&self) -> Option<Arc<BusEvent>> {
        loop {
            match self.try_pop() {
                Ok(Some(event)) => return Some(event),
                Ok(None) => self.notify.notified().await,
                Err(()) => return None,
            }
        }
    }

    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().events.len()
    }
}
