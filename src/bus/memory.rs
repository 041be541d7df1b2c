//! In-memory event bus on a tokio broadcast channel.
//!
//! Used by tests and single-process deployments where no NATS server is
//! configured. Matches the delivery contract of the NATS client: fan-out to
//! every subscriber, no ordering guarantees across subjects, lagging
//! subscribers skip events.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{subject_matches, BusError, BusEvent, EventBus, EventHandler};

const DEFAULT_CAPACITY: usize = 1024;

pub struct InMemoryBus {
    sender: broadcast::Sender<BusEvent>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriptions: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, event: BusEvent) -> Result<(), BusError> {
        // A send error only means there are no subscribers right now, which
        // is fine for fire-and-forget semantics.
        let _ = self.sender.send(event);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> Result<(), BusError> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if !subject_matches(&pattern, &event.event_type) {
                            continue;
                        }
                        let subject = event.event_type.clone();
                        if let Err(e) = handler.handle(event).await {
                            tracing::error!(
                                handler = handler.name(),
                                subject = %subject,
                                error = %e,
                                "Event handler failed"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        tracing::warn!(
                            handler = handler.name(),
                            count,
                            "Subscriber lagged behind the bus"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!(handler = handler.name(), "Bus closed, subscriber stopping");
                        break;
                    }
                }
            }
        });

        self.subscriptions.lock().expect("Mutex poisoned").push(task);
        Ok(())
    }

    async fn unsubscribe_all(&self) {
        let tasks = std::mem::take(&mut *self.subscriptions.lock().expect("Mutex poisoned"));
        let count = tasks.len();
        for task in tasks {
            task.abort();
        }
        tracing::info!(count, "Bus subscriptions cancelled");
    }
}
