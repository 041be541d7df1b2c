//! NATS-backed event bus.
//!
//! Thin wrapper over the core NATS client: subjects map 1:1 to envelope
//! `type` strings, wildcard patterns are passed through (NATS `*` has the
//! same single-token semantics the contract requires), and handlers of the
//! same name share a queue group so replicas split the work.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{BusError, BusEvent, EventBus, EventHandler};

pub struct NatsBus {
    client: async_nats::Client,
    queue_group: String,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl NatsBus {
    pub async fn connect(url: &str, queue_group: impl Into<String>) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        tracing::info!(url, "Connected to NATS");
        Ok(Self {
            client,
            queue_group: queue_group.into(),
            subscriptions: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, event: BusEvent) -> Result<(), BusError> {
        let payload = serde_json::to_vec(&event).map_err(|e| BusError::Serialization(e.to_string()))?;
        self.client
            .publish(event.event_type.clone(), payload.into())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))
    }

    async fn subscribe(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> Result<(), BusError> {
        // One queue group per handler name: each logical consumer gets every
        // matching event once, while replicas of the same service share it.
        let group = format!("{}-{}", self.queue_group, handler.name());
        let mut subscriber = self
            .client
            .queue_subscribe(pattern.to_string(), group)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let pattern = pattern.to_string();
        let task = tokio::spawn(async move {
            tracing::info!(handler = handler.name(), pattern = %pattern, "Bus subscription started");

            while let Some(message) = subscriber.next().await {
                let event: BusEvent = match serde_json::from_slice(&message.payload) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(
                            subject = %message.subject,
                            error = %e,
                            "Dropping non-envelope message"
                        );
                        continue;
                    }
                };

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

            tracing::info!(handler = handler.name(), pattern = %pattern, "Bus subscription ended");
        });

        self.subscriptions.lock().expect("Mutex poisoned").push(task);
        Ok(())
    }

    async fn unsubscribe_all(&self) {
        // Aborting a consumer task drops its subscriber, which unsubscribes
        // on the server side.
        let tasks = std::mem::take(&mut *self.subscriptions.lock().expect("Mutex poisoned"));
        let count = tasks.len();
        for task in tasks {
            task.abort();
        }
        tracing::info!(count, "Bus subscriptions cancelled");
    }

    async fn close(&self) {
        if let Err(e) = self.client.flush().await {
            tracing::warn!(error = %e, "NATS flush failed during shutdown");
        }
    }
}
