//! In-process registry used when no Consul agent is configured.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{Registration, RegistryError, ServiceInstance, ServiceRegistry};

/// Grace multiplier: an instance whose TTL has lapsed is hidden from lookup
/// immediately but only evicted after this many TTL periods without a
/// refresh.
const DEREGISTER_GRACE: u32 = 3;

struct Entry {
    instance: ServiceInstance,
    ttl: Duration,
    expires_at: DateTime<Utc>,
}

pub struct MemoryRegistry {
    entries: DashMap<String, Entry>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    fn evict_expired(&self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| {
            let grace = chrono::Duration::from_std(entry.ttl * DEREGISTER_GRACE)
                .unwrap_or_else(|_| chrono::Duration::seconds(90));
            entry.expires_at + grace > now
        });
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    async fn register(&self, registration: &Registration) -> Result<String, RegistryError> {
        let instance_id = format!("{}-{}", registration.name, Uuid::new_v4());
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(registration.ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));

        let instance = ServiceInstance {
            id: instance_id.clone(),
            name: registration.name.clone(),
            host: registration.host.clone(),
            port: registration.port,
            tags: registration.tags.clone(),
            metadata: registration.metadata.clone(),
            last_refresh: Some(now),
        };

        self.entries.insert(
            instance_id.clone(),
            Entry {
                instance,
                ttl: registration.ttl,
                expires_at: now + ttl,
            },
        );

        Ok(instance_id)
    }

    async fn refresh(&self, instance_id: &str) -> Result<(), RegistryError> {
        let mut entry = self
            .entries
            .get_mut(instance_id)
            .ok_or_else(|| RegistryError::NotRegistered(instance_id.to_string()))?;

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(entry.ttl).unwrap_or_else(|_| chrono::Duration::seconds(30));
        entry.expires_at = now + ttl;
        entry.instance.last_refresh = Some(now);
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError> {
        self.entries.remove(instance_id);
        Ok(())
    }

    async fn lookup(&self, service_name: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        self.evict_expired();

        let now = Utc::now();
        let mut instances: Vec<ServiceInstance> = self
            .entries
            .iter()
            .filter(|entry| entry.instance.name == service_name && entry.expires_at > now)
            .map(|entry| entry.instance.clone())
            .collect();

        // Stable order so round-robin cycles deterministically.
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }
}
