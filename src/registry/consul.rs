//! Consul agent registry backend.
//!
//! Uses the agent HTTP API with TTL checks: registration declares a TTL
//! check, the heartbeat worker passes it, and Consul deregisters the
//! instance after the critical grace window.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Registration, RegistryError, ServiceInstance, ServiceRegistry};

const HTTP_TIMEOUT_SECS: u64 = 5;

pub struct ConsulRegistry {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct RegisterBody {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Tags")]
    tags: Vec<String>,
    #[serde(rename = "Meta")]
    meta: HashMap<String, String>,
    #[serde(rename = "Check")]
    check: CheckBody,
}

#[derive(Debug, Serialize)]
struct CheckBody {
    #[serde(rename = "TTL")]
    ttl: String,
    #[serde(rename = "DeregisterCriticalServiceAfter")]
    deregister_after: String,
}

#[derive(Debug, Deserialize)]
struct HealthEntry {
    #[serde(rename = "Service")]
    service: HealthService,
}

#[derive(Debug, Deserialize)]
struct HealthService {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Tags", default)]
    tags: Vec<String>,
    #[serde(rename = "Meta", default)]
    meta: HashMap<String, String>,
}

impl ConsulRegistry {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn put(&self, path: &str, body: Option<&RegisterBody>) -> Result<(), RegistryError> {
        let mut request = self.client.put(format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::Unavailable(format!(
                "{path} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    async fn register(&self, registration: &Registration) -> Result<String, RegistryError> {
        let instance_id = format!("{}-{}", registration.name, uuid::Uuid::new_v4());
        let ttl_secs = registration.ttl.as_secs().max(1);

        let body = RegisterBody {
            id: instance_id.clone(),
            name: registration.name.clone(),
            address: registration.host.clone(),
            port: registration.port,
            tags: registration.tags.clone(),
            meta: registration.metadata.clone(),
            check: CheckBody {
                ttl: format!("{ttl_secs}s"),
                deregister_after: format!("{}s", ttl_secs * 3),
            },
        };

        self.put("/v1/agent/service/register", Some(&body)).await?;
        tracing::info!(instance_id = %instance_id, "Registered with Consul");
        Ok(instance_id)
    }

    async fn refresh(&self, instance_id: &str) -> Result<(), RegistryError> {
        self.put(&format!("/v1/agent/check/pass/service:{instance_id}"), None)
            .await
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError> {
        self.put(&format!("/v1/agent/service/deregister/{instance_id}"), None)
            .await
    }

    async fn lookup(&self, service_name: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let response = self
            .client
            .get(format!("{}/v1/health/service/{service_name}", self.base_url))
            .query(&[("passing", "true")])
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::Unavailable(format!(
                "health query returned {}",
                response.status()
            )));
        }

        let entries: Vec<HealthEntry> = response
            .json()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        let mut instances: Vec<ServiceInstance> = entries
            .into_iter()
            .map(|entry| ServiceInstance {
                id: entry.service.id,
                name: entry.service.service,
                host: entry.service.address,
                port: entry.service.port,
                tags: entry.service.tags,
                metadata: entry.service.meta,
                last_refresh: None,
            })
            .collect();

        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }
}
