//! Client-side load balancing across healthy registry instances.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;

use super::ServiceInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceStrategy {
    RoundRobin,
    Random,
    HealthWeighted,
    LeastConnections,
}

impl BalanceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
            Self::HealthWeighted => "health_weighted",
            Self::LeastConnections => "least_connections",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "round_robin" => Some(Self::RoundRobin),
            "random" => Some(Self::Random),
            "health_weighted" => Some(Self::HealthWeighted),
            "least_connections" => Some(Self::LeastConnections),
            _ => None,
        }
    }
}

pub struct LoadBalancer {
    strategy: BalanceStrategy,
    cursor: AtomicUsize,
    /// Open-connection counts per instance id (least_connections only).
    connections: DashMap<String, usize>,
}

impl LoadBalancer {
    pub fn new(strategy: BalanceStrategy) -> Self {
        Self {
            strategy,
            cursor: AtomicUsize::new(0),
            connections: DashMap::new(),
        }
    }

    /// Pick one instance from a healthy set. Callers pass the (stable-order)
    /// result of a registry lookup; `None` only for an empty set.
    pub fn pick<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }

        let index = match self.strategy {
            BalanceStrategy::RoundRobin => self.cursor.fetch_add(1, Ordering::Relaxed) % instances.len(),
            BalanceStrategy::Random => rand::thread_rng().gen_range(0..instances.len()),
            BalanceStrategy::HealthWeighted => self.pick_health_weighted(instances),
            BalanceStrategy::LeastConnections => self.pick_least_connections(instances),
        };

        instances.get(index)
    }

    /// Weighted random biased toward recently-refreshed instances; an
    /// instance with no refresh data gets the minimum weight.
    fn pick_health_weighted(&self, instances: &[ServiceInstance]) -> usize {
        let now = Utc::now();
        let weights: Vec<u64> = instances
            .iter()
            .map(|instance| match instance.last_refresh {
                Some(at) => {
                    let age = (now - at).num_seconds().max(0) as u64;
                    // Freshly refreshed ~60, stale asymptotically 1.
                    60 / (age + 1) + 1
                }
                None => 1,
            })
            .collect();

        let total: u64 = weights.iter().sum();
        let mut roll = rand::thread_rng().gen_range(0..total);
        for (index, weight) in weights.iter().enumerate() {
            if roll < *weight {
                return index;
            }
            roll -= weight;
        }
        instances.len() - 1
    }

    fn pick_least_connections(&self, instances: &[ServiceInstance]) -> usize {
        let mut best = 0;
        let mut best_count = usize::MAX;
        for (index, instance) in instances.iter().enumerate() {
            let count = self.connections.get(&instance.id).map(|c| *c).unwrap_or(0);
            if count < best_count {
                best = index;
                best_count = count;
            }
        }
        best
    }

    /// Track an opened connection (least_connections bookkeeping).
    pub fn acquire(&self, instance_id: &str) {
        *self.connections.entry(instance_id.to_string()).or_insert(0) += 1;
    }

    pub fn release(&self, instance_id: &str) {
        if let Some(mut count) = self.connections.get_mut(instance_id) {
            *count = count.saturating_sub(1);
        }
    }
}
