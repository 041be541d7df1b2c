//! Notification delivery engine.
//!
//! `service` is the admission surface, `dispatch` the scheduler/worker
//! pipeline, `channels` the per-transport adapters, and `triggers` the
//! bus-driven notification synthesis.

pub mod channels;
pub mod dispatch;
pub mod events;
pub mod render;
pub mod service;
pub mod triggers;
pub mod types;

pub use service::NotificationService;
pub use types::{NotificationChannel, NotificationPriority, NotificationStatus};
