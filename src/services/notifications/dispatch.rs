//! Dispatch pipeline
//!
//! A scheduler promotes due `pending` rows to `sending` and hands them to a
//! bounded pool of delivery workers over an internal channel; the channel
//! provides backpressure when the pool falls behind. Workers call the
//! channel adapter, record the outcome, and publish lifecycle events.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::bus::{publish_best_effort, EventBus};
use crate::config_utils;
use crate::db::Pool;
use crate::models::Notification;
use crate::repository::{batches as batch_repo, notifications as notification_repo};

use super::channels::{ChannelAdapter, ChannelError, ChannelSuccess};
use super::events;
use super::types::{NotificationChannel, NotificationPriority, NotificationStatus};

/// Rows the scheduler promotes per wakeup.
const SCHEDULER_BATCH: i64 = 500;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub scheduler_interval: Duration,
    pub workers: usize,
    pub queue_size: usize,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub provider_timeout: Duration,
    pub in_app_publish_delivered: bool,
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        Self {
            scheduler_interval: config_utils::get_scheduler_interval(),
            workers: config_utils::get_delivery_workers(),
            queue_size: config_utils::get_delivery_queue_size(),
            backoff_base_secs: config_utils::get_backoff_base_secs(),
            backoff_cap_secs: config_utils::get_backoff_cap_secs(),
            provider_timeout: config_utils::get_provider_timeout(),
            in_app_publish_delivered: config_utils::get_in_app_publish_delivered(),
        }
    }
}

/// Retry schedule: `min(cap, base * 2^retry_count) * uniform(0.5, 1.5)`.
pub fn backoff_delay(base_secs: u64, cap_secs: u64, retry_count: i32) -> Duration {
    let exponent = retry_count.clamp(0, 30) as u32;
    let raw = base_secs.saturating_mul(2u64.saturating_pow(exponent));
    let capped = raw.min(cap_secs) as f64;
    let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(capped * jitter)
}

/// Handle for the running pipeline. Keeps the delivery queue open and owns
/// the scheduler/worker tasks so shutdown can stop and drain them.
pub struct Dispatcher {
    delivery_tx: mpsc::Sender<Uuid>,
    stop_tx: tokio::sync::watch::Sender<bool>,
    scheduler: tokio::task::JoinHandle<()>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the scheduler and the worker pool.
    pub fn start(
        pool: Pool,
        bus: Arc<dyn EventBus>,
        adapters: HashMap<NotificationChannel, Arc<dyn ChannelAdapter>>,
        config: DispatchConfig,
    ) -> Self {
        let (delivery_tx, delivery_rx) = mpsc::channel::<Uuid>(config.queue_size.max(1));
        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
        let shared_rx = Arc::new(Mutex::new(delivery_rx));
        let worker = Arc::new(DeliveryWorker {
            pool: pool.clone(),
            bus,
            adapters,
            config: config.clone(),
        });

        let mut workers = Vec::with_capacity(config.workers.max(1));
        for index in 0..config.workers.max(1) {
            let worker = worker.clone();
            let rx = shared_rx.clone();
            workers.push(tokio::spawn(async move {
                worker.run(index, rx).await;
            }));
        }

        let scheduler_tx = delivery_tx.clone();
        let scheduler = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.scheduler_interval);
            tracing::info!(
                interval_secs = config.scheduler_interval.as_secs(),
                workers = config.workers,
                "Notification scheduler started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match promote_due(&pool, &scheduler_tx).await {
                            Ok(0) => {}
                            Ok(count) => tracing::debug!(count, "Promoted due notifications"),
                            Err(e) => tracing::error!(error = %e, "Scheduler pass failed"),
                        }
                    }
                    // A dropped handle counts as a stop request too, so the
                    // scheduler can never outlive its Dispatcher silently.
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::info!("Notification scheduler stopped");
        });

        Self {
            delivery_tx,
            stop_tx,
            scheduler,
            workers,
        }
    }

    /// Stop the pipeline: no new promotions, then drain what the queue
    /// already holds, waiting at most `drain_timeout` for in-flight work.
    pub async fn shutdown(self, drain_timeout: Duration) {
        // Stop the scheduler between passes; its queue handle drops with it.
        let _ = self.stop_tx.send(true);
        let _ = self.scheduler.await;

        // Closing the last sender lets workers finish everything already
        // queued and then exit on their own.
        drop(self.delivery_tx);

        let drain = futures::future::join_all(self.workers);
        if tokio::time::timeout(drain_timeout, drain).await.is_err() {
            tracing::warn!(
                timeout_secs = drain_timeout.as_secs(),
                "Delivery queue drain timed out with work still in flight"
            );
        } else {
            tracing::info!("Delivery queue drained");
        }
    }
}

/// One scheduler pass: claim every due pending row in priority order and
/// queue it for delivery. The queue send blocks when the pool is saturated,
/// which is exactly the backpressure the pipeline wants.
pub async fn promote_due(pool: &Pool, delivery_tx: &mpsc::Sender<Uuid>) -> Result<usize, String> {
    let now = Utc::now().naive_utc();

    let mut due = {
        let mut conn = pool.get().map_err(|e| format!("DB error: {e}"))?;
        notification_repo::due_pending(&mut conn, now, SCHEDULER_BATCH)
            .map_err(|e| format!("due query failed: {e}"))?
    };

    // Rows arrive oldest-first; a stable sort by priority keeps FIFO within
    // each priority band while urgent jumps the queue.
    due.sort_by_key(|n| {
        Reverse(
            NotificationPriority::from_str(&n.priority)
                .map(|p| p.rank())
                .unwrap_or(1),
        )
    });

    let mut promoted = 0;
    for notification in due {
        let claimed = {
            let mut conn = pool.get().map_err(|e| format!("DB error: {e}"))?;
            notification_repo::claim_for_dispatch(&mut conn, notification.id)
                .map_err(|e| format!("claim failed: {e}"))?
        };

        // Lost the claim: another scheduler instance got there first.
        if !claimed {
            continue;
        }

        if delivery_tx.send(notification.id).await.is_err() {
            return Err("delivery queue closed".to_string());
        }
        promoted += 1;
    }

    Ok(promoted)
}

pub struct DeliveryWorker {
    pool: Pool,
    bus: Arc<dyn EventBus>,
    adapters: HashMap<NotificationChannel, Arc<dyn ChannelAdapter>>,
    config: DispatchConfig,
}

impl DeliveryWorker {
    pub fn new(
        pool: Pool,
        bus: Arc<dyn EventBus>,
        adapters: HashMap<NotificationChannel, Arc<dyn ChannelAdapter>>,
        config: DispatchConfig,
    ) -> Self {
        Self { pool, bus, adapters, config }
    }

    async fn run(&self, index: usize, rx: Arc<Mutex<mpsc::Receiver<Uuid>>>) {
        tracing::info!(worker = index, "Delivery worker started");
        loop {
            let next = { rx.lock().await.recv().await };
            match next {
                Some(notification_id) => {
                    if let Err(e) = self.process(notification_id).await {
                        tracing::error!(
                            worker = index,
                            notification_id = %notification_id,
                            error = %e,
                            "Delivery attempt failed"
                        );
                    }
                }
                None => {
                    tracing::info!(worker = index, "Delivery queue closed, worker stopping");
                    break;
                }
            }
        }
    }

    /// One delivery attempt for a claimed notification.
    pub async fn process(&self, notification_id: Uuid) -> Result<(), String> {
        let notification = {
            let mut conn = self.pool.get().map_err(|e| format!("DB error: {e}"))?;
            notification_repo::get(&mut conn, notification_id).map_err(|e| format!("load failed: {e}"))?
        };

        // Only rows we actually claimed get an attempt; anything else lost a
        // race (cancellation, another worker) and is left alone.
        if NotificationStatus::from_str(&notification.status) != Some(NotificationStatus::Sending) {
            tracing::debug!(
                notification_id = %notification_id,
                status = %notification.status,
                "Skipping row not in sending state"
            );
            return Ok(());
        }

        if let Some(batch_id) = notification.batch_id {
            let mut conn = self.pool.get().map_err(|e| format!("DB error: {e}"))?;
            batch_repo::mark_started(&mut conn, batch_id).map_err(|e| format!("batch start failed: {e}"))?;
        }

        // A deadline in the past fails without touching the provider.
        if let Some(expires_at) = notification.expires_at {
            if expires_at <= Utc::now().naive_utc() {
                return self
                    .finish_failed(&notification, "expired before dispatch", notification.retry_count)
                    .await;
            }
        }

        let outcome = self.attempt(&notification).await;
        match outcome {
            Ok(success) => self.finish_sent(&notification, success).await,
            Err(error) if error.is_retriable() => self.handle_retriable(&notification, &error).await,
            Err(error) => {
                self.finish_failed(&notification, &error.to_string(), notification.retry_count)
                    .await
            }
        }
    }

    async fn attempt(&self, notification: &Notification) -> Result<ChannelSuccess, ChannelError> {
        let channel = NotificationChannel::from_str(&notification.kind)
            .ok_or_else(|| ChannelError::Fatal(format!("unknown channel type: {}", notification.kind)))?;

        let adapter = self
            .adapters
            .get(&channel)
            .ok_or_else(|| ChannelError::Fatal(format!("no adapter for channel: {}", notification.kind)))?;

        if !adapter.is_available() {
            return Err(ChannelError::Retriable(format!(
                "channel {} unavailable",
                notification.kind
            )));
        }

        match tokio::time::timeout(self.config.provider_timeout, adapter.send(notification)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Retriable(format!(
                "provider timeout after {}s",
                self.config.provider_timeout.as_secs()
            ))),
        }
    }

    async fn finish_sent(&self, notification: &Notification, success: ChannelSuccess) -> Result<(), String> {
        let transitioned = {
            let mut conn = self.pool.get().map_err(|e| format!("DB error: {e}"))?;
            notification_repo::mark_sent(&mut conn, notification.id, success.provider_id)
                .map_err(|e| format!("mark_sent failed: {e}"))?
        };
        if !transitioned {
            return Ok(());
        }

        tracing::info!(
            notification_id = %notification.id,
            channel = %notification.kind,
            "Notification sent"
        );
        publish_best_effort(self.bus.as_ref(), events::sent(notification)).await;

        let mut delivered = false;
        // The in-app insert is a synchronous delivery; optionally surface it
        // as such on the bus.
        if notification.kind == NotificationChannel::InApp.as_str() && self.config.in_app_publish_delivered
        {
            let mut conn = self.pool.get().map_err(|e| format!("DB error: {e}"))?;
            if notification_repo::mark_delivered(&mut conn, notification.id)
                .map_err(|e| format!("mark_delivered failed: {e}"))?
            {
                delivered = true;
            }
        }
        if delivered {
            publish_best_effort(self.bus.as_ref(), events::delivered(notification)).await;
        }

        if let Some(batch_id) = notification.batch_id {
            let mut conn = self.pool.get().map_err(|e| format!("DB error: {e}"))?;
            batch_repo::increment_sent(&mut conn, batch_id).map_err(|e| format!("batch sent failed: {e}"))?;
            if delivered {
                batch_repo::increment_delivered(&mut conn, batch_id)
                    .map_err(|e| format!("batch delivered failed: {e}"))?;
            }
            self.try_complete_batch(&mut conn, batch_id)?;
        }

        Ok(())
    }

    async fn handle_retriable(&self, notification: &Notification, error: &ChannelError) -> Result<(), String> {
        let new_count = notification.retry_count + 1;

        if new_count < notification.max_retries {
            let delay = backoff_delay(self.config.backoff_base_secs, self.config.backoff_cap_secs, new_count);
            let next_attempt = Utc::now().naive_utc()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(30));

            let mut conn = self.pool.get().map_err(|e| format!("DB error: {e}"))?;
            notification_repo::reschedule_retry(
                &mut conn,
                notification.id,
                new_count,
                next_attempt,
                &error.to_string(),
            )
            .map_err(|e| format!("reschedule failed: {e}"))?;

            tracing::warn!(
                notification_id = %notification.id,
                retry_count = new_count,
                delay_secs = delay.as_secs(),
                error = %error,
                "Delivery failed, retry scheduled"
            );
            Ok(())
        } else {
            // Clamp so the recorded count never exceeds the allowance.
            let final_count = new_count.min(notification.max_retries);
            self.finish_failed(notification, &error.to_string(), final_count).await
        }
    }

    async fn finish_failed(
        &self,
        notification: &Notification,
        error: &str,
        retry_count: i32,
    ) -> Result<(), String> {
        let from = NotificationStatus::from_str(&notification.status).unwrap_or(NotificationStatus::Sending);
        let transitioned = {
            let mut conn = self.pool.get().map_err(|e| format!("DB error: {e}"))?;
            notification_repo::mark_failed(&mut conn, notification.id, from, error, Some(retry_count))
                .map_err(|e| format!("mark_failed failed: {e}"))?
        };
        if !transitioned {
            return Ok(());
        }

        tracing::warn!(
            notification_id = %notification.id,
            channel = %notification.kind,
            error,
            "Notification failed"
        );
        publish_best_effort(self.bus.as_ref(), events::failed(notification, error)).await;

        if let Some(batch_id) = notification.batch_id {
            let mut conn = self.pool.get().map_err(|e| format!("DB error: {e}"))?;
            batch_repo::increment_failed(&mut conn, batch_id)
                .map_err(|e| format!("batch failed count failed: {e}"))?;
            self.try_complete_batch(&mut conn, batch_id)?;
        }

        Ok(())
    }

    fn try_complete_batch(&self, conn: &mut crate::db::DbConnection, batch_id: Uuid) -> Result<(), String> {
        if let Some(batch) =
            batch_repo::try_complete(conn, batch_id).map_err(|e| format!("batch completion failed: {e}"))?
        {
            let bus = self.bus.clone();
            let event = events::batch_completed(&batch);
            tokio::spawn(async move {
                publish_best_effort(bus.as_ref(), event).await;
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    use crate::bus::memory::InMemoryBus;
    use crate::models::NewNotification;
    use crate::services::notifications::channels::in_app::InAppChannel;
    use crate::services::notifications::channels::ChannelResult;
    use crate::test_helpers::{setup_test_pool, CollectingHandler, TestFixtures};

    /// Adapter that replays a scripted sequence of outcomes; once the
    /// script runs out it keeps succeeding.
    struct ScriptedAdapter {
        channel: NotificationChannel,
        outcomes: StdMutex<VecDeque<ChannelResult>>,
        calls: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(channel: NotificationChannel, outcomes: Vec<ChannelResult>) -> Arc<Self> {
            Arc::new(Self {
                channel,
                outcomes: StdMutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ChannelAdapter for ScriptedAdapter {
        fn channel_type(&self) -> NotificationChannel {
            self.channel
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn send(&self, _notification: &Notification) -> ChannelResult {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(ChannelSuccess { provider_id: None }))
        }
    }

    /// Tests that run a live scheduler pass against the shared database
    /// take this lock so they cannot claim each other's due rows.
    static SCHEDULER_DB: StdMutex<()> = StdMutex::new(());

    fn test_config() -> DispatchConfig {
        DispatchConfig {
            scheduler_interval: Duration::from_secs(3600),
            workers: 1,
            queue_size: 16,
            backoff_base_secs: 30,
            backoff_cap_secs: 3600,
            provider_timeout: Duration::from_secs(5),
            in_app_publish_delivered: true,
        }
    }

    fn worker_with(
        pool: Pool,
        bus: Arc<dyn EventBus>,
        adapters: Vec<Arc<dyn ChannelAdapter>>,
    ) -> DeliveryWorker {
        let mut map: HashMap<NotificationChannel, Arc<dyn ChannelAdapter>> = HashMap::new();
        for adapter in adapters {
            map.insert(adapter.channel_type(), adapter);
        }
        DeliveryWorker::new(pool, bus, map, test_config())
    }

    /// Bus wired with a collector on every notification.* subject.
    async fn bus_with_collector() -> (Arc<dyn EventBus>, Arc<CollectingHandler>) {
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
        let collector = CollectingHandler::new();
        bus.subscribe("notification.*", collector.clone()).await.unwrap();
        (bus, collector)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    fn unique(prefix: &str) -> String {
        format!("{prefix}-{}@example.test", Uuid::new_v4())
    }

    #[tokio::test]
    async fn successful_attempt_drives_sending_to_sent() {
        let pool = setup_test_pool();
        let (bus, collector) = bus_with_collector().await;

        let recipient = unique("ok");
        let notification = {
            let mut conn = pool.get().unwrap();
            TestFixtures::create_notification(&mut conn, "email", &recipient, "sending")
        };

        let adapter = ScriptedAdapter::new(
            NotificationChannel::Email,
            vec![Ok(ChannelSuccess { provider_id: Some("prov-9".into()) })],
        );
        let worker = worker_with(pool.clone(), bus, vec![adapter.clone() as Arc<dyn ChannelAdapter>]);
        worker.process(notification.id).await.unwrap();
        settle().await;

        let mut conn = pool.get().unwrap();
        let row = notification_repo::get(&mut conn, notification.id).unwrap();
        assert_eq!(row.status, "sent");
        assert!(row.sent_at.is_some());
        assert_eq!(row.provider_id.as_deref(), Some("prov-9"));
        assert_eq!(adapter.calls(), 1);
        assert_eq!(collector.count_of("notification.sent"), 1);
        assert_eq!(collector.count_of("notification.failed"), 0);
    }

    #[tokio::test]
    async fn retry_then_success_sends_exactly_once() {
        let pool = setup_test_pool();
        let (bus, collector) = bus_with_collector().await;

        let recipient = unique("retry");
        let notification = {
            let mut conn = pool.get().unwrap();
            TestFixtures::create_notification(&mut conn, "email", &recipient, "sending")
        };

        let adapter = ScriptedAdapter::new(
            NotificationChannel::Email,
            vec![
                Err(ChannelError::Retriable("connect timeout".into())),
                Ok(ChannelSuccess { provider_id: None }),
            ],
        );
        let worker = worker_with(pool.clone(), bus, vec![adapter.clone() as Arc<dyn ChannelAdapter>]);

        // First attempt: retriable failure sends it back to pending with a
        // backoff(1) schedule.
        worker.process(notification.id).await.unwrap();
        let before = Utc::now().naive_utc();
        {
            let mut conn = pool.get().unwrap();
            let row = notification_repo::get(&mut conn, notification.id).unwrap();
            assert_eq!(row.status, "pending");
            assert_eq!(row.retry_count, 1);
            let scheduled = row.scheduled_at.expect("retry must be scheduled");
            let delay = (scheduled - before).num_seconds();
            // Nominal 60s with ±50% jitter.
            assert!((25..=95).contains(&delay), "unexpected backoff delay: {delay}s");

            // Second attempt.
            assert!(notification_repo::claim_for_dispatch(&mut conn, notification.id).unwrap());
        }
        worker.process(notification.id).await.unwrap();
        settle().await;

        let mut conn = pool.get().unwrap();
        let row = notification_repo::get(&mut conn, notification.id).unwrap();
        assert_eq!(row.status, "sent");
        assert_eq!(row.retry_count, 1);
        assert_eq!(adapter.calls(), 2);
        assert_eq!(collector.count_of("notification.sent"), 1);
        assert_eq!(collector.count_of("notification.failed"), 0);
    }

    #[tokio::test]
    async fn retries_exhausted_ends_failed() {
        let pool = setup_test_pool();
        let (bus, collector) = bus_with_collector().await;

        let notification = {
            let mut conn = pool.get().unwrap();
            notification_repo::create(
                &mut conn,
                NewNotification {
                    id: Uuid::now_v7(),
                    kind: "email".to_string(),
                    priority: "normal".to_string(),
                    recipient: unique("exhaust"),
                    template_id: None,
                    subject: None,
                    content: "body".to_string(),
                    html_content: None,
                    variables: serde_json::json!({}),
                    status: "sending".to_string(),
                    scheduled_at: None,
                    expires_at: None,
                    max_retries: 2,
                    batch_id: None,
                },
            )
            .unwrap()
        };

        let adapter = ScriptedAdapter::new(
            NotificationChannel::Email,
            vec![
                Err(ChannelError::Retriable("boom".into())),
                Err(ChannelError::Retriable("boom".into())),
            ],
        );
        let worker = worker_with(pool.clone(), bus, vec![adapter.clone() as Arc<dyn ChannelAdapter>]);

        worker.process(notification.id).await.unwrap();
        {
            let mut conn = pool.get().unwrap();
            let row = notification_repo::get(&mut conn, notification.id).unwrap();
            assert_eq!(row.status, "pending");
            assert_eq!(row.retry_count, 1);
            assert!(notification_repo::claim_for_dispatch(&mut conn, notification.id).unwrap());
        }
        worker.process(notification.id).await.unwrap();
        settle().await;

        let mut conn = pool.get().unwrap();
        let row = notification_repo::get(&mut conn, notification.id).unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.retry_count, 2);
        assert!(row.retry_count <= row.max_retries);
        assert!(row.failed_at.is_some());
        assert_eq!(adapter.calls(), 2);
        assert_eq!(collector.count_of("notification.failed"), 1);
        assert_eq!(collector.count_of("notification.sent"), 0);
    }

    #[tokio::test]
    async fn fatal_error_fails_without_retry() {
        let pool = setup_test_pool();
        let (bus, collector) = bus_with_collector().await;

        let notification = {
            let mut conn = pool.get().unwrap();
            TestFixtures::create_notification(&mut conn, "email", &unique("fatal"), "sending")
        };

        let adapter = ScriptedAdapter::new(
            NotificationChannel::Email,
            vec![Err(ChannelError::Fatal("mailbox does not exist".into()))],
        );
        let worker = worker_with(pool.clone(), bus, vec![adapter.clone() as Arc<dyn ChannelAdapter>]);
        worker.process(notification.id).await.unwrap();
        settle().await;

        let mut conn = pool.get().unwrap();
        let row = notification_repo::get(&mut conn, notification.id).unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.retry_count, 0);
        assert!(row.error_message.as_deref().unwrap().contains("mailbox does not exist"));
        assert_eq!(adapter.calls(), 1);
        assert_eq!(collector.count_of("notification.failed"), 1);
    }

    #[tokio::test]
    async fn expired_rows_fail_without_an_adapter_call() {
        let pool = setup_test_pool();
        let (bus, collector) = bus_with_collector().await;

        let notification = {
            let mut conn = pool.get().unwrap();
            notification_repo::create(
                &mut conn,
                NewNotification {
                    id: Uuid::now_v7(),
                    kind: "email".to_string(),
                    priority: "normal".to_string(),
                    recipient: unique("expired"),
                    template_id: None,
                    subject: None,
                    content: "too late".to_string(),
                    html_content: None,
                    variables: serde_json::json!({}),
                    status: "sending".to_string(),
                    scheduled_at: None,
                    expires_at: Some(Utc::now().naive_utc() - chrono::Duration::minutes(5)),
                    max_retries: 3,
                    batch_id: None,
                },
            )
            .unwrap()
        };

        let adapter = ScriptedAdapter::new(NotificationChannel::Email, vec![]);
        let worker = worker_with(pool.clone(), bus, vec![adapter.clone() as Arc<dyn ChannelAdapter>]);
        worker.process(notification.id).await.unwrap();
        settle().await;

        let mut conn = pool.get().unwrap();
        let row = notification_repo::get(&mut conn, notification.id).unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_message.as_deref(), Some("expired before dispatch"));
        assert_eq!(adapter.calls(), 0);
        assert_eq!(collector.count_of("notification.failed"), 1);
    }

    #[tokio::test]
    async fn batch_counters_converge_and_completion_fires_once() {
        let pool = setup_test_pool();
        let (bus, collector) = bus_with_collector().await;

        let (batch, ok_row, bad_row) = {
            let mut conn = pool.get().unwrap();
            let batch = TestFixtures::create_batch(&mut conn, "email", 2);

            let mut make = |recipient: String| {
                notification_repo::create(
                    &mut conn,
                    NewNotification {
                        id: Uuid::now_v7(),
                        kind: "email".to_string(),
                        priority: "normal".to_string(),
                        recipient,
                        template_id: None,
                        subject: None,
                        content: "batch row".to_string(),
                        html_content: None,
                        variables: serde_json::json!({}),
                        status: "sending".to_string(),
                        scheduled_at: None,
                        expires_at: None,
                        max_retries: 3,
                        batch_id: Some(batch.id),
                    },
                )
                .unwrap()
            };
            let ok_row = make(unique("batch-ok"));
            let bad_row = make(unique("batch-bad"));
            (batch, ok_row, bad_row)
        };

        let adapter = ScriptedAdapter::new(
            NotificationChannel::Email,
            vec![
                Ok(ChannelSuccess { provider_id: None }),
                Err(ChannelError::Fatal("rejected".into())),
            ],
        );
        let worker = worker_with(pool.clone(), bus, vec![adapter as Arc<dyn ChannelAdapter>]);
        worker.process(ok_row.id).await.unwrap();
        worker.process(bad_row.id).await.unwrap();
        settle().await;

        let mut conn = pool.get().unwrap();
        let batch = batch_repo::get(&mut conn, batch.id).unwrap();
        assert_eq!(batch.sent, 1);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.status, "completed");
        assert!(batch.completed_at.is_some());
        assert!(batch.started_at.is_some());
        assert_eq!(collector.count_of("notification.batch_completed"), 1);
    }

    #[tokio::test]
    async fn in_app_send_is_a_synchronous_delivery() {
        let pool = setup_test_pool();
        let (bus, collector) = bus_with_collector().await;

        let user = format!("inbox-user-{}", Uuid::new_v4());
        let notification = {
            let mut conn = pool.get().unwrap();
            TestFixtures::create_notification(&mut conn, "in_app", &user, "sending")
        };

        let adapter: Arc<dyn ChannelAdapter> = Arc::new(InAppChannel::new(pool.clone()));
        let worker = worker_with(pool.clone(), bus, vec![adapter]);
        worker.process(notification.id).await.unwrap();
        settle().await;

        let mut conn = pool.get().unwrap();
        let row = notification_repo::get(&mut conn, notification.id).unwrap();
        assert_eq!(row.status, "delivered");
        assert!(row.delivered_at.is_some());

        let inbox = crate::repository::in_app::list_for_user(&mut conn, &user, 10, 0, false).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title, "Test subject");

        assert_eq!(collector.count_of("notification.sent"), 1);
        assert_eq!(collector.count_of("notification.delivered"), 1);
    }

    #[tokio::test]
    async fn promote_due_orders_by_priority_then_age() {
        let _guard = SCHEDULER_DB.lock().unwrap_or_else(|e| e.into_inner());
        let pool = setup_test_pool();

        let marker = Uuid::new_v4();
        let mut own_ids = Vec::new();
        {
            let mut conn = pool.get().unwrap();
            for priority in ["low", "urgent", "normal"] {
                let row = notification_repo::create(
                    &mut conn,
                    NewNotification {
                        id: Uuid::now_v7(),
                        kind: "email".to_string(),
                        priority: priority.to_string(),
                        recipient: format!("{priority}-{marker}@example.test"),
                        template_id: None,
                        subject: None,
                        content: "ordered".to_string(),
                        html_content: None,
                        variables: serde_json::json!({}),
                        status: "pending".to_string(),
                        scheduled_at: None,
                        expires_at: None,
                        max_retries: 3,
                        batch_id: None,
                    },
                )
                .unwrap();
                own_ids.push((row.id, priority));
            }
        }

        let (tx, mut rx) = mpsc::channel::<Uuid>(600);
        promote_due(&pool, &tx).await.unwrap();
        drop(tx);

        let mut dispatched = Vec::new();
        while let Some(id) = rx.recv().await {
            dispatched.push(id);
        }

        let position = |target: Uuid| dispatched.iter().position(|id| *id == target);
        let urgent = position(own_ids[1].0).expect("urgent row dispatched");
        let normal = position(own_ids[2].0).expect("normal row dispatched");
        let low = position(own_ids[0].0).expect("low row dispatched");
        assert!(urgent < normal, "urgent must dispatch before normal");
        assert!(normal < low, "normal must dispatch before low");

        let mut conn = pool.get().unwrap();
        for (id, _) in own_ids {
            assert_eq!(notification_repo::get(&mut conn, id).unwrap().status, "sending");
        }
    }

    #[tokio::test]
    async fn shutdown_processes_queued_work_within_the_bound() {
        let _guard = SCHEDULER_DB.lock().unwrap_or_else(|e| e.into_inner());
        let pool = setup_test_pool();
        let (bus, collector) = bus_with_collector().await;

        let recipient = unique("drain");
        {
            let mut conn = pool.get().unwrap();
            TestFixtures::create_notification(&mut conn, "email", &recipient, "pending");
        }

        let adapter = ScriptedAdapter::new(NotificationChannel::Email, vec![]);
        let mut adapters: HashMap<NotificationChannel, Arc<dyn ChannelAdapter>> = HashMap::new();
        adapters.insert(NotificationChannel::Email, adapter.clone() as Arc<dyn ChannelAdapter>);

        // Long interval: the startup tick is the only scheduler pass.
        let dispatcher = Dispatcher::start(pool.clone(), bus, adapters, test_config());
        tokio::time::sleep(Duration::from_millis(300)).await;
        dispatcher.shutdown(Duration::from_secs(10)).await;

        // The queued row was delivered before the pipeline stopped.
        assert!(adapter.calls() >= 1);
        assert!(collector.count_of("notification.sent") >= 1);
    }

    #[test]
    fn backoff_growth_is_exponential_with_jitter_bounds() {
        for retry in 1..6 {
            let nominal = (30u64 * 2u64.pow(retry as u32)).min(3600) as f64;
            for _ in 0..50 {
                let delay = backoff_delay(30, 3600, retry).as_secs_f64();
                assert!(delay >= nominal * 0.5 - f64::EPSILON, "delay {delay} below jitter floor");
                assert!(delay <= nominal * 1.5 + f64::EPSILON, "delay {delay} above jitter ceiling");
            }
        }
    }

    #[test]
    fn backoff_caps_at_configured_ceiling() {
        for _ in 0..50 {
            let delay = backoff_delay(30, 3600, 20).as_secs_f64();
            assert!(delay <= 3600.0 * 1.5);
        }
    }

    #[test]
    fn backoff_first_retry_doubles_base() {
        for _ in 0..50 {
            let delay = backoff_delay(30, 3600, 1).as_secs_f64();
            assert!((30.0..=90.0).contains(&delay));
        }
    }
}
