//! Service entrypoint: wires the store, event bus, registry, delivery
//! pipeline and both HTTP surfaces into one long-running process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use dotenv::dotenv;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

use backend::bus::dedup::DedupCache;
use backend::bus::memory::InMemoryBus;
use backend::bus::nats::NatsBus;
use backend::bus::EventBus;
use backend::config_utils;
use backend::db;
use backend::handlers;
use backend::registry::consul::ConsulRegistry;
use backend::registry::memory::MemoryRegistry;
use backend::registry::{spawn_heartbeat, Registration, ServiceRegistry};
use backend::services::audit::{AuditCapture, AuditService};
use backend::services::notifications::channels::{
    email::EmailChannel, in_app::InAppChannel, push::PushChannel, sms::SmsChannel,
    webhook::WebhookChannel, ChannelAdapter,
};
use backend::services::notifications::dispatch::{DispatchConfig, Dispatcher};
use backend::services::notifications::triggers::NotificationTriggers;
use backend::services::notifications::{NotificationChannel, NotificationService};

/// Upper bound on waiting for in-flight deliveries during shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = config_utils::get_database_url().expect("DATABASE_URL must be set");
    let pool = db::establish_pool(&database_url);

    // Event bus: NATS when configured, in-process broadcast otherwise.
    let bus: Arc<dyn EventBus> = match config_utils::get_nats_url() {
        Some(url) => {
            let bus = NatsBus::connect(&url, config_utils::get_bus_queue_group())
                .await
                .expect("Failed to connect to NATS");
            Arc::new(bus)
        }
        None => {
            tracing::info!("NATS_URL not set, using in-memory event bus");
            Arc::new(InMemoryBus::new())
        }
    };

    // Registry: Consul agent when configured, in-process otherwise.
    let registry: Arc<dyn ServiceRegistry> = match config_utils::get_registry_url() {
        Some(url) => Arc::new(ConsulRegistry::new(url)),
        None => {
            tracing::info!("REGISTRY_URL not set, using in-memory registry");
            Arc::new(MemoryRegistry::new())
        }
    };

    let notification_service = Arc::new(NotificationService::new(pool.clone(), bus.clone()));
    let audit_service = Arc::new(AuditService::new(pool.clone(), bus.clone()));

    // One adapter per channel variant.
    let mut adapters: HashMap<NotificationChannel, Arc<dyn ChannelAdapter>> = HashMap::new();
    adapters.insert(NotificationChannel::Email, Arc::new(EmailChannel::from_env()));
    adapters.insert(NotificationChannel::Push, Arc::new(PushChannel::from_env(registry.clone())));
    adapters.insert(NotificationChannel::InApp, Arc::new(InAppChannel::new(pool.clone())));
    adapters.insert(NotificationChannel::Webhook, Arc::new(WebhookChannel::from_env()));
    adapters.insert(NotificationChannel::Sms, Arc::new(SmsChannel::from_env(registry.clone())));

    // Scheduler + delivery worker pool.
    let dispatcher = Dispatcher::start(pool.clone(), bus.clone(), adapters, DispatchConfig::from_env());

    // Bus consumers: enumerated triggers plus the wildcard audit capture.
    let triggers = Arc::new(NotificationTriggers::new(
        notification_service.clone(),
        DedupCache::new(config_utils::get_dedup_cache_size(), config_utils::get_dedup_cache_evict()),
    ));
    NotificationTriggers::register(bus.as_ref(), triggers)
        .await
        .expect("Failed to subscribe notification triggers");

    let capture = Arc::new(AuditCapture::new(
        pool.clone(),
        bus.clone(),
        DedupCache::new(config_utils::get_dedup_cache_size(), config_utils::get_dedup_cache_evict()),
    ));
    AuditCapture::register(bus.as_ref(), capture)
        .await
        .expect("Failed to subscribe audit capture");

    // Register this instance and keep the TTL fresh.
    let bind_addr = config_utils::get_bind_addr();
    let (bind_host, bind_port) = bind_addr
        .rsplit_once(':')
        .map(|(host, port)| (host.to_string(), port.parse::<u16>().unwrap_or(8080)))
        .unwrap_or_else(|| (bind_addr.clone(), 8080));
    let advertise_host = if bind_host == "0.0.0.0" { "127.0.0.1".to_string() } else { bind_host };

    let refresh = config_utils::get_registry_refresh_interval();
    let registration = Registration {
        name: config_utils::get_service_name(),
        host: advertise_host,
        port: bind_port,
        tags: vec!["notifications".to_string(), "audit".to_string()],
        metadata: HashMap::new(),
        ttl: refresh * 2,
    };
    let instance_id = match registry.register(&registration).await {
        Ok(id) => {
            spawn_heartbeat(registry.clone(), id.clone(), refresh);
            Some(id)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Service registration failed, continuing without discovery");
            None
        }
    };

    let notification_data = web::Data::from(notification_service);
    let audit_data = web::Data::from(audit_service);
    let pool_data = web::Data::new(pool.clone());

    tracing::info!(addr = %bind_addr, "Starting HTTP server");
    let server = HttpServer::new(move || {
        // Body schema failures are 422; semantic failures stay 400 in the
        // handlers.
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            let message = err.to_string();
            actix_web::error::InternalError::from_response(
                err,
                HttpResponse::UnprocessableEntity().json(serde_json::json!({ "error": message })),
            )
            .into()
        });

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .app_data(json_config)
            .app_data(notification_data.clone())
            .app_data(audit_data.clone())
            .app_data(pool_data.clone())
            .configure(handlers::configure)
    })
    .bind(&bind_addr)?
    .run();

    let result = server.await;

    // Shutdown. The server has already stopped accepting requests; next,
    // unhook the bus consumers so no new work arrives, then drain what the
    // delivery pipeline already accepted.
    bus.unsubscribe_all().await;
    dispatcher.shutdown(DRAIN_TIMEOUT).await;

    // Out of discovery before the transports go away.
    if let Some(id) = instance_id {
        if let Err(e) = registry.deregister(&id).await {
            tracing::warn!(error = %e, "Deregistration failed during shutdown");
        }
    }

    // Release the bus connection and our pool handle; remaining pool
    // clones close with the tasks that own them.
    bus.close().await;
    drop(pool);
    tracing::info!("Shutdown complete");

    result
}
