//! HTTP handlers.

pub mod audit;
pub mod notifications;

use actix_web::{web, HttpResponse};

use crate::services::ServiceError;

/// Map a service error onto the HTTP surface contract: 400 for semantic
/// errors, 404 for unknown entities, 503 when a dependency is down, 500
/// otherwise. (Schema-level body errors are turned into 422 by the JSON
/// extractor config in `main`.)
pub fn error_response(error: &ServiceError) -> HttpResponse {
    let body = serde_json::json!({ "error": error.to_string() });
    match error {
        ServiceError::Validation(_) => HttpResponse::BadRequest().json(body),
        ServiceError::NotFound(_) => HttpResponse::NotFound().json(body),
        ServiceError::Unavailable(_) => HttpResponse::ServiceUnavailable().json(body),
        ServiceError::Database(_) => HttpResponse::InternalServerError().json(body),
    }
}

/// Liveness probe.
///
/// GET /api/v1/notifications/health (and mirrored under /api/v1/audit)
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Mount both service surfaces.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/notifications")
            .route("/health", web::get().to(health))
            .route("/send", web::post().to(notifications::send))
            .route("/batch", web::post().to(notifications::send_batch))
            .route("/batch/{id}", web::get().to(notifications::get_batch))
            .route("/templates", web::post().to(notifications::create_template))
            .route("/templates", web::get().to(notifications::list_templates))
            .route("/templates/{id}", web::get().to(notifications::get_template))
            .route("/in-app/{user_id}", web::get().to(notifications::list_in_app))
            .route(
                "/in-app/{user_id}/unread-count",
                web::get().to(notifications::unread_count),
            )
            .route("/in-app/{id}/read", web::post().to(notifications::mark_read))
            .route("/in-app/{id}/archive", web::post().to(notifications::archive))
            .route("/push/subscribe", web::post().to(notifications::push_subscribe))
            .route("/push/unsubscribe", web::delete().to(notifications::push_unsubscribe))
            .route("/stats", web::get().to(notifications::stats))
            .route("/{id}/cancel", web::post().to(notifications::cancel))
            .route("/{id}/delivered", web::post().to(notifications::delivered))
            .route("/{id}/clicked", web::post().to(notifications::clicked))
            .route("/{id}", web::get().to(notifications::get_notification)),
    )
    .service(
        web::scope("/api/v1/audit")
            .route("/health", web::get().to(health))
            .route("/events", web::post().to(audit::log_event))
            .route("/events/batch", web::post().to(audit::batch_log))
            .route("/events/query", web::post().to(audit::query))
            .route("/users/{user_id}/activities", web::get().to(audit::user_activities))
            .route("/users/{user_id}/summary", web::get().to(audit::user_summary))
            .route("/security/alerts", web::post().to(audit::create_security_alert))
            .route("/security/alerts", web::get().to(audit::list_security_alerts))
            .route("/security/events", web::get().to(audit::security_events))
            .route(
                "/security/events/{id}/status",
                web::put().to(audit::update_security_status),
            )
            .route("/compliance/reports", web::post().to(audit::compliance_report))
            .route("/compliance/standards", web::get().to(audit::compliance_standards))
            .route("/maintenance/cleanup", web::post().to(audit::cleanup)),
    );
}
