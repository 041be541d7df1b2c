//! Notification API handlers
//!
//! Admission, batches, templates, push subscriptions, the in-app inbox and
//! delivery callbacks, all under `/api/v1/notifications`.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{
    CreateTemplateRequest, RegisterPushSubscriptionRequest, SendBatchRequest, SendNotificationRequest,
};
use crate::services::notifications::types::StatsPeriod;
use crate::services::notifications::NotificationService;

use super::error_response;

/// POST /api/v1/notifications/send
pub async fn send(
    service: web::Data<NotificationService>,
    body: web::Json<SendNotificationRequest>,
) -> HttpResponse {
    match service.send(body.into_inner()).await {
        Ok(notification) => HttpResponse::Ok().json(notification),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/notifications/batch
pub async fn send_batch(
    service: web::Data<NotificationService>,
    body: web::Json<SendBatchRequest>,
) -> HttpResponse {
    match service.send_batch(body.into_inner()).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/notifications/batch/{id}
pub async fn get_batch(service: web::Data<NotificationService>, path: web::Path<Uuid>) -> HttpResponse {
    match service.get_batch(path.into_inner()).await {
        Ok(batch) => HttpResponse::Ok().json(batch),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/notifications/{id}
pub async fn get_notification(
    service: web::Data<NotificationService>,
    path: web::Path<Uuid>,
) -> HttpResponse {
    match service.get_notification(path.into_inner()).await {
        Ok(notification) => HttpResponse::Ok().json(notification),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/notifications/{id}/cancel
pub async fn cancel(service: web::Data<NotificationService>, path: web::Path<Uuid>) -> HttpResponse {
    match service.cancel(path.into_inner()).await {
        Ok(notification) => HttpResponse::Ok().json(notification),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/notifications/{id}/delivered
///
/// Delivery receipt callback from a provider.
pub async fn delivered(service: web::Data<NotificationService>, path: web::Path<Uuid>) -> HttpResponse {
    match service.confirm_delivered(path.into_inner()).await {
        Ok(notification) => HttpResponse::Ok().json(notification),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub user_id: String,
}

/// POST /api/v1/notifications/{id}/clicked?user_id=...
pub async fn clicked(
    service: web::Data<NotificationService>,
    path: web::Path<Uuid>,
    query: web::Query<ClickQuery>,
) -> HttpResponse {
    match service.record_click(path.into_inner(), &query.user_id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => error_response(&e),
    }
}

// ===== Templates =====

/// POST /api/v1/notifications/templates
pub async fn create_template(
    service: web::Data<NotificationService>,
    body: web::Json<CreateTemplateRequest>,
) -> HttpResponse {
    match service.create_template(body.into_inner()).await {
        Ok(template) => HttpResponse::Ok().json(template),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/notifications/templates
pub async fn list_templates(service: web::Data<NotificationService>) -> HttpResponse {
    match service.list_templates().await {
        Ok(templates) => HttpResponse::Ok().json(templates),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/notifications/templates/{id}
pub async fn get_template(service: web::Data<NotificationService>, path: web::Path<Uuid>) -> HttpResponse {
    match service.get_template(path.into_inner()).await {
        Ok(template) => HttpResponse::Ok().json(template),
        Err(e) => error_response(&e),
    }
}

// ===== In-app inbox =====

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub unread_only: Option<bool>,
}

/// GET /api/v1/notifications/in-app/{user_id}
pub async fn list_in_app(
    service: web::Data<NotificationService>,
    path: web::Path<String>,
    query: web::Query<InboxQuery>,
) -> HttpResponse {
    let user_id = path.into_inner();
    let limit = query.limit.unwrap_or(20);
    let offset = query.offset.unwrap_or(0);
    let unread_only = query.unread_only.unwrap_or(false);

    match service.list_in_app(&user_id, limit, offset, unread_only).await {
        Ok(rows) => HttpResponse::Ok().json(rows),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/notifications/in-app/{user_id}/unread-count
pub async fn unread_count(service: web::Data<NotificationService>, path: web::Path<String>) -> HttpResponse {
    match service.unread_count(&path.into_inner()).await {
        Ok(count) => HttpResponse::Ok().json(serde_json::json!({ "count": count })),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub user_id: String,
}

/// POST /api/v1/notifications/in-app/{id}/read?user_id=...
pub async fn mark_read(
    service: web::Data<NotificationService>,
    path: web::Path<Uuid>,
    query: web::Query<OwnerQuery>,
) -> HttpResponse {
    match service.mark_read(path.into_inner(), &query.user_id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    pub user_id: String,
    pub unarchive: Option<bool>,
}

/// POST /api/v1/notifications/in-app/{id}/archive?user_id=...&unarchive=
pub async fn archive(
    service: web::Data<NotificationService>,
    path: web::Path<Uuid>,
    query: web::Query<ArchiveQuery>,
) -> HttpResponse {
    let archived = !query.unarchive.unwrap_or(false);
    match service.set_archived(path.into_inner(), &query.user_id, archived).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => error_response(&e),
    }
}

// ===== Push subscriptions =====

/// POST /api/v1/notifications/push/subscribe
pub async fn push_subscribe(
    service: web::Data<NotificationService>,
    body: web::Json<RegisterPushSubscriptionRequest>,
) -> HttpResponse {
    match service.register_push_subscription(body.into_inner()).await {
        Ok(subscription) => HttpResponse::Ok().json(subscription),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub user_id: String,
    pub device_token: String,
}

/// DELETE /api/v1/notifications/push/unsubscribe?user_id=...&device_token=...
pub async fn push_unsubscribe(
    service: web::Data<NotificationService>,
    query: web::Query<UnsubscribeQuery>,
) -> HttpResponse {
    match service
        .unregister_push_subscription(&query.user_id, &query.device_token)
        .await
    {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => error_response(&e),
    }
}

// ===== Stats =====

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub user_id: String,
    pub period: Option<String>,
}

/// GET /api/v1/notifications/stats?user_id=...&period=7d
pub async fn stats(service: web::Data<NotificationService>, query: web::Query<StatsQuery>) -> HttpResponse {
    let period = match query.period.as_deref() {
        None => StatsPeriod::Last7Days,
        Some(p) => match StatsPeriod::from_str(p) {
            Some(period) => period,
            None => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": format!("invalid period: {p} (expected today, 7d, 30d or all)")
                }))
            }
        },
    };

    match service.get_stats(&query.user_id, period).await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => error_response(&e),
    }
}
