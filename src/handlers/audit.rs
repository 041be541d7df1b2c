//! Audit API handlers
//!
//! Direct event logging, queries, security workflow, compliance reports and
//! retention maintenance, all under `/api/v1/audit`.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::admin;
use crate::models::{
    AuditQuery, ComplianceReportRequest, CreateSecurityAlertRequest, LogAuditEventRequest,
};
use crate::services::audit::compliance::{self, ComplianceStandard};
use crate::services::audit::AuditService;

use super::error_response;

/// POST /api/v1/audit/events
pub async fn log_event(
    service: web::Data<AuditService>,
    body: web::Json<LogAuditEventRequest>,
) -> HttpResponse {
    match service.log_event(body.into_inner()).await {
        Ok(event) => HttpResponse::Ok().json(event),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/audit/events/batch
pub async fn batch_log(
    service: web::Data<AuditService>,
    body: web::Json<Vec<LogAuditEventRequest>>,
) -> HttpResponse {
    match service.batch_log(body.into_inner()).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/audit/events/query
pub async fn query(service: web::Data<AuditService>, body: web::Json<AuditQuery>) -> HttpResponse {
    match service.query(body.into_inner()).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

/// GET /api/v1/audit/users/{user_id}/activities?days=30
pub async fn user_activities(
    service: web::Data<AuditService>,
    path: web::Path<String>,
    query: web::Query<DaysQuery>,
) -> HttpResponse {
    let days = query.days.unwrap_or(30);
    match service.user_activity(&path.into_inner(), days).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/audit/users/{user_id}/summary?days=30
pub async fn user_summary(
    service: web::Data<AuditService>,
    path: web::Path<String>,
    query: web::Query<DaysQuery>,
) -> HttpResponse {
    let days = query.days.unwrap_or(30);
    match service.user_summary(&path.into_inner(), days).await {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/audit/security/alerts
pub async fn create_security_alert(
    service: web::Data<AuditService>,
    body: web::Json<CreateSecurityAlertRequest>,
) -> HttpResponse {
    match service.create_security_alert(body.into_inner()).await {
        Ok(alert) => HttpResponse::Ok().json(alert),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/v1/audit/security/alerts
pub async fn list_security_alerts(
    service: web::Data<AuditService>,
    query: web::Query<PageQuery>,
) -> HttpResponse {
    match service
        .list_security_alerts(query.limit.unwrap_or(100), query.offset.unwrap_or(0))
        .await
    {
        Ok(alerts) => HttpResponse::Ok().json(alerts),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SecurityEventsQuery {
    pub days: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/v1/audit/security/events?days=7
pub async fn security_events(
    service: web::Data<AuditService>,
    query: web::Query<SecurityEventsQuery>,
) -> HttpResponse {
    let days = query.days.unwrap_or(7);
    let limit = query.limit.unwrap_or(100);
    match service.security_events(days, limit).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

/// PUT /api/v1/audit/security/events/{id}/status
pub async fn update_security_status(
    service: web::Data<AuditService>,
    path: web::Path<Uuid>,
    body: web::Json<StatusUpdateRequest>,
) -> HttpResponse {
    match service.update_security_status(path.into_inner(), &body.status).await {
        Ok(event) => HttpResponse::Ok().json(event),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/audit/compliance/reports
pub async fn compliance_report(
    service: web::Data<AuditService>,
    body: web::Json<ComplianceReportRequest>,
) -> HttpResponse {
    match compliance::generate_report(&service, body.into_inner()).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/audit/compliance/standards
pub async fn compliance_standards() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "standards": ComplianceStandard::all() }))
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub retention_days: i64,
}

/// POST /api/v1/audit/maintenance/cleanup (admin only)
pub async fn cleanup(
    req: HttpRequest,
    service: web::Data<AuditService>,
    body: web::Json<CleanupRequest>,
) -> HttpResponse {
    if let Err(response) = admin::require_admin(&req) {
        return response;
    }

    match service.cleanup(body.retention_days).await {
        Ok(deleted) => HttpResponse::Ok().json(serde_json::json!({ "deleted": deleted })),
        Err(e) => error_response(&e),
    }
}
