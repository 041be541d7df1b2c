//! Database models for the notification and audit stores.
//!
//! Enumerations (status, priority, channel, severity, ...) are stored as
//! lowercase text and converted at the service layer; compliance flags are
//! stored uppercase. All timestamps are UTC naive datetimes.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{
    audit_events, in_app_notifications, notification_batches, notification_templates,
    notifications, push_subscriptions, security_events,
};

// ===== NOTIFICATIONS =====

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: String,
    pub recipient: String,
    pub template_id: Option<Uuid>,
    pub subject: Option<String>,
    pub content: String,
    pub html_content: Option<String>,
    pub variables: serde_json::Value,
    pub status: String,
    pub scheduled_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub provider_id: Option<String>,
    pub batch_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
    pub delivered_at: Option<NaiveDateTime>,
    pub failed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub kind: String,
    pub priority: String,
    pub recipient: String,
    pub template_id: Option<Uuid>,
    pub subject: Option<String>,
    pub content: String,
    pub html_content: Option<String>,
    pub variables: serde_json::Value,
    pub status: String,
    pub scheduled_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub max_retries: i32,
    pub batch_id: Option<Uuid>,
}

/// Partial update for a notification row. `Option<Option<T>>` distinguishes
/// "leave unchanged" from "set NULL".
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = notifications)]
pub struct NotificationUpdate {
    pub status: Option<String>,
    pub scheduled_at: Option<Option<NaiveDateTime>>,
    pub retry_count: Option<i32>,
    pub error_message: Option<Option<String>>,
    pub provider_id: Option<Option<String>>,
    pub sent_at: Option<Option<NaiveDateTime>>,
    pub delivered_at: Option<Option<NaiveDateTime>>,
    pub failed_at: Option<Option<NaiveDateTime>>,
}

// ===== TEMPLATES =====

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = notification_templates)]
pub struct NotificationTemplate {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub subject: Option<String>,
    pub content: String,
    pub html_content: Option<String>,
    pub variables: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notification_templates)]
pub struct NewNotificationTemplate {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub subject: Option<String>,
    pub content: String,
    pub html_content: Option<String>,
    pub variables: serde_json::Value,
}

// ===== BATCHES =====

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = notification_batches)]
pub struct NotificationBatch {
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: String,
    pub total: i32,
    pub sent: i32,
    pub delivered: i32,
    pub failed: i32,
    pub status: String,
    pub scheduled_at: Option<NaiveDateTime>,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notification_batches)]
pub struct NewNotificationBatch {
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    pub kind: String,
    pub total: i32,
    pub status: String,
    pub scheduled_at: Option<NaiveDateTime>,
}

// ===== IN-APP INBOX =====

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = in_app_notifications)]
pub struct InAppNotification {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: Option<String>,
    pub priority: String,
    pub action_type: Option<String>,
    pub action_url: Option<String>,
    pub action_data: Option<serde_json::Value>,
    pub is_read: bool,
    pub is_archived: bool,
    pub read_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = in_app_notifications)]
pub struct NewInAppNotification {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub category: Option<String>,
    pub priority: String,
    pub action_type: Option<String>,
    pub action_url: Option<String>,
    pub action_data: Option<serde_json::Value>,
    pub expires_at: Option<NaiveDateTime>,
}

// ===== PUSH SUBSCRIPTIONS =====

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = push_subscriptions)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: String,
    pub platform: String,
    pub device_token: String,
    pub endpoint: Option<String>,
    pub p256dh_key: Option<String>,
    pub auth_key: Option<String>,
    pub topics: Vec<Option<String>>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub last_used_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = push_subscriptions)]
pub struct NewPushSubscription {
    pub id: Uuid,
    pub user_id: String,
    pub platform: String,
    pub device_token: String,
    pub endpoint: Option<String>,
    pub p256dh_key: Option<String>,
    pub auth_key: Option<String>,
    pub topics: Vec<Option<String>>,
    pub is_active: bool,
}

// ===== AUDIT EVENTS =====

/// A persisted audit row. There is deliberately no `AsChangeset` companion:
/// audit events are immutable after insertion.
#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = audit_events)]
pub struct AuditEvent {
    pub id: Uuid,
    pub event_type: String,
    pub category: String,
    pub severity: String,
    pub status: String,
    pub action: String,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub metadata: serde_json::Value,
    pub tags: Vec<Option<String>>,
    pub compliance_flags: Vec<Option<String>>,
    pub retention_policy: String,
    pub source_event_id: Option<String>,
    pub timestamp: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = audit_events)]
pub struct NewAuditEvent {
    pub id: Uuid,
    pub event_type: String,
    pub category: String,
    pub severity: String,
    pub status: String,
    pub action: String,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub metadata: serde_json::Value,
    pub tags: Vec<Option<String>>,
    pub compliance_flags: Vec<Option<String>>,
    pub retention_policy: String,
    pub source_event_id: Option<String>,
    pub timestamp: NaiveDateTime,
}

// ===== SECURITY EVENTS =====

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = security_events)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub alert_type: String,
    pub severity: String,
    pub status: String,
    pub description: String,
    pub user_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = security_events)]
pub struct NewSecurityEvent {
    pub id: Uuid,
    pub alert_type: String,
    pub severity: String,
    pub status: String,
    pub description: String,
    pub user_id: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = security_events)]
pub struct SecurityEventUpdate {
    pub status: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
}

// ===== API REQUEST / RESPONSE SHAPES =====

/// Admission request for a single notification.
#[derive(Debug, Clone, Deserialize)]
pub struct SendNotificationRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub recipient: String,
    #[serde(default)]
    pub priority: Option<String>,
    pub template_id: Option<Uuid>,
    pub subject: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub max_retries: Option<i32>,
    pub batch_id: Option<Uuid>,
}

/// One recipient inside a batch admission request.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRecipient {
    pub recipient: String,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct SendBatchRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub template_id: Uuid,
    pub recipients: Vec<BatchRecipient>,
    #[serde(default)]
    pub priority: Option<String>,
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Per-recipient admission outcome for a batch.
#[derive(Debug, Serialize)]
pub struct BatchRowResult {
    pub recipient: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchAdmissionResponse {
    pub batch_id: Uuid,
    pub total: i32,
    pub admitted: i32,
    pub failed: i32,
    pub results: Vec<BatchRowResult>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub subject: Option<String>,
    pub content: String,
    pub html_content: Option<String>,
    #[serde(default)]
    pub variables: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPushSubscriptionRequest {
    pub user_id: String,
    pub platform: String,
    pub device_token: String,
    pub endpoint: Option<String>,
    pub p256dh_key: Option<String>,
    pub auth_key: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Aggregated delivery statistics for one user over a period.
#[derive(Debug, Serialize)]
pub struct NotificationStats {
    pub period: String,
    pub total: i64,
    pub pending: i64,
    pub sent: i64,
    pub delivered: i64,
    pub failed: i64,
    pub in_app_total: i64,
    pub in_app_unread: i64,
}

/// Direct audit write request (HTTP path; the bus path builds the same shape).
#[derive(Debug, Clone, Deserialize)]
pub struct LogAuditEventRequest {
    pub event_type: String,
    pub category: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub action: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Per-event outcome for batch audit logging; positional with the request.
#[derive(Debug, Serialize)]
pub struct BatchLogResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchLogResponse {
    pub successful_count: usize,
    pub failed_count: usize,
    pub results: Vec<BatchLogResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub event_type: Option<String>,
    pub category: Option<String>,
    pub severity: Option<String>,
    pub start: Option<chrono::DateTime<chrono::Utc>>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserAuditSummary {
    pub user_id: String,
    pub days: i64,
    pub total_events: i64,
    pub by_category: std::collections::HashMap<String, i64>,
    pub by_severity: std::collections::HashMap<String, i64>,
    pub risk_score: f64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSecurityAlertRequest {
    pub alert_type: String,
    #[serde(default)]
    pub severity: Option<String>,
    pub description: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ComplianceReportRequest {
    pub standard: String,
    pub period_start: chrono::DateTime<chrono::Utc>,
    pub period_end: chrono::DateTime<chrono::Utc>,
}
