//! Compliance report generation
//!
//! Evaluates the audit trail for one standard over a period: which events
//! are relevant, which carry everything the standard requires, and a score
//! with findings for everything that falls short. Report generation is
//! itself an auditable action.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{AuditEvent, ComplianceReportRequest, LogAuditEventRequest};
use crate::repository::audit_events as audit_repo;
use crate::services::ServiceError;

use super::service::AuditService;
use super::types::{AuditCategory, AuditEventType, AuditSeverity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceStandard {
    Gdpr,
    Sox,
    Hipaa,
}

impl ComplianceStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gdpr => "GDPR",
            Self::Sox => "SOX",
            Self::Hipaa => "HIPAA",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GDPR" => Some(Self::Gdpr),
            "SOX" => Some(Self::Sox),
            "HIPAA" => Some(Self::Hipaa),
            _ => None,
        }
    }

    pub fn all() -> Vec<&'static str> {
        vec!["GDPR", "SOX", "HIPAA"]
    }
}

#[derive(Debug, Serialize)]
pub struct ComplianceFinding {
    pub event_id: Uuid,
    pub action: String,
    pub issue: String,
}

#[derive(Debug, Serialize)]
pub struct ComplianceReport {
    pub standard: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_events: usize,
    pub compliant_events: usize,
    pub compliance_score: f64,
    pub risk_level: String,
    pub findings: Vec<ComplianceFinding>,
    pub generated_at: DateTime<Utc>,
}

/// Whether an event falls under a standard at all.
fn is_relevant(standard: ComplianceStandard, event: &AuditEvent) -> bool {
    let has_flag = |flag: &str| event.compliance_flags.iter().flatten().any(|f| f == flag);

    match standard {
        // Anything attributable to a person is personal-data relevant.
        ComplianceStandard::Gdpr => event.user_id != "system",
        ComplianceStandard::Sox => {
            has_flag("SOX")
                || matches!(
                    AuditCategory::from_str(&event.category),
                    Some(AuditCategory::Authorization) | Some(AuditCategory::Configuration)
                )
        }
        ComplianceStandard::Hipaa => has_flag("HIPAA"),
    }
}

/// Event types that additionally require a recorded justification.
fn is_sensitive(standard: ComplianceStandard, event_type: Option<AuditEventType>) -> bool {
    use AuditEventType::*;
    match standard {
        ComplianceStandard::Gdpr => matches!(event_type, Some(UserDelete) | Some(UserUpdate)),
        ComplianceStandard::Sox => {
            matches!(event_type, Some(PermissionGrant) | Some(PermissionRevoke) | Some(ResourceUpdate))
        }
        ComplianceStandard::Hipaa => matches!(event_type, Some(ResourceAccess) | Some(ResourceDelete)),
    }
}

/// Check one relevant event against a standard's required fields. Returns
/// the first issue found, or `None` when the event is compliant.
fn check_event(standard: ComplianceStandard, event: &AuditEvent) -> Option<String> {
    let meta_has = |key: &str| {
        event
            .metadata
            .get(key)
            .map(|v| !v.is_null())
            .unwrap_or(false)
    };
    let event_type = AuditEventType::from_str(&event.event_type);

    let missing = match standard {
        ComplianceStandard::Gdpr => {
            if !meta_has("ip_address") {
                Some("missing ip_address".to_string())
            } else {
                None
            }
        }
        ComplianceStandard::Sox => {
            if event.user_id == "system" {
                Some("missing user attribution".to_string())
            } else if event.resource_id.is_none() {
                Some("missing resource_id".to_string())
            } else {
                None
            }
        }
        ComplianceStandard::Hipaa => {
            if event.resource_id.is_none() {
                Some("missing resource_id".to_string())
            } else if !meta_has("access_reason") {
                Some("missing access_reason".to_string())
            } else {
                None
            }
        }
    };
    if missing.is_some() {
        return missing;
    }

    if is_sensitive(standard, event_type) && !meta_has("justification") {
        return Some("missing justification for sensitive event".to_string());
    }

    None
}

fn risk_level(score: f64) -> &'static str {
    if score < 80.0 {
        "high"
    } else if score <= 90.0 {
        "medium"
    } else {
        "low"
    }
}

/// Pure evaluation over an already-fetched event set.
pub fn evaluate(
    standard: ComplianceStandard,
    events: &[AuditEvent],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> ComplianceReport {
    let relevant: Vec<&AuditEvent> = events.iter().filter(|e| is_relevant(standard, e)).collect();

    let mut findings = Vec::new();
    let mut compliant = 0usize;
    for event in &relevant {
        match check_event(standard, event) {
            None => compliant += 1,
            Some(issue) => findings.push(ComplianceFinding {
                event_id: event.id,
                action: event.action.clone(),
                issue,
            }),
        }
    }

    let total = relevant.len();
    let score = if total > 0 {
        100.0 * compliant as f64 / total as f64
    } else {
        100.0
    };

    ComplianceReport {
        standard: standard.as_str().to_string(),
        period_start,
        period_end,
        total_events: total,
        compliant_events: compliant,
        compliance_score: score,
        risk_level: risk_level(score).to_string(),
        findings,
        generated_at: Utc::now(),
    }
}

/// Fetch the period, evaluate it, and audit the report generation itself.
pub async fn generate_report(
    service: &AuditService,
    request: ComplianceReportRequest,
) -> Result<ComplianceReport, ServiceError> {
    let standard = ComplianceStandard::from_str(&request.standard)
        .ok_or_else(|| ServiceError::Validation(format!("unsupported standard: {}", request.standard)))?;
    if request.period_start >= request.period_end {
        return Err(ServiceError::Validation("period_start must be before period_end".to_string()));
    }

    let events = {
        let mut conn = service.pool().get()?;
        audit_repo::events_in_range(
            &mut conn,
            request.period_start.naive_utc(),
            request.period_end.naive_utc(),
        )?
    };

    let report = evaluate(standard, &events, request.period_start, request.period_end);

    let record = LogAuditEventRequest {
        event_type: "system_event".to_string(),
        category: "compliance".to_string(),
        severity: Some(AuditSeverity::Low.as_str().to_string()),
        status: Some("success".to_string()),
        action: "audit.report_generated".to_string(),
        user_id: None,
        organization_id: None,
        resource_type: Some("compliance_report".to_string()),
        resource_id: None,
        resource_name: Some(standard.as_str().to_string()),
        metadata: Some(serde_json::json!({
            "standard": report.standard,
            "total_events": report.total_events,
            "compliance_score": report.compliance_score,
        })),
        tags: vec!["compliance".to_string()],
    };
    if let Err(e) = service.log_event(record).await {
        tracing::warn!(error = %e, "Failed to audit report generation");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(user: &str, event_type: &str, metadata: serde_json::Value) -> AuditEvent {
        let now = Utc::now().naive_utc();
        AuditEvent {
            id: Uuid::now_v7(),
            event_type: event_type.to_string(),
            category: "authentication".to_string(),
            severity: "low".to_string(),
            status: "success".to_string(),
            action: "user.updated".to_string(),
            user_id: user.to_string(),
            organization_id: None,
            resource_type: None,
            resource_id: Some("r1".to_string()),
            resource_name: None,
            metadata,
            tags: vec![],
            compliance_flags: vec![],
            retention_policy: "3_years".to_string(),
            source_event_id: None,
            timestamp: now,
            created_at: now,
        }
    }

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        (Utc::now() - Duration::days(30), Utc::now())
    }

    #[test]
    fn score_boundary_ten_events_one_missing_ip() {
        let mut events = Vec::new();
        for i in 0..10 {
            let metadata = if i == 0 {
                serde_json::json!({})
            } else {
                serde_json::json!({"ip_address": "10.0.0.1"})
            };
            events.push(event(&format!("u{i}"), "user_login", metadata));
        }

        let (start, end) = period();
        let report = evaluate(ComplianceStandard::Gdpr, &events, start, end);

        assert_eq!(report.total_events, 10);
        assert_eq!(report.compliant_events, 9);
        assert_eq!(report.compliance_score, 90.0);
        assert_eq!(report.risk_level, "medium");
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].issue, "missing ip_address");
    }

    #[test]
    fn empty_period_scores_perfect() {
        let (start, end) = period();
        let report = evaluate(ComplianceStandard::Gdpr, &[], start, end);
        assert_eq!(report.total_events, 0);
        assert_eq!(report.compliance_score, 100.0);
        assert_eq!(report.risk_level, "low");
    }

    #[test]
    fn sensitive_event_needs_a_justification() {
        let compliant = event("u1", "user_delete", serde_json::json!({
            "ip_address": "10.0.0.1",
            "justification": "account closure request",
        }));
        let missing = event("u2", "user_delete", serde_json::json!({"ip_address": "10.0.0.1"}));

        let (start, end) = period();
        let report = evaluate(ComplianceStandard::Gdpr, &[compliant, missing], start, end);
        assert_eq!(report.compliant_events, 1);
        assert_eq!(report.findings.len(), 1);
        assert!(report.findings[0].issue.contains("justification"));
    }

    #[test]
    fn system_events_are_not_gdpr_relevant() {
        let events = vec![event("system", "user_login", serde_json::json!({}))];
        let (start, end) = period();
        let report = evaluate(ComplianceStandard::Gdpr, &events, start, end);
        assert_eq!(report.total_events, 0);
        assert_eq!(report.compliance_score, 100.0);
    }

    #[test]
    fn risk_levels_follow_the_score() {
        assert_eq!(risk_level(79.9), "high");
        assert_eq!(risk_level(80.0), "medium");
        assert_eq!(risk_level(90.0), "medium");
        assert_eq!(risk_level(90.1), "low");
        assert_eq!(risk_level(100.0), "low");
    }

    #[test]
    fn sox_requires_resource_and_attribution() {
        let mut no_resource = event("u1", "permission_grant", serde_json::json!({"justification": "x"}));
        no_resource.category = "authorization".to_string();
        no_resource.resource_id = None;

        let mut fine = event("u1", "permission_grant", serde_json::json!({"justification": "x"}));
        fine.category = "authorization".to_string();

        let (start, end) = period();
        let report = evaluate(ComplianceStandard::Sox, &[no_resource, fine], start, end);
        assert_eq!(report.total_events, 2);
        assert_eq!(report.compliant_events, 1);
        assert!(report.findings[0].issue.contains("resource_id"));
    }
}
