//! Audit type definitions
//!
//! Fixed enumerations for the audit trail plus the derivation rules that
//! map bus subjects to event types, categories, severities, retention
//! policies and compliance flags. Stored lowercase except compliance flags,
//! which are uppercase.

use serde::{Deserialize, Serialize};

/// Maximum length of the `action` field after trimming.
pub const MAX_ACTION_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    UserRegister,
    UserLogin,
    UserLogout,
    UserUpdate,
    UserDelete,
    PermissionGrant,
    PermissionRevoke,
    ResourceCreate,
    ResourceUpdate,
    ResourceDelete,
    ResourceAccess,
    ConfigChange,
    SecurityAlert,
    SystemEvent,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserRegister => "user_register",
            Self::UserLogin => "user_login",
            Self::UserLogout => "user_logout",
            Self::UserUpdate => "user_update",
            Self::UserDelete => "user_delete",
            Self::PermissionGrant => "permission_grant",
            Self::PermissionRevoke => "permission_revoke",
            Self::ResourceCreate => "resource_create",
            Self::ResourceUpdate => "resource_update",
            Self::ResourceDelete => "resource_delete",
            Self::ResourceAccess => "resource_access",
            Self::ConfigChange => "config_change",
            Self::SecurityAlert => "security_alert",
            Self::SystemEvent => "system_event",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user_register" => Some(Self::UserRegister),
            "user_login" => Some(Self::UserLogin),
            "user_logout" => Some(Self::UserLogout),
            "user_update" => Some(Self::UserUpdate),
            "user_delete" => Some(Self::UserDelete),
            "permission_grant" => Some(Self::PermissionGrant),
            "permission_revoke" => Some(Self::PermissionRevoke),
            "resource_create" => Some(Self::ResourceCreate),
            "resource_update" => Some(Self::ResourceUpdate),
            "resource_delete" => Some(Self::ResourceDelete),
            "resource_access" => Some(Self::ResourceAccess),
            "config_change" => Some(Self::ConfigChange),
            "security_alert" => Some(Self::SecurityAlert),
            "system_event" => Some(Self::SystemEvent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Authentication,
    Authorization,
    DataAccess,
    Configuration,
    Security,
    Compliance,
    System,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::DataAccess => "data_access",
            Self::Configuration => "configuration",
            Self::Security => "security",
            Self::Compliance => "compliance",
            Self::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "authentication" => Some(Self::Authentication),
            "authorization" => Some(Self::Authorization),
            "data_access" => Some(Self::DataAccess),
            "configuration" => Some(Self::Configuration),
            "security" => Some(Self::Security),
            "compliance" => Some(Self::Compliance),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// High and critical events trigger the real-time alert path.
    pub fn is_alerting(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceFlag {
    Gdpr,
    Sox,
    Hipaa,
}

impl ComplianceFlag {
    /// Stored uppercase, unlike every other enumeration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gdpr => "GDPR",
            Self::Sox => "SOX",
            Self::Hipaa => "HIPAA",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GDPR" => Some(Self::Gdpr),
            "SOX" => Some(Self::Sox),
            "HIPAA" => Some(Self::Hipaa),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    OneYear,
    ThreeYears,
    SevenYears,
}

impl RetentionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneYear => "1_year",
            Self::ThreeYears => "3_years",
            Self::SevenYears => "7_years",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1_year" => Some(Self::OneYear),
            "3_years" => Some(Self::ThreeYears),
            "7_years" => Some(Self::SevenYears),
            _ => None,
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Self::OneYear => 365,
            Self::ThreeYears => 1095,
            Self::SevenYears => 2555,
        }
    }

    /// Retention assignment derived from the event category.
    pub fn for_category(category: AuditCategory) -> Self {
        match category {
            AuditCategory::Security | AuditCategory::Compliance => Self::SevenYears,
            AuditCategory::Authentication | AuditCategory::Authorization => Self::ThreeYears,
            AuditCategory::DataAccess | AuditCategory::Configuration | AuditCategory::System => {
                Self::OneYear
            }
        }
    }
}

/// Security-event investigation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventStatus {
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

impl SecurityEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::FalsePositive => "false_positive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "investigating" => Some(Self::Investigating),
            "resolved" => Some(Self::Resolved),
            "false_positive" => Some(Self::FalsePositive),
            _ => None,
        }
    }

    /// `open -> investigating -> {resolved, false_positive}`, with
    /// `false_positive -> open` as the reopen edge. `resolved` is terminal.
    pub fn can_transition_to(&self, next: SecurityEventStatus) -> bool {
        use SecurityEventStatus::*;
        matches!(
            (self, next),
            (Open, Investigating)
                | (Investigating, Resolved)
                | (Investigating, FalsePositive)
                | (FalsePositive, Open)
        )
    }
}

// ===== Subject classification (bus intake) =====

fn split_subject(subject: &str) -> (&str, &str) {
    match subject.split_once('.') {
        Some((domain, action)) => (domain, action),
        None => (subject, ""),
    }
}

/// Map a bus subject to the canonical audit event type.
pub fn classify_event_type(subject: &str) -> AuditEventType {
    let (domain, action) = split_subject(subject);

    match (domain, action) {
        ("user", "registered") => AuditEventType::UserRegister,
        ("user", "logged_in") => AuditEventType::UserLogin,
        ("user", "logged_out") => AuditEventType::UserLogout,
        ("user", "updated") => AuditEventType::UserUpdate,
        ("user", "deleted") => AuditEventType::UserDelete,
        ("permission", "granted") => AuditEventType::PermissionGrant,
        ("permission", "revoked") => AuditEventType::PermissionRevoke,
        ("file", "shared") => AuditEventType::PermissionGrant,
        ("config", _) | ("settings", _) => AuditEventType::ConfigChange,
        ("security", _) => AuditEventType::SecurityAlert,
        _ if action.contains("member_added") => AuditEventType::PermissionGrant,
        _ if action.contains("member_removed") => AuditEventType::PermissionRevoke,
        _ if action == "created" || action == "uploaded" => AuditEventType::ResourceCreate,
        _ if action == "updated" => AuditEventType::ResourceUpdate,
        _ if action == "deleted" || action == "removed" => AuditEventType::ResourceDelete,
        _ if action == "accessed" || action == "downloaded" || action == "viewed" => {
            AuditEventType::ResourceAccess
        }
        _ => AuditEventType::SystemEvent,
    }
}

/// Category derivation from the subject.
pub fn classify_category(subject: &str) -> AuditCategory {
    let (domain, action) = split_subject(subject);

    if domain == "user" {
        AuditCategory::Authentication
    } else if domain == "permission" || action.contains("member_") {
        AuditCategory::Authorization
    } else if domain == "payment" || domain == "subscription" {
        AuditCategory::Configuration
    } else if domain == "file" || domain == "device" {
        AuditCategory::DataAccess
    } else if domain == "security" {
        AuditCategory::Security
    } else {
        AuditCategory::System
    }
}

/// Severity heuristics over the raw subject.
pub fn classify_severity(subject: &str) -> AuditSeverity {
    const HIGH_MARKERS: [&str; 4] = ["deleted", "removed", "failed", "offline"];
    const MEDIUM_MARKERS: [&str; 3] = ["updated", "shared", "member_added"];

    if HIGH_MARKERS.iter().any(|m| subject.contains(m)) {
        AuditSeverity::High
    } else if MEDIUM_MARKERS.iter().any(|m| subject.contains(m)) {
        AuditSeverity::Medium
    } else {
        AuditSeverity::Low
    }
}

/// Compliance flag derivation.
///
/// GDPR for personal-data mutations, SOX for permission and resource-update
/// events, HIPAA when the resource context indicates health data.
pub fn derive_compliance_flags(
    event_type: AuditEventType,
    resource_type: Option<&str>,
    resource_name: Option<&str>,
    metadata: &serde_json::Value,
) -> Vec<ComplianceFlag> {
    let mut flags = Vec::new();

    if matches!(event_type, AuditEventType::UserDelete | AuditEventType::UserUpdate) {
        flags.push(ComplianceFlag::Gdpr);
    }

    if event_type.as_str().starts_with("permission_") || event_type == AuditEventType::ResourceUpdate {
        flags.push(ComplianceFlag::Sox);
    }

    let health_context = resource_type
        .map(|t| t.to_ascii_lowercase().contains("health"))
        .unwrap_or(false)
        || resource_name
            .map(|n| n.to_ascii_lowercase().contains("health"))
            .unwrap_or(false)
        || metadata
            .get("health_data")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
    if health_context {
        flags.push(ComplianceFlag::Hipaa);
    }

    flags
}
