//! Notification type definitions
//!
//! Core enumerations for the delivery engine: channels, priorities, and the
//! notification lifecycle state machine. All of these are stored lowercase
//! in the database and converted here at the edges.

use serde::{Deserialize, Serialize};

/// Delivery channel types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Push,
    InApp,
    Webhook,
    Sms,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Push => "push",
            Self::InApp => "in_app",
            Self::Webhook => "webhook",
            Self::Sms => "sms",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "push" => Some(Self::Push),
            "in_app" => Some(Self::InApp),
            "webhook" => Some(Self::Webhook),
            "sms" => Some(Self::Sms),
            _ => None,
        }
    }
}

/// Scheduling priority. `urgent` is dispatched before `high` before
/// `normal` before `low`; FIFO within a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    /// Scheduler ordering rank; higher dispatches first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Urgent => 3,
        }
    }
}

/// Notification lifecycle states.
///
/// ```text
///  pending ──► sending ──► sent ──► delivered
///     ▲           │          │
///     │           └──► failed ◄────┘
///     └── (retry after backoff) ──┘
///  pending ──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sending,
    Sent,
    Delivered,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!(
            (self, next),
            (Pending, Sending)
                | (Pending, Cancelled)
                | (Sending, Sent)
                | (Sending, Failed)
                | (Sending, Pending) // retriable failure, back for another attempt
                | (Sent, Delivered)
                | (Sent, Failed) // delivery receipt reported a hard bounce
        )
    }
}

/// Stats aggregation windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsPeriod {
    Today,
    Last7Days,
    Last30Days,
    All,
}

impl StatsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
            Self::All => "all",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "today" => Some(Self::Today),
            "7d" => Some(Self::Last7Days),
            "30d" => Some(Self::Last30Days),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// Window start for the period, if bounded.
    pub fn window_start(&self, now: chrono::DateTime<chrono::Utc>) -> Option<chrono::NaiveDateTime> {
        match self {
            Self::Today => Some(now.date_naive().and_hms_opt(0, 0, 0).expect("midnight is valid")),
            Self::Last7Days => Some((now - chrono::Duration::days(7)).naive_utc()),
            Self::Last30Days => Some((now - chrono::Duration::days(30)).naive_utc()),
            Self::All => None,
        }
    }
}

/// Push subscription platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushPlatform {
    Ios,
    Android,
    Web,
}

impl PushPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ios" => Some(Self::Ios),
            "android" => Some(Self::Android),
            "web" => Some(Self::Web),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            NotificationStatus::Pending,
            NotificationStatus::Sending,
            NotificationStatus::Sent,
            NotificationStatus::Delivered,
            NotificationStatus::Failed,
            NotificationStatus::Cancelled,
        ] {
            assert_eq!(NotificationStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(NotificationStatus::from_str("bogus"), None);
    }

    #[test]
    fn terminal_states_admit_no_transitions() {
        use NotificationStatus::*;
        for terminal in [Delivered, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Sending, Sent, Delivered, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn state_machine_edges() {
        use NotificationStatus::*;
        assert!(Pending.can_transition_to(Sending));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Sending.can_transition_to(Sent));
        assert!(Sending.can_transition_to(Failed));
        assert!(Sending.can_transition_to(Pending));
        assert!(Sent.can_transition_to(Delivered));

        assert!(!Pending.can_transition_to(Sent));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Sent.can_transition_to(Sending));
        assert!(!Sending.can_transition_to(Cancelled));
    }

    #[test]
    fn priority_rank_ordering() {
        assert!(NotificationPriority::Urgent.rank() > NotificationPriority::High.rank());
        assert!(NotificationPriority::High.rank() > NotificationPriority::Normal.rank());
        assert!(NotificationPriority::Normal.rank() > NotificationPriority::Low.rank());
    }
}
