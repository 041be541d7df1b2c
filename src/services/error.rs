//! Service-level error taxonomy shared by the notification and audit
//! services. Handlers map these onto HTTP statuses; the pipeline maps
//! provider failures separately (see `channels::ChannelError`).

use std::fmt;

#[derive(Debug)]
pub enum ServiceError {
    /// Caller-fixable input problem (400).
    Validation(String),
    /// Referenced entity does not exist (404).
    NotFound(String),
    /// A required dependency (store, bus) cannot be reached right now (503).
    Unavailable(String),
    /// Unexpected persistence failure (500).
    Database(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::NotFound(msg) => write!(f, "{msg}"),
            Self::Unavailable(msg) => write!(f, "Dependency unavailable: {msg}"),
            Self::Database(msg) => write!(f, "Database error: {msg}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<diesel::result::Error> for ServiceError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => Self::NotFound("record not found".to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for ServiceError {
    fn from(e: r2d2::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}
