//! Per-user settings and liveness records

use super::analysis::{clamp_unit, now_micros};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Warning threshold chosen by a user. One record per `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Record identifier
    pub id: String,

    /// Opaque user identifier
    pub user_id: String,

    /// Warning threshold (0.0 - 1.0)
    pub threshold: f64,

    /// Time of last write
    pub timestamp: DateTime<Utc>,
}

impl UserSettings {
    /// Create a settings record, clamping the threshold into [0, 1]
    pub fn new(user_id: impl Into<String>, threshold: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            threshold: clamp_unit(threshold),
            timestamp: now_micros(),
        }
    }
}

/// Append-only liveness record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCheck {
    pub id: String,
    pub client_name: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusCheck {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_name: client_name.into(),
            timestamp: now_micros(),
        }
    }
}
