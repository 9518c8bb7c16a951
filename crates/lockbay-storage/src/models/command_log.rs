use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle moment recorded in the command audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// Command accepted into the queue
    Submitted,
    /// A kiosk claimed the command for execution
    Claimed,
    /// Terminal success reported
    Completed,
    /// Terminal failure reported
    Failed,
    /// Stale-executing recovery forcibly failed the command
    Recovered,
    /// Reservation TTL elapsed (locker rows only, no kiosk involvement)
    Expired,
}

impl LogEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEvent::Submitted => "submitted",
            LogEvent::Claimed => "claimed",
            LogEvent::Completed => "completed",
            LogEvent::Failed => "failed",
            LogEvent::Recovered => "recovered",
            LogEvent::Expired => "expired",
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit row. Rows are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommandLogEntry {
    pub id: i64,
    pub command_id: String,
    pub kiosk_id: String,
    pub event: String,
    /// Free-form context: error text, per-locker outcomes, sweep reason
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CommandLogEntry {
    /// Create a new audit entry
    pub fn new(
        command_id: impl Into<String>,
        kiosk_id: impl Into<String>,
        event: LogEvent,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: 0, // Will be set by database
            command_id: command_id.into(),
            kiosk_id: kiosk_id.into(),
            event: event.to_string(),
            detail,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry() {
        let entry = CommandLogEntry::new("cmd-1", "kiosk-01", LogEvent::Claimed, None);
        assert_eq!(entry.event, "claimed");
        assert_eq!(entry.id, 0);
        assert!(entry.detail.is_none());
    }

    #[test]
    fn test_event_strings() {
        assert_eq!(LogEvent::Submitted.as_str(), "submitted");
        assert_eq!(LogEvent::Recovered.to_string(), "recovered");
    }
}
