//! Request/response bodies shared by the server API and the kiosk daemon.
//!
//! Keeping these in one place means the kiosk client and the axum
//! handlers cannot drift apart on field names. Transport concerns (status
//! codes, headers) stay out of here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::{CommandId, CommandKind, CommandPayload};
use crate::state::LockerState;
use crate::types::{KioskId, LockerId, OwnerKey, OwnerType};
use crate::zone::ExtensionSummary;

/// Issuer command submission. The payload is flattened, so a request
/// reads `{"kiosk_id":"k1","type":"open","locker_id":5}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitCommandRequest {
    pub kiosk_id: KioskId,
    #[serde(flatten)]
    pub payload: CommandPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitCommandResponse {
    pub command_id: CommandId,
}

/// One pending command as handed to a polling kiosk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub id: CommandId,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub payload: CommandPayload,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one locker inside a bulk operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockerOutcome {
    pub locker_id: LockerId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Kiosk claim of a pending command (the markExecuting step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub kiosk_id: KioskId,
}

/// Kiosk completion report for one command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResultReport {
    pub success: bool,
    pub duration_ms: i64,
    /// Attempts the hardware controller used (1 = first try succeeded).
    #[serde(default)]
    pub retry_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Per-locker outcomes; empty for everything but bulk_open.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locker_results: Vec<LockerOutcome>,
}

/// Periodic kiosk liveness push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub kiosk_id: KioskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: crate::types::KioskStatus,
    /// Poll cadence the server wants from this kiosk.
    pub poll_interval_ms: u64,
}

/// Registry view of one kiosk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KioskSummary {
    pub kiosk_id: KioskId,
    pub zone: Option<String>,
    pub version: Option<String>,
    pub hardware_id: Option<String>,
    pub last_seen_at: DateTime<Utc>,
    pub status: crate::types::KioskStatus,
    /// Consecutive hardware-failed commands; resets on success.
    pub hardware_error_streak: i64,
}

/// Public view of one locker row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockerView {
    pub locker_id: LockerId,
    pub state: LockerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_type: Option<OwnerType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_key: Option<OwnerKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub is_vip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub owner_type: OwnerType,
    pub owner_key: OwnerKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRequest {
    /// When present, the release only succeeds for the matching owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_key: Option<OwnerKey>,
}

/// Result of a stale-command recovery pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverResponse {
    pub recovered: Vec<CommandId>,
}

/// One relay card in the kiosk inventory (16 channels each).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayCardSpec {
    pub slave_address: crate::types::SlaveAddress,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Zone configuration as served to kiosks and the panel: the zone table
/// plus enabled cards no zone has claimed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneLayoutView {
    pub zones: Vec<crate::zone::Zone>,
    #[serde(default)]
    pub spare_cards: Vec<crate::types::SlaveAddress>,
}

/// Replacement zone table for one kiosk (PUT body). Card assignments
/// ride inside each zone; unlisted inventory cards become spares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceZonesRequest {
    pub zones: Vec<crate::zone::Zone>,
}

/// Replacement relay-card inventory for one kiosk (PUT body).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceRelayCardsRequest {
    pub cards: Vec<RelayCardSpec>,
}

/// Outcome of a zone sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<ExtensionSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_flattens_payload() {
        let json = r#"{"kiosk_id":"k1","type":"open","locker_id":5}"#;
        let req: SubmitCommandRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.kiosk_id.as_str(), "k1");
        assert!(matches!(req.payload, CommandPayload::Open { .. }));

        let back = serde_json::to_value(&req).unwrap();
        assert_eq!(back["type"], "open");
        assert_eq!(back["locker_id"], 5);
    }

    #[test]
    fn test_result_report_defaults() {
        let json = r#"{"success":true,"duration_ms":412}"#;
        let report: CommandResultReport = serde_json::from_str(json).unwrap();
        assert!(report.success);
        assert_eq!(report.retry_count, 0);
        assert!(report.locker_results.is_empty());
    }
}
