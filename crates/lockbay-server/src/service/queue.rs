//! Command queue orchestration.
//!
//! Admission, claim, result processing, and stale-command recovery.
//! The storage layer owns the transactional guarantees (dedup
//! check-and-insert, guarded status moves); this module sequences them
//! and drives the locker transitions that follow each lifecycle step:
//!
//! ```text
//! submit          -> pending          (targets validated against the table)
//! claim           -> executing        (open targets: -> opening)
//! result success  -> completed        (opening -> owned | free)
//! result failure  -> failed           (opening -> error)
//! recovery        -> failed           (opening -> error, reason logged)
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use lockbay_core::command::{CommandId, CommandKind, CommandPayload};
use lockbay_core::wire::{
    CommandDescriptor, CommandResultReport, SubmitCommandRequest, SubmitCommandResponse,
};
use lockbay_core::{Error as CoreError, KioskId, LockerEvent, LockerId, LockerState};
use lockbay_storage::{
    CommandLogEntry, CommandLogRepository, CommandOutcome, CommandRecord, CommandRepository,
    Database, KioskRepository, LockerRepository, LogEvent, SqliteCommandLogRepository,
    SqliteCommandRepository, SqliteKioskRepository, SqliteLockerRepository, StorageError,
};

use crate::error::AppResult;
use crate::service::lockers::try_transition;

/// Error code recorded when recovery forcibly fails a command.
const RECOVERY_ERROR_CODE: &str = "RECOVERED";

/// Admit a command to the queue.
///
/// Validation order: payload shape, kiosk registration, target locker
/// states against the transition table, then the transactional dedup
/// check inside [`CommandRepository::enqueue`]. A duplicate surfaces as
/// `409` carrying the surviving command id.
pub async fn submit(
    db: &Database,
    request: &SubmitCommandRequest,
    issued_by: Option<String>,
) -> AppResult<SubmitCommandResponse> {
    request.payload.validate()?;

    let kiosks = SqliteKioskRepository::new(db.pool().clone());
    if kiosks.find(request.kiosk_id.as_str()).await?.is_none() {
        return Err(CoreError::not_found("kiosk", request.kiosk_id.as_str()).into());
    }

    check_targets(db, &request.kiosk_id, &request.payload).await?;

    let record = CommandRecord::new(&request.kiosk_id, &request.payload, issued_by)?;
    let commands = SqliteCommandRepository::new(db.pool().clone());
    commands
        .enqueue(&record, &request.payload.target_lockers())
        .await?;

    let log = SqliteCommandLogRepository::new(db.pool().clone());
    log.append(&CommandLogEntry::new(
        record.id.clone(),
        record.kiosk_id.clone(),
        LogEvent::Submitted,
        None,
    ))
    .await?;

    info!(
        command_id = %record.id,
        kiosk_id = %record.kiosk_id,
        kind = %record.kind,
        "Command accepted"
    );
    Ok(SubmitCommandResponse {
        command_id: record.command_id()?,
    })
}

/// Pending commands for one kiosk, oldest first, bounded.
pub async fn pending(
    db: &Database,
    kiosk: &KioskId,
    limit: i64,
) -> AppResult<Vec<CommandDescriptor>> {
    let commands = SqliteCommandRepository::new(db.pool().clone());
    let records = commands.pending_for_kiosk(kiosk.as_str(), limit).await?;
    let mut descriptors = Vec::with_capacity(records.len());
    for record in records {
        descriptors.push(record.to_descriptor()?);
    }
    Ok(descriptors)
}

/// Claim a pending command for execution.
///
/// Open-type targets move to `opening` here, while the pulse is in
/// flight; lockers that drifted to an incompatible state are skipped
/// and settle at result time.
pub async fn claim(db: &Database, command_id: &str, kiosk: &KioskId) -> AppResult<CommandDescriptor> {
    let now = Utc::now();
    let commands = SqliteCommandRepository::new(db.pool().clone());
    let record = commands.claim(command_id, kiosk.as_str(), now).await?;

    let payload = record.get_payload()?;
    if matches!(record.get_kind()?, CommandKind::Open | CommandKind::BulkOpen) {
        for locker in payload.target_lockers() {
            try_transition(db, &record.kiosk_id, locker, LockerEvent::OpenStarted, now).await?;
        }
    }

    let log = SqliteCommandLogRepository::new(db.pool().clone());
    log.append(&CommandLogEntry::new(
        record.id.clone(),
        record.kiosk_id.clone(),
        LogEvent::Claimed,
        None,
    ))
    .await?;

    debug!(command_id = %record.id, kiosk_id = %record.kiosk_id, "Command claimed");
    Ok(record.to_descriptor()?)
}

/// Fold a kiosk's completion report into the command row, the target
/// lockers, the kiosk error streak, and the audit trail.
pub async fn record_result(
    db: &Database,
    command_id: &str,
    report: &CommandResultReport,
) -> AppResult<CommandRecord> {
    let now = Utc::now();
    let outcome = if report.success {
        CommandOutcome::success(report.duration_ms, report.retry_count)
    } else {
        CommandOutcome::failure(
            report.error_code.clone().unwrap_or_else(|| "COMMAND_FAILED".to_string()),
            report.error_message.clone().unwrap_or_default(),
            Some(report.duration_ms),
            report.retry_count,
        )
    };

    let commands = SqliteCommandRepository::new(db.pool().clone());
    let finished = commands
        .finish(command_id, report.success, &outcome, now)
        .await?;

    settle_targets(db, &finished, report, now).await?;

    let kiosks = SqliteKioskRepository::new(db.pool().clone());
    let streak = kiosks
        .record_hardware_result(&finished.kiosk_id, report.success)
        .await?;
    if !report.success {
        warn!(
            command_id = %finished.id,
            kiosk_id = %finished.kiosk_id,
            error_code = finished.error_code.as_deref().unwrap_or(""),
            streak,
            "Command failed"
        );
    }

    let event = if report.success { LogEvent::Completed } else { LogEvent::Failed };
    let log = SqliteCommandLogRepository::new(db.pool().clone());
    log.append(&CommandLogEntry::new(
        finished.id.clone(),
        finished.kiosk_id.clone(),
        event,
        result_detail(&finished, report)?,
    ))
    .await?;

    Ok(finished)
}

/// Forcibly fail `executing` commands claimed before `cutoff`.
///
/// Open-type targets still in `opening` move to `error`: the physical
/// outcome of their pulse is unknown. Other kinds leave their lockers
/// untouched. When `only_kiosk` is set the pass is scoped to that
/// kiosk (its recovery endpoint); the watchdog sweeps all of them.
pub async fn recover_stale(
    db: &Database,
    cutoff: DateTime<Utc>,
    only_kiosk: Option<&str>,
) -> AppResult<Vec<CommandId>> {
    let now = Utc::now();
    let commands = SqliteCommandRepository::new(db.pool().clone());
    let log = SqliteCommandLogRepository::new(db.pool().clone());

    let mut recovered = Vec::new();
    for record in commands.stale_executing_before(cutoff).await? {
        if let Some(kiosk) = only_kiosk
            && record.kiosk_id != kiosk
        {
            continue;
        }

        let outcome = CommandOutcome::failure(
            RECOVERY_ERROR_CODE,
            "stale executing command failed by recovery",
            None,
            record.retry_count,
        );
        let finished = match commands.finish(&record.id, false, &outcome, now).await {
            Ok(finished) => finished,
            // A result may land between the scan and the guarded move.
            Err(StorageError::CommandNotClaimable { .. }) => continue,
            Err(e) => return Err(e.into()),
        };

        let payload = finished.get_payload()?;
        if matches!(finished.get_kind()?, CommandKind::Open | CommandKind::BulkOpen) {
            for locker in payload.target_lockers() {
                try_transition(db, &finished.kiosk_id, locker, LockerEvent::OpenFailed, now)
                    .await?;
            }
        }

        log.append(&CommandLogEntry::new(
            finished.id.clone(),
            finished.kiosk_id.clone(),
            LogEvent::Recovered,
            finished.claimed_at.map(|at| format!("claimed at {at}")),
        ))
        .await?;

        warn!(
            command_id = %finished.id,
            kiosk_id = %finished.kiosk_id,
            "Stale executing command recovered"
        );
        recovered.push(finished.command_id()?);
    }

    Ok(recovered)
}

/// Server-boot recovery pass.
///
/// Fails every command still `executing` (the previous process cannot
/// report them anymore), then clears orphaned `opening` lockers left
/// behind without a live command.
pub async fn boot_recovery(db: &Database) -> AppResult<Vec<CommandId>> {
    let now = Utc::now();
    let recovered = recover_stale(db, now, None).await?;

    let lockers = SqliteLockerRepository::new(db.pool().clone());
    for row in lockers.list_in_state(LockerState::Opening).await? {
        let locker = row.get_locker_id()?;
        if try_transition(db, &row.kiosk_id, locker, LockerEvent::OpenFailed, now)
            .await?
            .is_some()
        {
            warn!(kiosk_id = %row.kiosk_id, locker = %locker, "Orphaned opening locker moved to error");
        }
    }

    Ok(recovered)
}

/// Event the command kind will eventually apply to its targets.
fn intent_event(kind: CommandKind) -> Option<LockerEvent> {
    match kind {
        CommandKind::Open | CommandKind::BulkOpen => Some(LockerEvent::OpenStarted),
        CommandKind::Block => Some(LockerEvent::Block),
        CommandKind::Unblock => Some(LockerEvent::Unblock),
        CommandKind::Reset => Some(LockerEvent::Reset),
        CommandKind::Buzzer => None,
    }
}

/// Reject a submission whose targets cannot accept the command.
///
/// The check uses the same transition table the lifecycle applies
/// later, so an open on a blocked locker or an unblock on a free one
/// dies here instead of pulsing hardware first.
async fn check_targets(db: &Database, kiosk: &KioskId, payload: &CommandPayload) -> AppResult<()> {
    let Some(event) = intent_event(payload.kind()) else {
        return Ok(());
    };

    let lockers = SqliteLockerRepository::new(db.pool().clone());
    for locker in payload.target_lockers() {
        let row = lockers
            .find(kiosk.as_str(), locker)
            .await?
            .ok_or_else(|| CoreError::not_found("locker", format!("{kiosk}/{locker}")))?;
        let state = row.get_state()?;
        if lockbay_core::state::next_state(state, event).is_none() {
            return Err(CoreError::conflict(format!(
                "Locker {locker} in state {state} cannot accept {}",
                payload.kind()
            ))
            .into());
        }
    }
    Ok(())
}

/// Move each target locker out of `opening` according to the report.
async fn settle_targets(
    db: &Database,
    finished: &CommandRecord,
    report: &CommandResultReport,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let payload = finished.get_payload()?;
    match finished.get_kind()? {
        CommandKind::Open => {
            if let Some(locker) = payload.primary_locker() {
                settle_open(db, &finished.kiosk_id, locker, report.success, now).await?;
            }
        }
        CommandKind::BulkOpen => {
            for locker in payload.target_lockers() {
                let success = report
                    .locker_results
                    .iter()
                    .find(|outcome| outcome.locker_id == locker)
                    .map_or(report.success, |outcome| outcome.success);
                settle_open(db, &finished.kiosk_id, locker, success, now).await?;
            }
        }
        CommandKind::Block => {
            if report.success {
                for locker in payload.target_lockers() {
                    try_transition(db, &finished.kiosk_id, locker, LockerEvent::Block, now).await?;
                }
            }
        }
        CommandKind::Unblock => {
            if report.success {
                for locker in payload.target_lockers() {
                    try_transition(db, &finished.kiosk_id, locker, LockerEvent::Unblock, now)
                        .await?;
                }
            }
        }
        CommandKind::Reset => {
            if report.success {
                for locker in payload.target_lockers() {
                    try_transition(db, &finished.kiosk_id, locker, LockerEvent::Reset, now).await?;
                }
            }
        }
        CommandKind::Buzzer => {}
    }
    Ok(())
}

/// Resolve one opened locker: confirmed pulses promote the hold,
/// unconfirmed ones park the locker in `error`.
async fn settle_open(
    db: &Database,
    kiosk_id: &str,
    locker: LockerId,
    success: bool,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let lockers = SqliteLockerRepository::new(db.pool().clone());
    let Some(row) = lockers.find(kiosk_id, locker).await? else {
        warn!(kiosk_id, locker = %locker, "Opened locker has no row");
        return Ok(());
    };
    if row.get_state()? != LockerState::Opening {
        debug!(
            kiosk_id,
            locker = %locker,
            state = %row.get_state()?,
            "Locker left opening before the result landed"
        );
        return Ok(());
    }

    let event = if success {
        LockerEvent::confirm_open(row.reserved_at.is_some(), row.owned_at.is_some(), row.is_vip)
    } else {
        LockerEvent::OpenFailed
    };
    try_transition(db, kiosk_id, locker, event, now).await?;
    Ok(())
}

/// Audit detail for a terminal command entry.
fn result_detail(
    finished: &CommandRecord,
    report: &CommandResultReport,
) -> AppResult<Option<String>> {
    if !report.locker_results.is_empty() {
        return Ok(Some(serde_json::to_string(&report.locker_results).map_err(StorageError::from)?));
    }
    if !report.success {
        return Ok(report
            .error_message
            .clone()
            .or_else(|| report.error_code.clone()));
    }
    if let CommandPayload::Block { reason: Some(reason), .. } = finished.get_payload()? {
        return Ok(Some(reason));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbay_core::types::OwnerType;
    use lockbay_core::wire::{LockerOutcome, ReserveRequest};
    use lockbay_core::OwnerKey;

    use crate::error::AppError;
    use crate::service::lockers;

    async fn setup() -> (Database, KioskId) {
        let db = Database::in_memory().await.unwrap();
        let kiosk: KioskId = "kiosk-01".parse().unwrap();

        let kiosks = SqliteKioskRepository::new(db.pool().clone());
        kiosks
            .register_heartbeat(kiosk.as_str(), Some("mens"), Some("0.1.0"), None, Utc::now())
            .await
            .unwrap();

        let repo = SqliteLockerRepository::new(db.pool().clone());
        let ids: Vec<LockerId> = (1..=32).map(|id| LockerId::new(id).unwrap()).collect();
        repo.create_missing(kiosk.as_str(), &ids).await.unwrap();

        (db, kiosk)
    }

    fn locker(id: u16) -> LockerId {
        LockerId::new(id).unwrap()
    }

    fn open_request(kiosk: &KioskId, id: u16) -> SubmitCommandRequest {
        SubmitCommandRequest {
            kiosk_id: kiosk.clone(),
            payload: CommandPayload::Open {
                locker_id: locker(id),
                burst: false,
            },
        }
    }

    fn success_report(duration_ms: i64) -> CommandResultReport {
        CommandResultReport {
            success: true,
            duration_ms,
            retry_count: 1,
            error_code: None,
            error_message: None,
            locker_results: Vec::new(),
        }
    }

    fn failure_report(code: &str) -> CommandResultReport {
        CommandResultReport {
            success: false,
            duration_ms: 230,
            retry_count: 3,
            error_code: Some(code.to_string()),
            error_message: Some("no reply from slave 2".to_string()),
            locker_results: Vec::new(),
        }
    }

    async fn locker_state(db: &Database, kiosk: &KioskId, id: u16) -> LockerState {
        let repo = SqliteLockerRepository::new(db.pool().clone());
        repo.find(kiosk.as_str(), locker(id))
            .await
            .unwrap()
            .unwrap()
            .get_state()
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_claim_complete_walkup_open() {
        let (db, kiosk) = setup().await;

        let accepted = submit(&db, &open_request(&kiosk, 5), Some("panel".to_string()))
            .await
            .unwrap();
        let id = accepted.command_id.to_string();

        let batch = pending(&db, &kiosk, 8).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, CommandKind::Open);

        claim(&db, &id, &kiosk).await.unwrap();
        assert_eq!(locker_state(&db, &kiosk, 5).await, LockerState::Opening);

        let finished = record_result(&db, &id, &success_report(420)).await.unwrap();
        assert_eq!(finished.status, "completed");
        assert_eq!(finished.duration_ms, Some(420));
        // A walk-up open on a free locker ends free again.
        assert_eq!(locker_state(&db, &kiosk, 5).await, LockerState::Free);

        let log = SqliteCommandLogRepository::new(db.pool().clone());
        let trail: Vec<String> = log
            .for_command(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.event)
            .collect();
        assert_eq!(trail, vec!["submitted", "claimed", "completed"]);
    }

    #[tokio::test]
    async fn test_duplicate_open_is_conflict() {
        let (db, kiosk) = setup().await;

        let first = submit(&db, &open_request(&kiosk, 5), None).await.unwrap();
        let err = submit(&db, &open_request(&kiosk, 5), None).await.unwrap_err();

        let AppError::Storage(StorageError::DuplicateCommand { existing_id }) = err else {
            panic!("expected duplicate conflict, got {err:?}");
        };
        assert_eq!(existing_id, first.command_id.to_string());
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_kiosk() {
        let (db, _) = setup().await;
        let ghost: KioskId = "kiosk-99".parse().unwrap();

        let err = submit(&db, &open_request(&ghost, 5), None).await.unwrap_err();
        assert!(matches!(err, AppError::Core(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_submit_rejects_open_on_blocked_locker() {
        let (db, kiosk) = setup().await;
        lockers::try_transition(&db, kiosk.as_str(), locker(5), LockerEvent::Block, Utc::now())
            .await
            .unwrap();

        let err = submit(&db, &open_request(&kiosk, 5), None).await.unwrap_err();
        assert!(matches!(err, AppError::Core(CoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_reserved_open_confirms_owned() {
        let (db, kiosk) = setup().await;
        let request = ReserveRequest {
            owner_type: OwnerType::Card,
            owner_key: OwnerKey::new("CARD-9").unwrap(),
        };
        lockers::reserve(&db, &kiosk, locker(7), &request, Utc::now())
            .await
            .unwrap();

        let accepted = submit(&db, &open_request(&kiosk, 7), None).await.unwrap();
        let id = accepted.command_id.to_string();
        claim(&db, &id, &kiosk).await.unwrap();
        record_result(&db, &id, &success_report(400)).await.unwrap();

        assert_eq!(locker_state(&db, &kiosk, 7).await, LockerState::Owned);
    }

    #[tokio::test]
    async fn test_failed_open_parks_locker_in_error() {
        let (db, kiosk) = setup().await;

        let accepted = submit(&db, &open_request(&kiosk, 9), None).await.unwrap();
        let id = accepted.command_id.to_string();
        claim(&db, &id, &kiosk).await.unwrap();

        let finished = record_result(&db, &id, &failure_report("HARDWARE_TIMEOUT"))
            .await
            .unwrap();
        assert_eq!(finished.status, "failed");
        assert_eq!(finished.error_code.as_deref(), Some("HARDWARE_TIMEOUT"));
        assert_eq!(locker_state(&db, &kiosk, 9).await, LockerState::Error);

        // The streak climbed; a later success resets it.
        let kiosks = SqliteKioskRepository::new(db.pool().clone());
        let record = kiosks.find(kiosk.as_str()).await.unwrap().unwrap();
        assert_eq!(record.hardware_error_streak, 1);
    }

    #[tokio::test]
    async fn test_bulk_result_settles_each_locker() {
        let (db, kiosk) = setup().await;
        let request = SubmitCommandRequest {
            kiosk_id: kiosk.clone(),
            payload: CommandPayload::BulkOpen {
                locker_ids: vec![locker(1), locker(2), locker(18)],
                interval_ms: Some(300),
            },
        };

        let accepted = submit(&db, &request, None).await.unwrap();
        let id = accepted.command_id.to_string();
        claim(&db, &id, &kiosk).await.unwrap();
        for target in [1, 2, 18] {
            assert_eq!(locker_state(&db, &kiosk, target).await, LockerState::Opening);
        }

        let report = CommandResultReport {
            success: false,
            duration_ms: 1600,
            retry_count: 1,
            error_code: Some("HARDWARE_TIMEOUT".to_string()),
            error_message: Some("locker 2 did not answer".to_string()),
            locker_results: vec![
                LockerOutcome { locker_id: locker(1), success: true, error_message: None },
                LockerOutcome {
                    locker_id: locker(2),
                    success: false,
                    error_message: Some("no reply from slave 1".to_string()),
                },
                LockerOutcome { locker_id: locker(18), success: true, error_message: None },
            ],
        };
        record_result(&db, &id, &report).await.unwrap();

        assert_eq!(locker_state(&db, &kiosk, 1).await, LockerState::Free);
        assert_eq!(locker_state(&db, &kiosk, 2).await, LockerState::Error);
        assert_eq!(locker_state(&db, &kiosk, 18).await, LockerState::Free);
    }

    #[tokio::test]
    async fn test_block_and_unblock_round_trip() {
        let (db, kiosk) = setup().await;

        let block = SubmitCommandRequest {
            kiosk_id: kiosk.clone(),
            payload: CommandPayload::Block {
                locker_id: locker(4),
                reason: Some("jammed latch".to_string()),
            },
        };
        let accepted = submit(&db, &block, Some("staff".to_string())).await.unwrap();
        let id = accepted.command_id.to_string();
        claim(&db, &id, &kiosk).await.unwrap();
        record_result(&db, &id, &success_report(15)).await.unwrap();
        assert_eq!(locker_state(&db, &kiosk, 4).await, LockerState::Blocked);

        let log = SqliteCommandLogRepository::new(db.pool().clone());
        let trail = log.for_command(&id).await.unwrap();
        assert_eq!(trail.last().unwrap().detail.as_deref(), Some("jammed latch"));

        let unblock = SubmitCommandRequest {
            kiosk_id: kiosk.clone(),
            payload: CommandPayload::Unblock { locker_id: locker(4) },
        };
        let accepted = submit(&db, &unblock, None).await.unwrap();
        let id = accepted.command_id.to_string();
        claim(&db, &id, &kiosk).await.unwrap();
        record_result(&db, &id, &success_report(12)).await.unwrap();
        assert_eq!(locker_state(&db, &kiosk, 4).await, LockerState::Free);
    }

    #[tokio::test]
    async fn test_recovery_fails_stale_commands() {
        let (db, kiosk) = setup().await;

        let accepted = submit(&db, &open_request(&kiosk, 11), None).await.unwrap();
        let id = accepted.command_id.to_string();
        claim(&db, &id, &kiosk).await.unwrap();

        // Claimed just now; a cutoff in the future makes it stale.
        let cutoff = Utc::now() + chrono::Duration::seconds(5);
        let recovered = recover_stale(&db, cutoff, Some(kiosk.as_str())).await.unwrap();
        assert_eq!(recovered, vec![accepted.command_id]);

        let commands = SqliteCommandRepository::new(db.pool().clone());
        let record = commands.find(&id).await.unwrap().unwrap();
        assert_eq!(record.status, "failed");
        assert_eq!(record.error_code.as_deref(), Some(RECOVERY_ERROR_CODE));
        assert_eq!(locker_state(&db, &kiosk, 11).await, LockerState::Error);

        // Nothing left executing afterwards.
        assert!(commands.stale_executing_before(cutoff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recovery_scoped_to_kiosk() {
        let (db, kiosk) = setup().await;
        let other: KioskId = "kiosk-02".parse().unwrap();

        let kiosks = SqliteKioskRepository::new(db.pool().clone());
        kiosks
            .register_heartbeat(other.as_str(), None, None, None, Utc::now())
            .await
            .unwrap();
        let repo = SqliteLockerRepository::new(db.pool().clone());
        repo.create_missing(other.as_str(), &[locker(1)]).await.unwrap();

        let first = submit(&db, &open_request(&kiosk, 1), None).await.unwrap();
        let second = submit(&db, &open_request(&other, 1), None).await.unwrap();
        claim(&db, &first.command_id.to_string(), &kiosk).await.unwrap();
        claim(&db, &second.command_id.to_string(), &other).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(5);
        let recovered = recover_stale(&db, cutoff, Some(other.as_str())).await.unwrap();
        assert_eq!(recovered, vec![second.command_id]);

        let commands = SqliteCommandRepository::new(db.pool().clone());
        let untouched = commands.find(&first.command_id.to_string()).await.unwrap().unwrap();
        assert_eq!(untouched.status, "executing");
    }

    #[tokio::test]
    async fn test_boot_recovery_clears_orphaned_opening() {
        let (db, kiosk) = setup().await;

        // An opening locker without any live command (interrupted claim).
        lockers::try_transition(&db, kiosk.as_str(), locker(3), LockerEvent::OpenStarted, Utc::now())
            .await
            .unwrap();

        let recovered = boot_recovery(&db).await.unwrap();
        assert!(recovered.is_empty());
        assert_eq!(locker_state(&db, &kiosk, 3).await, LockerState::Error);
    }

    #[tokio::test]
    async fn test_buzzer_touches_no_lockers() {
        let (db, kiosk) = setup().await;
        let request = SubmitCommandRequest {
            kiosk_id: kiosk.clone(),
            payload: CommandPayload::Buzzer { beeps: 2, duration_ms: None },
        };

        let accepted = submit(&db, &request, None).await.unwrap();
        let id = accepted.command_id.to_string();
        claim(&db, &id, &kiosk).await.unwrap();
        record_result(&db, &id, &success_report(900)).await.unwrap();

        for id in 1..=4 {
            assert_eq!(locker_state(&db, &kiosk, id).await, LockerState::Free);
        }
    }
}
