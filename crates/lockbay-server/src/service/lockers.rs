//! Issuer-facing locker holds and the shared transition primitive.
//!
//! Every state change funnels through the core transition table and the
//! storage version guard. [`try_transition`] is the lenient form used by
//! command processing and the sweeps: a locker that has drifted to a
//! state the event no longer fits is skipped, not an error. The issuer
//! operations (`reserve`, `release`) are strict and surface conflicts.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use lockbay_core::state::next_state;
use lockbay_core::wire::{LockerView, ReleaseRequest, ReserveRequest};
use lockbay_core::{Error as CoreError, KioskId, LockerEvent, LockerId, LockerState};
use lockbay_storage::{
    Database, LockerMutation, LockerRecord, LockerRepository, SqliteLockerRepository, StorageError,
};

use crate::error::AppResult;

/// Re-reads before a guarded transition gives up on version conflicts.
const TRANSITION_ATTEMPTS: u32 = 3;

/// Reserve a free locker for an owner key.
///
/// The hold is one atomic guarded write: the row must still be in the
/// state the caller read, so two racing reserves cannot both land.
pub async fn reserve(
    db: &Database,
    kiosk: &KioskId,
    locker: LockerId,
    request: &ReserveRequest,
    now: DateTime<Utc>,
) -> AppResult<LockerView> {
    let repo = SqliteLockerRepository::new(db.pool().clone());
    let row = repo
        .find(kiosk.as_str(), locker)
        .await?
        .ok_or_else(|| CoreError::not_found("locker", format!("{kiosk}/{locker}")))?;

    let current = row.get_state()?;
    let next = lockbay_core::state::apply(current, LockerEvent::Reserve)?;

    let change = LockerMutation {
        state: next,
        owner_type: Some(request.owner_type),
        owner_key: Some(request.owner_key.as_str().to_string()),
        reserved_at: Some(now),
        owned_at: None,
    };
    let updated = repo
        .update_state(kiosk.as_str(), locker, row.version, &change)
        .await?;

    Ok(updated.to_view()?)
}

/// Release an owned locker back to the pool.
///
/// When the request names an owner key, the release only succeeds for
/// the matching holder. Reserved holds are not releasable here; they
/// end by TTL expiry.
pub async fn release(
    db: &Database,
    kiosk: &KioskId,
    locker: LockerId,
    request: &ReleaseRequest,
    now: DateTime<Utc>,
) -> AppResult<LockerView> {
    let repo = SqliteLockerRepository::new(db.pool().clone());
    let row = repo
        .find(kiosk.as_str(), locker)
        .await?
        .ok_or_else(|| CoreError::not_found("locker", format!("{kiosk}/{locker}")))?;

    if let Some(expected) = &request.owner_key
        && row.owner_key.as_deref() != Some(expected.as_str())
    {
        return Err(CoreError::conflict(format!("Locker {locker} is held by a different owner")).into());
    }

    let current = row.get_state()?;
    let next = lockbay_core::state::apply(current, LockerEvent::Release)?;

    let updated = repo
        .update_state(kiosk.as_str(), locker, row.version, &LockerMutation::cleared(next))
        .await?;
    debug!(kiosk_id = %kiosk, locker = %locker, at = %now, "Locker released");

    Ok(updated.to_view()?)
}

/// Return lockers whose reservation started before `cutoff` to `Free`.
///
/// Runs from the background sweep. A locker that moved on in the
/// meantime (claimed by an open, blocked by staff) is skipped by the
/// transition guard.
pub async fn expire_stale_reservations(db: &Database, cutoff: DateTime<Utc>) -> AppResult<u64> {
    let repo = SqliteLockerRepository::new(db.pool().clone());
    let mut expired = 0u64;
    for row in repo.list_reserved_before(cutoff).await? {
        let locker = row.get_locker_id()?;
        if try_transition(db, &row.kiosk_id, locker, LockerEvent::Expire, Utc::now())
            .await?
            .is_some()
        {
            debug!(kiosk_id = %row.kiosk_id, locker = %locker, "Reservation expired");
            expired += 1;
        }
    }
    Ok(expired)
}

/// Apply `event` to one locker under the version guard, re-reading on
/// conflict.
///
/// Returns the updated row, or `None` when the locker row is missing or
/// its current state does not accept the event. Command processing
/// relies on the skip: a locker that expired or was blocked between
/// claim and result must not fail the whole report.
pub(crate) async fn try_transition(
    db: &Database,
    kiosk_id: &str,
    locker: LockerId,
    event: LockerEvent,
    now: DateTime<Utc>,
) -> AppResult<Option<LockerRecord>> {
    let repo = SqliteLockerRepository::new(db.pool().clone());
    let mut attempts = 0;
    loop {
        attempts += 1;

        let Some(row) = repo.find(kiosk_id, locker).await? else {
            warn!(kiosk_id, locker = %locker, event = event.as_str(), "No locker row for transition");
            return Ok(None);
        };
        let current = row.get_state()?;
        let Some(next) = next_state(current, event) else {
            debug!(
                kiosk_id,
                locker = %locker,
                state = current.as_str(),
                event = event.as_str(),
                "Transition skipped"
            );
            return Ok(None);
        };

        let change = mutation_for(&row, next, now)?;
        match repo.update_state(kiosk_id, locker, row.version, &change).await {
            Ok(updated) => return Ok(Some(updated)),
            Err(StorageError::VersionConflict { .. }) if attempts < TRANSITION_ATTEMPTS => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Pick the owner columns the target state carries.
///
/// `Owned` keeps the holder and stamps `owned_at` on first entry;
/// `Free` drops everything; the transient and staff states carry the
/// current columns forward so diagnosis keeps the hold context.
fn mutation_for(
    row: &LockerRecord,
    next: LockerState,
    now: DateTime<Utc>,
) -> AppResult<LockerMutation> {
    Ok(match next {
        LockerState::Free => LockerMutation::cleared(LockerState::Free),
        LockerState::Owned => LockerMutation {
            state: LockerState::Owned,
            owner_type: row.get_owner_type()?,
            owner_key: row.owner_key.clone(),
            reserved_at: None,
            owned_at: row.owned_at.or(Some(now)),
        },
        other => LockerMutation::preserving(row, other)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbay_core::types::OwnerType;
    use lockbay_core::OwnerKey;

    use crate::error::AppError;

    async fn setup() -> (Database, KioskId) {
        let db = Database::in_memory().await.unwrap();
        let kiosk: KioskId = "kiosk-01".parse().unwrap();
        let repo = SqliteLockerRepository::new(db.pool().clone());
        let ids: Vec<LockerId> = (1..=4).map(|id| LockerId::new(id).unwrap()).collect();
        repo.create_missing(kiosk.as_str(), &ids).await.unwrap();
        (db, kiosk)
    }

    fn locker(id: u16) -> LockerId {
        LockerId::new(id).unwrap()
    }

    fn reserve_request(key: &str) -> ReserveRequest {
        ReserveRequest {
            owner_type: OwnerType::Card,
            owner_key: OwnerKey::new(key).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_reserve_takes_the_hold() {
        let (db, kiosk) = setup().await;

        let view = reserve(&db, &kiosk, locker(1), &reserve_request("CARD-9"), Utc::now())
            .await
            .unwrap();
        assert_eq!(view.state, LockerState::Reserved);
        assert_eq!(view.owner_key.unwrap().as_str(), "CARD-9");
        assert!(view.reserved_at.is_some());
    }

    #[tokio::test]
    async fn test_reserve_rejects_non_free_locker() {
        let (db, kiosk) = setup().await;
        reserve(&db, &kiosk, locker(1), &reserve_request("CARD-9"), Utc::now())
            .await
            .unwrap();

        let err = reserve(&db, &kiosk, locker(1), &reserve_request("CARD-10"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Core(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_release_requires_owned_state() {
        let (db, kiosk) = setup().await;
        reserve(&db, &kiosk, locker(2), &reserve_request("CARD-9"), Utc::now())
            .await
            .unwrap();

        // Reserved holds end by TTL, not by release.
        let err = release(&db, &kiosk, locker(2), &ReleaseRequest { owner_key: None }, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Core(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_release_checks_owner_key() {
        let (db, kiosk) = setup().await;
        let now = Utc::now();
        reserve(&db, &kiosk, locker(3), &reserve_request("CARD-9"), now)
            .await
            .unwrap();
        try_transition(&db, kiosk.as_str(), locker(3), LockerEvent::OpenStarted, now)
            .await
            .unwrap();
        let owned = try_transition(
            &db,
            kiosk.as_str(),
            locker(3),
            LockerEvent::ConfirmOwned,
            now,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(owned.get_state().unwrap(), LockerState::Owned);

        let wrong = ReleaseRequest {
            owner_key: Some(OwnerKey::new("CARD-OTHER").unwrap()),
        };
        let err = release(&db, &kiosk, locker(3), &wrong, now).await.unwrap_err();
        assert!(matches!(err, AppError::Core(CoreError::Conflict { .. })));

        let right = ReleaseRequest {
            owner_key: Some(OwnerKey::new("CARD-9").unwrap()),
        };
        let view = release(&db, &kiosk, locker(3), &right, now).await.unwrap();
        assert_eq!(view.state, LockerState::Free);
        assert!(view.owner_key.is_none());
    }

    #[tokio::test]
    async fn test_try_transition_skips_wrong_state() {
        let (db, kiosk) = setup().await;

        // ConfirmOwned is only valid from Opening.
        let outcome = try_transition(
            &db,
            kiosk.as_str(),
            locker(4),
            LockerEvent::ConfirmOwned,
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_try_transition_missing_row_is_skip() {
        let (db, kiosk) = setup().await;
        let outcome = try_transition(
            &db,
            kiosk.as_str(),
            locker(200),
            LockerEvent::Block,
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_owned_mutation_stamps_owned_at_once() {
        let (db, kiosk) = setup().await;
        let now = Utc::now();
        reserve(&db, &kiosk, locker(1), &reserve_request("CARD-9"), now)
            .await
            .unwrap();
        try_transition(&db, kiosk.as_str(), locker(1), LockerEvent::OpenStarted, now)
            .await
            .unwrap();
        let owned = try_transition(&db, kiosk.as_str(), locker(1), LockerEvent::ConfirmOwned, now)
            .await
            .unwrap()
            .unwrap();

        assert!(owned.owned_at.is_some());
        assert!(owned.reserved_at.is_none());
        assert_eq!(owned.owner_key.as_deref(), Some("CARD-9"));
    }

    #[tokio::test]
    async fn test_expiry_sweep_frees_old_reservations_only() {
        let (db, kiosk) = setup().await;
        let now = Utc::now();
        reserve(&db, &kiosk, locker(1), &reserve_request("CARD-OLD"), now - chrono::Duration::seconds(120))
            .await
            .unwrap();
        reserve(&db, &kiosk, locker(2), &reserve_request("CARD-NEW"), now)
            .await
            .unwrap();

        let cutoff = now - chrono::Duration::seconds(90);
        let expired = expire_stale_reservations(&db, cutoff).await.unwrap();
        assert_eq!(expired, 1);

        let repo = SqliteLockerRepository::new(db.pool().clone());
        let old = repo.find(kiosk.as_str(), locker(1)).await.unwrap().unwrap();
        assert_eq!(old.get_state().unwrap(), LockerState::Free);
        assert!(old.owner_key.is_none());

        let fresh = repo.find(kiosk.as_str(), locker(2)).await.unwrap().unwrap();
        assert_eq!(fresh.get_state().unwrap(), LockerState::Reserved);
    }
}
