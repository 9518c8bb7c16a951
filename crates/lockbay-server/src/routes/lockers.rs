//! Issuer-facing locker endpoints.

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;

use lockbay_core::wire::{LockerView, ReleaseRequest, ReserveRequest};
use lockbay_storage::{LockerRepository, SqliteLockerRepository};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::routes::{parse_kiosk, parse_locker};
use crate::service::lockers;
use crate::state::AppState;

/// `GET /api/v1/kiosks/{id}/lockers`.
pub async fn list(
    State(state): State<AppState>,
    Path(kiosk_id): Path<String>,
) -> AppResult<Json<DataResponse<Vec<LockerView>>>> {
    let kiosk = parse_kiosk(&kiosk_id)?;
    let repo = SqliteLockerRepository::new(state.db.pool().clone());

    let mut views = Vec::new();
    for record in repo.list_for_kiosk(kiosk.as_str()).await? {
        views.push(record.to_view()?);
    }
    Ok(Json(DataResponse { data: views }))
}

/// `POST /api/v1/kiosks/{id}/lockers/{locker}/reserve`.
pub async fn reserve(
    State(state): State<AppState>,
    Path((kiosk_id, locker_id)): Path<(String, String)>,
    Json(request): Json<ReserveRequest>,
) -> AppResult<Json<DataResponse<LockerView>>> {
    let kiosk = parse_kiosk(&kiosk_id)?;
    let locker = parse_locker(&locker_id)?;
    let view = lockers::reserve(&state.db, &kiosk, locker, &request, Utc::now()).await?;
    Ok(Json(DataResponse { data: view }))
}

/// `POST /api/v1/kiosks/{id}/lockers/{locker}/release`.
pub async fn release(
    State(state): State<AppState>,
    Path((kiosk_id, locker_id)): Path<(String, String)>,
    Json(request): Json<ReleaseRequest>,
) -> AppResult<Json<DataResponse<LockerView>>> {
    let kiosk = parse_kiosk(&kiosk_id)?;
    let locker = parse_locker(&locker_id)?;
    let view = lockers::release(&state.db, &kiosk, locker, &request, Utc::now()).await?;
    Ok(Json(DataResponse { data: view }))
}
