//! Kiosk registry, heartbeat, and zone/inventory configuration.

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use tracing::debug;

use lockbay_core::types::KioskStatus;
use lockbay_core::wire::{
    HeartbeatRequest, HeartbeatResponse, KioskSummary, ReplaceRelayCardsRequest,
    ReplaceZonesRequest, SyncResponse, ZoneLayoutView,
};
use lockbay_core::Error as CoreError;
use lockbay_storage::{KioskRepository, SqliteKioskRepository};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::routes::parse_kiosk;
use crate::service::sync;
use crate::state::AppState;

/// `POST /api/v1/kiosks/heartbeat` — upsert liveness; repeat calls
/// never conflict.
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> AppResult<Json<DataResponse<HeartbeatResponse>>> {
    let kiosks = SqliteKioskRepository::new(state.db.pool().clone());
    kiosks
        .register_heartbeat(
            request.kiosk_id.as_str(),
            request.zone.as_deref(),
            request.version.as_deref(),
            request.hardware_id.as_deref(),
            Utc::now(),
        )
        .await?;
    debug!(kiosk_id = %request.kiosk_id, "Heartbeat");

    Ok(Json(DataResponse {
        data: HeartbeatResponse {
            status: KioskStatus::Online,
            poll_interval_ms: state.config.poll_interval_ms,
        },
    }))
}

/// `GET /api/v1/kiosks` — the fleet with derived online status.
pub async fn list(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<KioskSummary>>>> {
    let kiosks = SqliteKioskRepository::new(state.db.pool().clone());
    let now = Utc::now();
    let offline_after = state.config.offline_after();

    let mut summaries = Vec::new();
    for record in kiosks.list().await? {
        summaries.push(record.to_summary(now, offline_after)?);
    }
    Ok(Json(DataResponse { data: summaries }))
}

/// `GET /api/v1/kiosks/{id}`.
pub async fn show(
    State(state): State<AppState>,
    Path(kiosk_id): Path<String>,
) -> AppResult<Json<DataResponse<KioskSummary>>> {
    let kiosk = parse_kiosk(&kiosk_id)?;
    let kiosks = SqliteKioskRepository::new(state.db.pool().clone());
    let record = kiosks
        .find(kiosk.as_str())
        .await?
        .ok_or_else(|| CoreError::not_found("kiosk", kiosk.as_str()))?;
    let summary = record.to_summary(Utc::now(), state.config.offline_after())?;
    Ok(Json(DataResponse { data: summary }))
}

/// `GET /api/v1/kiosks/{id}/zones`.
pub async fn zones(
    State(state): State<AppState>,
    Path(kiosk_id): Path<String>,
) -> AppResult<Json<DataResponse<ZoneLayoutView>>> {
    let kiosk = parse_kiosk(&kiosk_id)?;
    let view = sync::layout(&state.db, &kiosk).await?;
    Ok(Json(DataResponse { data: view }))
}

/// `PUT /api/v1/kiosks/{id}/zones` — replace the zone table.
pub async fn replace_zones(
    State(state): State<AppState>,
    Path(kiosk_id): Path<String>,
    Json(request): Json<ReplaceZonesRequest>,
) -> AppResult<Json<DataResponse<ZoneLayoutView>>> {
    let kiosk = parse_kiosk(&kiosk_id)?;
    let view = sync::replace_zones(&state.db, &kiosk, request.zones).await?;
    Ok(Json(DataResponse { data: view }))
}

/// `PUT /api/v1/kiosks/{id}/relay-cards` — replace the inventory and
/// run the zone sync.
pub async fn replace_relay_cards(
    State(state): State<AppState>,
    Path(kiosk_id): Path<String>,
    Json(request): Json<ReplaceRelayCardsRequest>,
) -> AppResult<Json<DataResponse<SyncResponse>>> {
    let kiosk = parse_kiosk(&kiosk_id)?;
    let outcome = sync::replace_relay_cards(&state.db, &kiosk, &request.cards).await?;
    Ok(Json(DataResponse { data: outcome }))
}
