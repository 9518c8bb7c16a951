//! Command lifecycle endpoints: submit, poll, claim, result, recover.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;

use lockbay_core::wire::{
    ClaimRequest, CommandDescriptor, CommandResultReport, RecoverResponse, SubmitCommandRequest,
    SubmitCommandResponse,
};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::routes::parse_kiosk;
use crate::service::queue;
use crate::state::AppState;

/// `POST /api/v1/commands` — admit a command, `202` or `409`.
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmitCommandRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<SubmitCommandResponse>>)> {
    let issued_by = headers
        .get("x-issued-by")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    let accepted = queue::submit(&state.db, &request, issued_by).await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: accepted })))
}

/// `GET /api/v1/kiosks/{id}/commands` — pending descriptors, oldest first.
pub async fn pending(
    State(state): State<AppState>,
    Path(kiosk_id): Path<String>,
) -> AppResult<Json<DataResponse<Vec<CommandDescriptor>>>> {
    let kiosk = parse_kiosk(&kiosk_id)?;
    let batch = queue::pending(&state.db, &kiosk, state.config.poll_batch).await?;
    Ok(Json(DataResponse { data: batch }))
}

/// `POST /api/v1/commands/{id}/claim` — move pending to executing.
pub async fn claim(
    State(state): State<AppState>,
    Path(command_id): Path<String>,
    Json(request): Json<ClaimRequest>,
) -> AppResult<Json<DataResponse<CommandDescriptor>>> {
    let descriptor = queue::claim(&state.db, &command_id, &request.kiosk_id).await?;
    Ok(Json(DataResponse { data: descriptor }))
}

/// `POST /api/v1/commands/{id}/result` — fold in the kiosk's report.
pub async fn result(
    State(state): State<AppState>,
    Path(command_id): Path<String>,
    Json(report): Json<CommandResultReport>,
) -> AppResult<StatusCode> {
    queue::record_result(&state.db, &command_id, &report).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/kiosks/{id}/recover` — fail that kiosk's stale
/// executing commands (kiosk startup recovery).
pub async fn recover(
    State(state): State<AppState>,
    Path(kiosk_id): Path<String>,
) -> AppResult<Json<DataResponse<RecoverResponse>>> {
    let kiosk = parse_kiosk(&kiosk_id)?;
    let cutoff = Utc::now() - state.config.stale_after();
    let recovered = queue::recover_stale(&state.db, cutoff, Some(kiosk.as_str())).await?;
    Ok(Json(DataResponse {
        data: RecoverResponse { recovered },
    }))
}
