use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::capture::{DeviceErrorKind, Frame, ScanSession};
use crate::error::ApiError;
use crate::models::scan::{DeviceInfo, ScanMode, ScanSnapshot};

/// How long a device-error report waits for the scan to reflect the failure.
const SETTLE_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
    pub mode: Option<ScanMode>,
    pub device_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartParams {
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceErrorReport {
    pub kind: DeviceErrorKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub snapshot: ScanSnapshot,
}

#[derive(Debug, Serialize)]
pub struct FrameAccepted {
    pub accepted: bool,
}

impl SessionResponse {
    fn of(session: &ScanSession) -> Json<Self> {
        Json(Self {
            id: session.id,
            snapshot: session.engine.snapshot(),
        })
    }
}

async fn session(state: &AppState, user: &AuthUser, id: Uuid) -> Result<Arc<ScanSession>, ApiError> {
    state
        .scans
        .get(user.company_id, id)
        .await
        .ok_or(ApiError::NotFound("Scan session not found"))
}

/// POST /api/v1/scan/sessions
///
/// Create a session and start scanning.
pub async fn create_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateSessionRequest>,
) -> (StatusCode, Json<SessionResponse>) {
    let session = state
        .scans
        .create(user.company_id, request.devices, request.mode)
        .await;

    // A failed start is reported through the snapshot's error state.
    if let Err(e) = session.engine.start(request.device_id.as_deref()).await {
        tracing::info!(session_id = %session.id, error = %e, "Scan session created without scanning");
    }

    (StatusCode::CREATED, SessionResponse::of(&session))
}

/// GET /api/v1/scan/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = session(&state, &user, id).await?;
    Ok(SessionResponse::of(&session))
}

/// GET /api/v1/scan/sessions/{id}/devices
pub async fn list_devices(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DeviceInfo>>, ApiError> {
    let session = session(&state, &user, id).await?;
    Ok(Json(session.engine.list_devices().await))
}

/// POST /api/v1/scan/sessions/{id}/start?deviceId=...
///
/// An explicit start is a user retry: a recorded permission denial is dropped
/// so the browser can prompt again.
pub async fn start_scan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(params): Query<StartParams>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = session(&state, &user, id).await?;
    if session.feed.clear_permission_denial() {
        tracing::info!(session_id = %id, "Retrying after camera permission denial");
    }
    if let Err(e) = session.engine.start(params.device_id.as_deref()).await {
        tracing::info!(session_id = %id, error = %e, "Scan did not start");
    }
    Ok(SessionResponse::of(&session))
}

/// POST /api/v1/scan/sessions/{id}/stop
pub async fn stop_scan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = session(&state, &user, id).await?;
    session.engine.stop().await;
    Ok(SessionResponse::of(&session))
}

/// POST /api/v1/scan/sessions/{id}/frames
///
/// One captured frame as multipart field `frame`.
pub async fn push_frame(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FrameAccepted>), ApiError> {
    let session = session(&state, &user, id).await?;

    let mut frame_data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("frame") {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            frame_data = Some(data);
        }
    }
    let data = frame_data.ok_or_else(|| ApiError::BadRequest("Missing frame field".to_string()))?;

    image::guess_format(&data).map_err(|_| ApiError::UnsupportedMediaType)?;

    if !session.engine.snapshot().state.is_active() {
        return Err(ApiError::Conflict("Scanner is not active".to_string()));
    }

    let frame = tokio::task::spawn_blocking(move || Frame::from_bytes(&data))
        .await
        .map_err(|e| ApiError::Internal(Box::new(e)))??;

    let accepted = session.feed.push_frame(frame);
    Ok((StatusCode::ACCEPTED, Json(FrameAccepted { accepted })))
}

/// POST /api/v1/scan/sessions/{id}/device-error
///
/// A failure reported by the browser's media APIs.
pub async fn report_device_error(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(report): Json<DeviceErrorReport>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = session(&state, &user, id).await?;
    tracing::info!(session_id = %id, kind = ?report.kind, "Client reported device error");

    // Undelivered when no stream is open; a denial still blocks later starts.
    let delivered = session.feed.report_failure(report.kind.into());
    if delivered {
        let settled = tokio::time::timeout(SETTLE_WAIT, session.engine.wait_until_settled()).await;
        if settled.is_err() {
            tracing::warn!(session_id = %id, "Scan did not settle after device error");
        }
    }
    Ok(SessionResponse::of(&session))
}

/// DELETE /api/v1/scan/sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.scans.remove(user.company_id, id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Scan session not found"))
    }
}
