use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::vehicle::{NewVehicle, VehicleRecord, VinLookupResponse};
use crate::models::vin::ValidatedVin;
use crate::services::vin::VIN_LENGTH;

/// GET /api/v1/vehicles
pub async fn list_vehicles(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<VehicleRecord>>, ApiError> {
    Ok(Json(state.vehicles.list(user.company_id).await?))
}

/// GET /api/v1/vehicles/{id}
pub async fn get_vehicle(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<VehicleRecord>, ApiError> {
    state
        .vehicles
        .find_by_id(user.company_id, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Vehicle not found"))
}

/// POST /api/v1/vehicles
///
/// The plate is trimmed before validation, so a blank plate is rejected.
/// A VIN, when given, must carry a valid check digit and is stored upper-case.
/// Duplicates are rejected by the store, including ones racing this request.
pub async fn create_vehicle(
    State(state): State<AppState>,
    user: AuthUser,
    Json(mut vehicle): Json<NewVehicle>,
) -> Result<(StatusCode, Json<VehicleRecord>), ApiError> {
    vehicle.license_plate = vehicle.license_plate.trim().to_string();
    vehicle.validate()?;

    vehicle.vin = match vehicle.vin.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(ValidatedVin::parse(raw)?.into()),
        _ => None,
    };

    let record = state.vehicles.create(user.company_id, &vehicle).await?;
    tracing::info!(vehicle_id = %record.id, company_id = %user.company_id, "Vehicle created");

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/vehicles/by-vin/{vin}
///
/// A 17-character string that fails the checksum cannot match a stored
/// vehicle, so it is reported as not found.
pub async fn find_by_vin(
    State(state): State<AppState>,
    user: AuthUser,
    Path(vin): Path<String>,
) -> Result<Json<VinLookupResponse>, ApiError> {
    let length = vin.trim().chars().count();
    if length != VIN_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "VIN must be exactly {VIN_LENGTH} characters, got {length}"
        )));
    }

    let Ok(vin) = ValidatedVin::parse(&vin) else {
        return Ok(Json(VinLookupResponse {
            found: false,
            vehicle: None,
        }));
    };

    let vehicle = state.vehicles.find_by_vin(user.company_id, &vin).await?;
    Ok(Json(VinLookupResponse {
        found: vehicle.is_some(),
        vehicle,
    }))
}
