use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::resolution::ResolutionResult;
use crate::models::vin::ValidatedVin;
use crate::services::nhtsa::DecodedField;
use crate::services::vin::{self, VIN_LENGTH};

#[derive(Debug, Serialize, Deserialize)]
pub struct DecodeResponse {
    pub results: Vec<DecodedField>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub vin: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_check_digit: Option<char>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub vin: Option<ValidatedVin>,
}

/// GET /api/v1/vin-decode/{vin}
///
/// Forwards to the external decoder.
pub async fn decode_vin(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(vin): Path<String>,
) -> Result<Json<DecodeResponse>, ApiError> {
    let vin = vin.trim();
    let length = vin.chars().count();
    if length != VIN_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "VIN must be exactly {VIN_LENGTH} characters, got {length}"
        )));
    }
    if let Some(c) = vin.chars().find(|c| !vin::is_vin_char(c.to_ascii_uppercase())) {
        return Err(ApiError::BadRequest(format!(
            "VIN contains invalid character '{c}'"
        )));
    }

    let results = state.decoder.decode(vin).await.map_err(ApiError::Upstream)?;
    if results.is_empty() {
        return Err(ApiError::NotFound("No data found for this VIN"));
    }

    Ok(Json(DecodeResponse { results }))
}

/// GET /api/v1/vin/resolve/{vin}
pub async fn resolve_vin(
    State(state): State<AppState>,
    user: AuthUser,
    Path(vin): Path<String>,
) -> Result<Json<ResolutionResult>, ApiError> {
    let result = state.resolver.resolve_str(&vin, user.company_id).await?;
    Ok(Json(result))
}

/// GET /api/v1/vin/validate/{vin}
pub async fn validate_vin(Path(raw): Path<String>) -> Json<ValidateResponse> {
    let vin = vin::normalize(&raw);
    Json(ValidateResponse {
        valid: vin::validate_checksum(&vin),
        expected_check_digit: vin::expected_check_digit(&vin).ok(),
        vin,
    })
}

/// POST /api/v1/vin/extract
pub async fn extract_vin(Json(request): Json<ExtractRequest>) -> Json<ExtractResponse> {
    Json(ExtractResponse {
        vin: vin::extract_vin(&request.text),
    })
}
