use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod health;
pub mod metrics;
pub mod scan;
pub mod vehicles;
pub mod vin;

/// Health check plus every `/api/v1` route.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/vehicles",
            get(vehicles::list_vehicles).post(vehicles::create_vehicle),
        )
        .route("/vehicles/by-vin/{vin}", get(vehicles::find_by_vin))
        .route("/vehicles/{id}", get(vehicles::get_vehicle))
        .route("/vin-decode/{vin}", get(vin::decode_vin))
        .route("/vin/resolve/{vin}", get(vin::resolve_vin))
        .route("/vin/validate/{vin}", get(vin::validate_vin))
        .route("/vin/extract", post(vin::extract_vin))
        .route("/scan/sessions", post(scan::create_session))
        .route(
            "/scan/sessions/{id}",
            get(scan::get_session).delete(scan::delete_session),
        )
        .route("/scan/sessions/{id}/devices", get(scan::list_devices))
        .route("/scan/sessions/{id}/start", post(scan::start_scan))
        .route("/scan/sessions/{id}/stop", post(scan::stop_scan))
        .route("/scan/sessions/{id}/frames", post(scan::push_frame))
        .route(
            "/scan/sessions/{id}/device-error",
            post(scan::report_device_error),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api)
        .with_state(state)
}
