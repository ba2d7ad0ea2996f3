use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::capture::ScanSessions;
use crate::db::VehicleStore;
use crate::services::{nhtsa::VinDecoder, resolver::VinResolver};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub vehicles: Arc<dyn VehicleStore>,
    pub decoder: Arc<dyn VinDecoder>,
    pub resolver: Arc<VinResolver>,
    pub scans: Arc<ScanSessions>,
    pub auth: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(
        vehicles: Arc<dyn VehicleStore>,
        decoder: Arc<dyn VinDecoder>,
        scans: ScanSessions,
        auth: TokenVerifier,
    ) -> Self {
        let resolver = VinResolver::new(vehicles.clone(), decoder.clone());
        Self {
            vehicles,
            decoder,
            resolver: Arc::new(resolver),
            scans: Arc::new(scans),
            auth: Arc::new(auth),
        }
    }
}
