//! VIN reconciliation: the tenant's own records first, the external decoder second.

use std::sync::Arc;
use uuid::Uuid;

use crate::db::{StoreError, VehicleStore};
use crate::models::resolution::{ResolutionResult, ResolutionSource, VehicleAttributes};
use crate::models::vin::{ValidatedVin, VinError};
use crate::services::nhtsa::{self, VinDecoder};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The caller passed a VIN that does not validate. Not the same as "no data".
    #[error("invalid VIN: {0}")]
    InvalidVin(#[from] VinError),

    /// Local lookup failed. Never treated as a miss, or a duplicate could be created.
    #[error("local vehicle lookup failed: {0}")]
    LocalLookup(#[from] StoreError),
}

/// Stateless resolver over the vehicle store and the external decoder.
#[derive(Clone)]
pub struct VinResolver {
    store: Arc<dyn VehicleStore>,
    decoder: Arc<dyn VinDecoder>,
}

impl VinResolver {
    pub fn new(store: Arc<dyn VehicleStore>, decoder: Arc<dyn VinDecoder>) -> Self {
        Self { store, decoder }
    }

    /// Resolve a raw VIN string, rejecting anything that does not validate.
    pub async fn resolve_str(
        &self,
        raw: &str,
        company_id: Uuid,
    ) -> Result<ResolutionResult, ResolveError> {
        let vin = ValidatedVin::parse(raw)?;
        self.resolve(&vin, company_id).await
    }

    #[tracing::instrument(skip(self), fields(vin = %vin))]
    pub async fn resolve(
        &self,
        vin: &ValidatedVin,
        company_id: Uuid,
    ) -> Result<ResolutionResult, ResolveError> {
        // Local records have veto power: a hit ends the lookup.
        if let Some(record) = self.store.find_by_vin(company_id, vin).await? {
            tracing::info!(vehicle_id = %record.id, "VIN already registered for tenant");
            return Ok(finish(ResolutionResult::local(VehicleAttributes::from_record(
                vin.as_str(),
                &record,
            ))));
        }

        let fields = match self.decoder.decode(vin.as_str()).await {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!(error = %e, "External VIN decoder failed, falling back to manual entry");
                metrics::counter!("vin_decoder_failures_total").increment(1);
                return Ok(finish(ResolutionResult::none()));
            }
        };

        if !nhtsa::decode_succeeded(&fields) {
            tracing::info!(fields = fields.len(), "External decoder reported no clean decode");
            return Ok(finish(ResolutionResult::none()));
        }

        let result = match nhtsa::map_decoded_fields(vin.as_str(), &fields) {
            Some(attributes) => ResolutionResult::external(attributes),
            None => ResolutionResult::none(),
        };
        Ok(finish(result))
    }
}

fn finish(result: ResolutionResult) -> ResolutionResult {
    let source = match result.source {
        ResolutionSource::Local => "local",
        ResolutionSource::External => "external",
        ResolutionSource::None => "none",
    };
    metrics::counter!("vin_resolutions_total", "source" => source).increment(1);
    tracing::debug!(source, found = result.found, "VIN resolved");
    result
}
