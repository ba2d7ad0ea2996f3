use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::vehicle::{ClientRef, EmployeeRef, VehicleRecord};

/// Where resolved vehicle data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionSource {
    /// The tenant already has a vehicle with this VIN.
    Local,
    /// Generic decode data for a vehicle the tenant does not have yet.
    External,
    /// Nothing usable; the user enters the vehicle by hand.
    None,
}

/// Canonical vehicle attributes used to pre-fill the creation form.
///
/// Unknown fields stay `None`; they are never coerced to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleAttributes {
    pub vin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_cylinders: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub displacement_l: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horsepower: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmission: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mileage: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parking_spot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<EmployeeRef>,
}

impl VehicleAttributes {
    /// Attributes of one of the tenant's own vehicle records.
    pub fn from_record(vin: &str, record: &VehicleRecord) -> Self {
        Self {
            vin: vin.to_string(),
            license_plate: Some(record.license_plate.clone()),
            make: record.make.clone(),
            model: record.model.clone(),
            year: record.year,
            color: record.color.clone(),
            engine_type: record.engine_type.clone(),
            transmission: record.transmission.clone(),
            fuel_type: record.fuel_type.clone(),
            mileage: record.mileage,
            parking_spot: record.parking_spot.clone(),
            client: record.client.clone(),
            assigned_to: record.assigned_to.clone(),
            ..Default::default()
        }
    }
}

/// Outcome of resolving a VIN for a tenant.
///
/// `found == true` only together with `source == Local`: the VIN already
/// belongs to one of the tenant's vehicles and creation must be blocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub found: bool,
    pub source: ResolutionSource,
    pub data: Option<VehicleAttributes>,
    pub conflict_owner: Option<ClientRef>,
}

impl ResolutionResult {
    pub fn local(data: VehicleAttributes) -> Self {
        let conflict_owner = data.client.clone();
        Self {
            found: true,
            source: ResolutionSource::Local,
            data: Some(data),
            conflict_owner,
        }
    }

    pub fn external(data: VehicleAttributes) -> Self {
        Self {
            found: false,
            source: ResolutionSource::External,
            data: Some(data),
            conflict_owner: None,
        }
    }

    pub fn none() -> Self {
        Self {
            found: false,
            source: ResolutionSource::None,
            data: None,
            conflict_owner: None,
        }
    }

    /// True when the calling form must refuse to create a vehicle.
    pub fn blocks_creation(&self) -> bool {
        self.found
    }

    /// Message shown when creation is blocked by an existing vehicle.
    pub fn duplicate_message(&self) -> Option<String> {
        if !self.blocks_creation() {
            return None;
        }
        let owner = self
            .conflict_owner
            .as_ref()
            .map(|c| c.name.as_str())
            .unwrap_or("No owner");
        Some(format!(
            "This vehicle already exists in your database. Owner: {owner}"
        ))
    }
}
