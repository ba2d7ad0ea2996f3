use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owning client as embedded in vehicle responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRef {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Employee a vehicle is assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRef {
    pub id: Uuid,
    pub name: String,
}

/// A vehicle stored under a tenant, joined with its client and assignee.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub vin: Option<String>,
    pub license_plate: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub engine_type: Option<String>,
    pub transmission: Option<String>,
    pub fuel_type: Option<String>,
    pub mileage: Option<i32>,
    pub parking_spot: Option<String>,
    pub client: Option<ClientRef>,
    pub assigned_to: Option<EmployeeRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /vehicles`.
///
/// Unset client or assignee is `None`, not a placeholder id.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicle {
    #[garde(skip)]
    pub vin: Option<String>,

    #[garde(length(min = 1, max = 20))]
    pub license_plate: String,

    #[garde(length(max = 100))]
    pub make: Option<String>,

    #[garde(length(max = 100))]
    pub model: Option<String>,

    #[garde(range(min = 1886, max = 2100))]
    pub year: Option<i32>,

    #[garde(length(max = 50))]
    pub color: Option<String>,

    #[garde(length(max = 100))]
    pub engine_type: Option<String>,

    #[garde(length(max = 100))]
    pub transmission: Option<String>,

    #[garde(length(max = 50))]
    pub fuel_type: Option<String>,

    #[garde(range(min = 0))]
    pub mileage: Option<i32>,

    #[garde(length(max = 50))]
    pub parking_spot: Option<String>,

    #[garde(skip)]
    pub client_id: Option<Uuid>,

    #[garde(skip)]
    pub assigned_to_id: Option<Uuid>,
}

/// Response of the local by-VIN lookup.
#[derive(Debug, Serialize, Deserialize)]
pub struct VinLookupResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleRecord>,
}
