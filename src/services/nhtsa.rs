//! NHTSA vPIC VIN Decoder Client
//!
//! Decodes a VIN into manufacturer-published attributes through the public
//! vPIC API. Results come back as a flat list of `{Variable, Value}` pairs.
//!
//! Official Source: <https://vpic.nhtsa.dot.gov/api/>

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::resolution::VehicleAttributes;
use crate::services::vin::{is_vin_char, VIN_LENGTH};

pub const DEFAULT_BASE_URL: &str = "https://vpic.nhtsa.dot.gov/api";

/// Value vPIC uses for fields that do not apply to a vehicle.
const NOT_APPLICABLE: &str = "Not Applicable";

/// Variable carrying the decoder's status codes ("0" = clean decode).
const ERROR_CODE_VARIABLE: &str = "Error Code";

/// One `{Variable, Value}` pair of a decode result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedField {
    #[serde(rename = "Variable")]
    pub variable: String,
    #[serde(rename = "Value")]
    pub value: Option<String>,
}

impl DecodedField {
    pub fn new(variable: &str, value: &str) -> Self {
        Self {
            variable: variable.to_string(),
            value: Some(value.to_string()),
        }
    }

    /// The value, unless it is missing, blank or "Not Applicable".
    pub fn usable_value(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(NOT_APPLICABLE))
    }
}

#[derive(Deserialize)]
struct DecodeVinResponse {
    #[serde(rename = "Results", default)]
    results: Vec<DecodedField>,
}

/// Error type for external decoder operations.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Invalid VIN format: expected {VIN_LENGTH} characters, got {0}")]
    InvalidVin(usize),

    #[error("Invalid VIN format: '{0}' is not a VIN character")]
    InvalidCharacter(char),

    #[error("HTTP request to VIN decoder failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("VIN decoder unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to parse VIN decoder response: {0}")]
    Payload(#[from] serde_json::Error),
}

/// External VIN decoding service.
#[async_trait]
pub trait VinDecoder: Send + Sync {
    /// Raw decode result set for `vin`. Implementations reject anything that is
    /// not 17 characters of the VIN alphabet before calling out.
    async fn decode(&self, vin: &str) -> Result<Vec<DecodedField>, DecoderError>;
}

/// Client for the NHTSA vPIC `decodevin` endpoint.
pub struct NhtsaClient {
    http: reqwest::Client,
    base_url: String,
}

impl NhtsaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DecoderError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("shop-vin/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VinDecoder for NhtsaClient {
    async fn decode(&self, vin: &str) -> Result<Vec<DecodedField>, DecoderError> {
        let length = vin.chars().count();
        if length != VIN_LENGTH {
            return Err(DecoderError::InvalidVin(length));
        }
        let vin = vin.to_ascii_uppercase();
        if let Some(c) = vin.chars().find(|c| !is_vin_char(*c)) {
            return Err(DecoderError::InvalidCharacter(c));
        }

        let url = format!(
            "{}/vehicles/decodevin/{}?format=json",
            self.base_url, vin
        );

        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(DecoderError::Unavailable(format!(
                "NHTSA returned HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let parsed: DecodeVinResponse = serde_json::from_str(&body)?;
        Ok(parsed.results)
    }
}

/// Attribute a decoder variable is translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attribute {
    Make,
    Model,
    Year,
    VehicleType,
    EngineType,
    EngineCylinders,
    DisplacementL,
    Horsepower,
    FuelType,
    Transmission,
    DriveType,
    BodyClass,
    PlantCountry,
}

/// Decoder variable name → canonical attribute. Variables not listed are ignored.
const FIELD_MAP: &[(&str, Attribute)] = &[
    ("Make", Attribute::Make),
    ("Model", Attribute::Model),
    ("Model Year", Attribute::Year),
    ("Vehicle Type", Attribute::VehicleType),
    ("Engine Model", Attribute::EngineType),
    ("Engine Number of Cylinders", Attribute::EngineCylinders),
    ("Displacement (L)", Attribute::DisplacementL),
    ("Engine Brake (hp) From", Attribute::Horsepower),
    ("Fuel Type - Primary", Attribute::FuelType),
    ("Transmission Style", Attribute::Transmission),
    ("Drive Type", Attribute::DriveType),
    ("Body Class", Attribute::BodyClass),
    ("Plant Country", Attribute::PlantCountry),
];

fn lookup_attribute(variable: &str) -> Option<Attribute> {
    FIELD_MAP
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(variable.trim()))
        .map(|(_, attribute)| *attribute)
}

/// True when the decoder reported a clean decode (error code list contains 0).
pub fn decode_succeeded(fields: &[DecodedField]) -> bool {
    fields
        .iter()
        .filter(|f| f.variable.eq_ignore_ascii_case(ERROR_CODE_VARIABLE))
        .filter_map(|f| f.value.as_deref())
        .any(|codes| codes.split(',').any(|code| code.trim() == "0"))
}

/// Translate a decode result set into canonical attributes.
///
/// Returns `None` when nothing usable was mapped. Numeric attributes that do
/// not parse are left unset.
pub fn map_decoded_fields(vin: &str, fields: &[DecodedField]) -> Option<VehicleAttributes> {
    let mut attributes = VehicleAttributes {
        vin: vin.to_string(),
        ..Default::default()
    };
    let mut mapped = 0usize;

    for field in fields {
        let (Some(attribute), Some(value)) = (lookup_attribute(&field.variable), field.usable_value())
        else {
            continue;
        };

        let before = mapped;
        match attribute {
            Attribute::Make => set_text(&mut attributes.make, value, &mut mapped),
            Attribute::Model => set_text(&mut attributes.model, value, &mut mapped),
            Attribute::VehicleType => set_text(&mut attributes.vehicle_type, value, &mut mapped),
            Attribute::EngineType => set_text(&mut attributes.engine_type, value, &mut mapped),
            Attribute::FuelType => set_text(&mut attributes.fuel_type, value, &mut mapped),
            Attribute::Transmission => set_text(&mut attributes.transmission, value, &mut mapped),
            Attribute::DriveType => set_text(&mut attributes.drive_type, value, &mut mapped),
            Attribute::BodyClass => set_text(&mut attributes.body_class, value, &mut mapped),
            Attribute::PlantCountry => set_text(&mut attributes.plant_country, value, &mut mapped),
            Attribute::Year => set_parsed(&mut attributes.year, value, &mut mapped),
            Attribute::EngineCylinders => {
                set_parsed(&mut attributes.engine_cylinders, value, &mut mapped)
            }
            Attribute::DisplacementL => set_parsed(&mut attributes.displacement_l, value, &mut mapped),
            Attribute::Horsepower => set_parsed(&mut attributes.horsepower, value, &mut mapped),
        }

        if mapped == before {
            tracing::debug!(variable = %field.variable, value, "Decoder value not usable, skipped");
        }
    }

    (mapped > 0).then_some(attributes)
}

fn set_text(slot: &mut Option<String>, value: &str, mapped: &mut usize) {
    *slot = Some(value.to_string());
    *mapped += 1;
}

fn set_parsed<T: std::str::FromStr>(slot: &mut Option<T>, value: &str, mapped: &mut usize) {
    if let Ok(parsed) = value.parse() {
        *slot = Some(parsed);
        *mapped += 1;
    }
}
