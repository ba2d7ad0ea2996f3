//! Test helpers: in-memory collaborators and request builders for driving the router.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use shop_vin::app_state::AppState;
use shop_vin::auth::{Claims, Role, TokenVerifier};
use shop_vin::capture::{BarcodeDetector, ScanSessions, ScanSettings};
use shop_vin::db::{StoreError, VehicleStore};
use shop_vin::models::vehicle::{ClientRef, NewVehicle, VehicleRecord};
use shop_vin::models::vin::ValidatedVin;
use shop_vin::routes;
use shop_vin::services::nhtsa::{DecodedField, DecoderError, VinDecoder};

pub const JWT_SECRET: &str = "test-secret";
pub const CIVIC_VIN: &str = "1HGBH41JXMN109186";
pub const ACCORD_VIN: &str = "1HGCM82633A004352";

/// Tenant-scoped vehicle store kept in memory.
#[derive(Default)]
pub struct InMemoryStore {
    vehicles: Mutex<Vec<VehicleRecord>>,
    clients: Mutex<HashMap<Uuid, (Uuid, ClientRef)>>,
}

impl InMemoryStore {
    pub fn add_client(&self, company_id: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let client = ClientRef {
            id,
            name: name.to_string(),
            phone: None,
            email: None,
        };
        self.clients.lock().unwrap().insert(id, (company_id, client));
        id
    }
}

#[async_trait]
impl VehicleStore for InMemoryStore {
    async fn find_by_vin(
        &self,
        company_id: Uuid,
        vin: &ValidatedVin,
    ) -> Result<Option<VehicleRecord>, StoreError> {
        Ok(self
            .vehicles
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.company_id == company_id && v.vin.as_deref() == Some(vin.as_str()))
            .cloned())
    }

    async fn find_by_id(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<VehicleRecord>, StoreError> {
        Ok(self
            .vehicles
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.company_id == company_id && v.id == id)
            .cloned())
    }

    async fn list(&self, company_id: Uuid) -> Result<Vec<VehicleRecord>, StoreError> {
        let mut vehicles: Vec<VehicleRecord> = self
            .vehicles
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.company_id == company_id)
            .cloned()
            .collect();
        vehicles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(vehicles)
    }

    async fn create(
        &self,
        company_id: Uuid,
        vehicle: &NewVehicle,
    ) -> Result<VehicleRecord, StoreError> {
        let client = match vehicle.client_id {
            Some(id) => match self.clients.lock().unwrap().get(&id) {
                Some((owner, client)) if *owner == company_id => Some(client.clone()),
                _ => return Err(StoreError::ClientNotFound(id)),
            },
            None => None,
        };
        if let Some(id) = vehicle.assigned_to_id {
            return Err(StoreError::EmployeeNotFound(id));
        }

        let mut vehicles = self.vehicles.lock().unwrap();
        for existing in vehicles.iter().filter(|v| v.company_id == company_id) {
            if vehicle.vin.is_some() && existing.vin == vehicle.vin {
                return Err(StoreError::DuplicateVin(existing.vin.clone().unwrap_or_default()));
            }
            if existing.license_plate == vehicle.license_plate {
                return Err(StoreError::DuplicatePlate(vehicle.license_plate.clone()));
            }
        }

        let now = Utc::now();
        let record = VehicleRecord {
            id: Uuid::new_v4(),
            company_id,
            vin: vehicle.vin.clone(),
            license_plate: vehicle.license_plate.clone(),
            make: vehicle.make.clone(),
            model: vehicle.model.clone(),
            year: vehicle.year,
            color: vehicle.color.clone(),
            engine_type: vehicle.engine_type.clone(),
            transmission: vehicle.transmission.clone(),
            fuel_type: vehicle.fuel_type.clone(),
            mileage: vehicle.mileage,
            parking_spot: vehicle.parking_spot.clone(),
            client,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        };
        vehicles.push(record.clone());
        Ok(record)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub enum DecoderReply {
    Fields(Vec<DecodedField>),
    Down,
}

/// External decoder double that counts its calls.
pub struct FakeDecoder {
    reply: DecoderReply,
    calls: AtomicUsize,
}

impl FakeDecoder {
    pub fn new(reply: DecoderReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn civic() -> Arc<Self> {
        Self::new(DecoderReply::Fields(vec![
            DecodedField::new("Make", "HONDA"),
            DecodedField::new("Model", "Civic"),
            DecodedField::new("Model Year", "2021"),
            DecodedField::new("Fuel Type - Primary", "Gasoline"),
            DecodedField::new("Drive Type", "Not Applicable"),
            DecodedField::new("Error Code", "0"),
        ]))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VinDecoder for FakeDecoder {
    async fn decode(&self, _vin: &str) -> Result<Vec<DecodedField>, DecoderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            DecoderReply::Fields(fields) => Ok(fields.clone()),
            DecoderReply::Down => Err(DecoderError::Unavailable("connection refused".into())),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub decoder: Arc<FakeDecoder>,
}

impl TestApp {
    pub fn new(decoder: Arc<FakeDecoder>) -> Self {
        let store = Arc::new(InMemoryStore::default());
        let scans = ScanSessions::new(
            ScanSettings::default(),
            std::time::Duration::from_secs(600),
            Arc::new(BarcodeDetector),
            None,
        );
        let state = AppState::new(
            store.clone(),
            decoder.clone(),
            scans,
            TokenVerifier::new(JWT_SECRET),
        );

        Self {
            router: routes::router(state),
            store,
            decoder,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn get(&self, path: &str, company_id: Uuid) -> (StatusCode, Value) {
        self.send(authed(Method::GET, path, company_id).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, path: &str, company_id: Uuid, body: Value) -> (StatusCode, Value) {
        self.send(
            authed(Method::POST, path, company_id)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_empty(&self, path: &str, company_id: Uuid) -> (StatusCode, Value) {
        self.send(authed(Method::POST, path, company_id).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, path: &str, company_id: Uuid) -> (StatusCode, Value) {
        self.send(authed(Method::DELETE, path, company_id).body(Body::empty()).unwrap())
            .await
    }

    /// Upload `bytes` as the multipart `frame` field.
    pub async fn post_frame(&self, path: &str, company_id: Uuid, bytes: &[u8]) -> (StatusCode, Value) {
        let boundary = "frame-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"frame\"; filename=\"frame.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        self.send(
            authed(Method::POST, path, company_id)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}

/// A signed bearer token for an employee of `company_id`.
pub fn token(company_id: Uuid) -> String {
    let claims = Claims {
        sub: Uuid::new_v4(),
        company_id,
        role: Role::Employee,
        exp: (Utc::now().timestamp() + 3600) as u64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

fn authed(method: Method, path: &str, company_id: Uuid) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(company_id)))
}

/// A small PNG frame with no code or text in it.
pub fn blank_png() -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image::DynamicImage::new_luma8(32, 32)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}
