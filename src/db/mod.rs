use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::vehicle::{NewVehicle, VehicleRecord};
use crate::models::vin::ValidatedVin;

pub mod vehicle_queries;

pub use vehicle_queries::PgVehicleStore;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Vehicle with this VIN already exists")]
    DuplicateVin(String),

    #[error("Vehicle with this license plate already exists")]
    DuplicatePlate(String),

    #[error("Client not found")]
    ClientNotFound(Uuid),

    #[error("Employee not found")]
    EmployeeNotFound(Uuid),
}

/// Tenant-scoped vehicle persistence.
///
/// Every query takes the tenant (`company_id`) explicitly; no call can see
/// another tenant's vehicles.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn find_by_vin(
        &self,
        company_id: Uuid,
        vin: &ValidatedVin,
    ) -> Result<Option<VehicleRecord>, StoreError>;

    async fn find_by_id(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<VehicleRecord>, StoreError>;

    /// Newest first.
    async fn list(&self, company_id: Uuid) -> Result<Vec<VehicleRecord>, StoreError>;

    /// Persist a vehicle. `vehicle.vin`, when set, must already be validated by the caller.
    async fn create(
        &self,
        company_id: Uuid,
        vehicle: &NewVehicle,
    ) -> Result<VehicleRecord, StoreError>;

    /// Connectivity check for `/health`.
    async fn ping(&self) -> Result<(), StoreError>;
}
