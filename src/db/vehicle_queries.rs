use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{StoreError, VehicleStore};
use crate::models::vehicle::{ClientRef, EmployeeRef, NewVehicle, VehicleRecord};
use crate::models::vin::ValidatedVin;

/// Unique constraint names from the migrations, used to classify insert conflicts.
const VIN_UNIQUE_CONSTRAINT: &str = "vehicles_company_vin_key";
const PLATE_UNIQUE_CONSTRAINT: &str = "vehicles_company_plate_key";

const VEHICLE_SELECT: &str = r#"
    SELECT v.id, v.company_id, v.vin, v.license_plate, v.make, v.model, v.year, v.color,
           v.engine_type, v.transmission, v.fuel_type, v.mileage, v.parking_spot,
           v.created_at, v.updated_at,
           c.id AS client_id, c.name AS client_name, c.phone AS client_phone, c.email AS client_email,
           u.id AS assignee_id, u.name AS assignee_name
    FROM vehicles v
    LEFT JOIN clients c ON c.id = v.client_id
    LEFT JOIN users u ON u.id = v.assigned_to_id
"#;

fn vehicle_from_row(row: &PgRow) -> Result<VehicleRecord, sqlx::Error> {
    let client = match row.try_get::<Option<Uuid>, _>("client_id")? {
        Some(id) => Some(ClientRef {
            id,
            name: row.try_get("client_name")?,
            phone: row.try_get("client_phone")?,
            email: row.try_get("client_email")?,
        }),
        None => None,
    };

    let assigned_to = match row.try_get::<Option<Uuid>, _>("assignee_id")? {
        Some(id) => Some(EmployeeRef {
            id,
            name: row.try_get("assignee_name")?,
        }),
        None => None,
    };

    Ok(VehicleRecord {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        vin: row.try_get("vin")?,
        license_plate: row.try_get("license_plate")?,
        make: row.try_get("make")?,
        model: row.try_get("model")?,
        year: row.try_get("year")?,
        color: row.try_get("color")?,
        engine_type: row.try_get("engine_type")?,
        transmission: row.try_get("transmission")?,
        fuel_type: row.try_get("fuel_type")?,
        mileage: row.try_get("mileage")?,
        parking_spot: row.try_get("parking_spot")?,
        client,
        assigned_to,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Find a tenant's vehicle by VIN (case-insensitive).
pub async fn find_vehicle_by_vin(
    pool: &PgPool,
    company_id: Uuid,
    vin: &str,
) -> Result<Option<VehicleRecord>, sqlx::Error> {
    let sql = format!("{VEHICLE_SELECT} WHERE v.company_id = $1 AND UPPER(v.vin) = UPPER($2)");
    let row = sqlx::query(&sql)
        .bind(company_id)
        .bind(vin)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(vehicle_from_row).transpose()
}

/// Get a tenant's vehicle by id
pub async fn find_vehicle_by_id(
    pool: &PgPool,
    company_id: Uuid,
    id: Uuid,
) -> Result<Option<VehicleRecord>, sqlx::Error> {
    let sql = format!("{VEHICLE_SELECT} WHERE v.company_id = $1 AND v.id = $2");
    let row = sqlx::query(&sql)
        .bind(company_id)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(vehicle_from_row).transpose()
}

/// List a tenant's vehicles, newest first
pub async fn list_vehicles(
    pool: &PgPool,
    company_id: Uuid,
) -> Result<Vec<VehicleRecord>, sqlx::Error> {
    let sql = format!("{VEHICLE_SELECT} WHERE v.company_id = $1 ORDER BY v.created_at DESC");
    let rows = sqlx::query(&sql).bind(company_id).fetch_all(pool).await?;

    rows.iter().map(vehicle_from_row).collect()
}

async fn exists(pool: &PgPool, sql: &str, company_id: Uuid, value: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(sql)
        .bind(company_id)
        .bind(value)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

async fn belongs_to_company(
    pool: &PgPool,
    table: &'static str,
    company_id: Uuid,
    id: Uuid,
) -> Result<bool, sqlx::Error> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = $1 AND company_id = $2");
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Insert a vehicle for a tenant.
///
/// Duplicate checks run first for a clean error, but the unique constraints are
/// what actually guarantee no duplicate VIN or plate: see [`insert_vehicle`].
pub async fn create_vehicle(
    pool: &PgPool,
    company_id: Uuid,
    vehicle: &NewVehicle,
) -> Result<VehicleRecord, StoreError> {
    let vin = vehicle.vin.as_deref().map(str::to_ascii_uppercase);
    let plate = vehicle.license_plate.trim();

    if exists(
        pool,
        "SELECT 1 FROM vehicles WHERE company_id = $1 AND license_plate = $2",
        company_id,
        plate,
    )
    .await?
    {
        return Err(StoreError::DuplicatePlate(plate.to_string()));
    }

    if let Some(vin) = vin.as_deref() {
        if exists(
            pool,
            "SELECT 1 FROM vehicles WHERE company_id = $1 AND vin = $2",
            company_id,
            vin,
        )
        .await?
        {
            return Err(StoreError::DuplicateVin(vin.to_string()));
        }
    }

    if let Some(client_id) = vehicle.client_id {
        if !belongs_to_company(pool, "clients", company_id, client_id).await? {
            return Err(StoreError::ClientNotFound(client_id));
        }
    }

    if let Some(employee_id) = vehicle.assigned_to_id {
        if !belongs_to_company(pool, "users", company_id, employee_id).await? {
            return Err(StoreError::EmployeeNotFound(employee_id));
        }
    }

    insert_vehicle(pool, company_id, vehicle).await
}

/// Insert without the up-front checks.
///
/// A duplicate VIN or plate is reported from the unique constraint that
/// rejected the row, which is also what a racing [`create_vehicle`] hits.
pub async fn insert_vehicle(
    pool: &PgPool,
    company_id: Uuid,
    vehicle: &NewVehicle,
) -> Result<VehicleRecord, StoreError> {
    let vin = vehicle.vin.as_deref().map(str::to_ascii_uppercase);
    let plate = vehicle.license_plate.trim();

    let inserted = sqlx::query(
        r#"
        INSERT INTO vehicles
            (company_id, vin, license_plate, make, model, year, color, engine_type,
             transmission, fuel_type, mileage, parking_spot, client_id, assigned_to_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING id
        "#,
    )
    .bind(company_id)
    .bind(vin.as_deref())
    .bind(plate)
    .bind(vehicle.make.as_deref())
    .bind(vehicle.model.as_deref())
    .bind(vehicle.year)
    .bind(vehicle.color.as_deref())
    .bind(vehicle.engine_type.as_deref())
    .bind(vehicle.transmission.as_deref())
    .bind(vehicle.fuel_type.as_deref())
    .bind(vehicle.mileage)
    .bind(vehicle.parking_spot.as_deref())
    .bind(vehicle.client_id)
    .bind(vehicle.assigned_to_id)
    .fetch_one(pool)
    .await
    .map_err(|e| classify_insert_error(e, vin.as_deref(), plate))?;

    let id: Uuid = inserted.try_get("id")?;
    find_vehicle_by_id(pool, company_id, id)
        .await?
        .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
}

fn classify_insert_error(err: sqlx::Error, vin: Option<&str>, plate: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            match db.constraint() {
                Some(VIN_UNIQUE_CONSTRAINT) => {
                    return StoreError::DuplicateVin(vin.unwrap_or_default().to_string())
                }
                Some(PLATE_UNIQUE_CONSTRAINT) => {
                    return StoreError::DuplicatePlate(plate.to_string())
                }
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

/// PostgreSQL-backed [`VehicleStore`].
#[derive(Clone)]
pub struct PgVehicleStore {
    pool: PgPool,
}

impl PgVehicleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VehicleStore for PgVehicleStore {
    async fn find_by_vin(
        &self,
        company_id: Uuid,
        vin: &ValidatedVin,
    ) -> Result<Option<VehicleRecord>, StoreError> {
        Ok(find_vehicle_by_vin(&self.pool, company_id, vin.as_str()).await?)
    }

    async fn find_by_id(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<VehicleRecord>, StoreError> {
        Ok(find_vehicle_by_id(&self.pool, company_id, id).await?)
    }

    async fn list(&self, company_id: Uuid) -> Result<Vec<VehicleRecord>, StoreError> {
        Ok(list_vehicles(&self.pool, company_id).await?)
    }

    async fn create(
        &self,
        company_id: Uuid,
        vehicle: &NewVehicle,
    ) -> Result<VehicleRecord, StoreError> {
        create_vehicle(&self.pool, company_id, vehicle).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
