use shop_vin::db::{self, vehicle_queries, PgVehicleStore, StoreError, VehicleStore};
use shop_vin::models::vehicle::NewVehicle;
use shop_vin::models::vin::ValidatedVin;
use shop_vin::services::nhtsa::NhtsaClient;
use shop_vin::services::resolver::VinResolver;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;
use uuid::Uuid;

const CIVIC_VIN: &str = "1HGBH41JXMN109186";

async fn connect() -> PgPool {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::init_pool(&url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn insert_company(pool: &PgPool) -> Uuid {
    sqlx::query_scalar("INSERT INTO companies (name) VALUES ($1) RETURNING id")
        .bind(format!("Test Shop {}", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .expect("Failed to insert company")
}

async fn insert_client(pool: &PgPool, company_id: Uuid, name: &str) -> Uuid {
    sqlx::query_scalar("INSERT INTO clients (company_id, name) VALUES ($1, $2) RETURNING id")
        .bind(company_id)
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("Failed to insert client")
}

/// Store round trip against PostgreSQL:
/// 1. create with a client, read back by VIN and by id
/// 2. duplicate VIN and plate rejected within the tenant
/// 3. foreign-tenant clients rejected, foreign tenants see nothing
///
/// Note: requires a running PostgreSQL configured via DATABASE_URL.
#[tokio::test]
#[ignore] // Run with: cargo test --test pg_store_test -- --ignored
async fn test_vehicle_store_round_trip() {
    let pool = connect().await;
    let store = PgVehicleStore::new(pool.clone());
    assert_ok!(store.ping().await);

    let company = insert_company(&pool).await;
    let other_company = insert_company(&pool).await;
    let client = insert_client(&pool, company, "Jane Doe").await;
    let foreign_client = insert_client(&pool, other_company, "John Roe").await;

    let created = store
        .create(
            company,
            &NewVehicle {
                vin: Some(CIVIC_VIN.to_string()),
                license_plate: "ABC-123".to_string(),
                make: Some("Honda".to_string()),
                year: Some(2021),
                client_id: Some(client),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to create vehicle");
    assert_eq!(created.vin.as_deref(), Some(CIVIC_VIN));
    assert_eq!(created.client.as_ref().map(|c| c.name.as_str()), Some("Jane Doe"));

    let vin = ValidatedVin::parse(CIVIC_VIN).unwrap();
    let found = assert_ok!(store.find_by_vin(company, &vin).await).expect("vehicle by VIN");
    assert_eq!(found.id, created.id);
    assert!(assert_ok!(store.find_by_vin(other_company, &vin).await).is_none());
    assert!(assert_ok!(store.find_by_id(other_company, created.id).await).is_none());

    let duplicate_vin = store
        .create(
            company,
            &NewVehicle {
                vin: Some(CIVIC_VIN.to_string()),
                license_plate: "XYZ-999".to_string(),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(duplicate_vin, Err(StoreError::DuplicateVin(_))));

    let duplicate_plate = store
        .create(
            company,
            &NewVehicle {
                license_plate: "ABC-123".to_string(),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(duplicate_plate, Err(StoreError::DuplicatePlate(_))));

    let foreign = store
        .create(
            company,
            &NewVehicle {
                license_plate: "NEW-1".to_string(),
                client_id: Some(foreign_client),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(foreign, Err(StoreError::ClientNotFound(_))));

    // The same VIN is free in another tenant.
    assert_ok!(
        store
            .create(
                other_company,
                &NewVehicle {
                    vin: Some(CIVIC_VIN.to_string()),
                    license_plate: "ABC-123".to_string(),
                    ..Default::default()
                },
            )
            .await
    );

    let listed = assert_ok!(store.list(company).await);
    assert_eq!(listed.len(), 1);
}

/// Resolution of a stored VIN never reaches the external decoder, so an
/// unreachable decoder URL still yields the local record.
#[tokio::test]
#[ignore] // Run with: cargo test --test pg_store_test -- --ignored
async fn test_resolver_prefers_local_vehicle() {
    let pool = connect().await;
    let company = insert_company(&pool).await;
    let client = insert_client(&pool, company, "Jane Doe").await;
    let store = Arc::new(PgVehicleStore::new(pool));

    store
        .create(
            company,
            &NewVehicle {
                vin: Some(CIVIC_VIN.to_string()),
                license_plate: "JD-1".to_string(),
                client_id: Some(client),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to create vehicle");

    let decoder = NhtsaClient::new("http://127.0.0.1:9", Duration::from_secs(1))
        .expect("Failed to build decoder client");
    let resolver = VinResolver::new(store, Arc::new(decoder));

    let result = assert_ok!(resolver.resolve_str(CIVIC_VIN, company).await);
    assert!(result.blocks_creation());
    assert_eq!(
        result.duplicate_message().as_deref(),
        Some("This vehicle already exists in your database. Owner: Jane Doe")
    );
}

/// Rows that slip past the up-front checks are still rejected by the unique
/// constraints, and the violation maps to the matching duplicate error.
#[tokio::test]
#[ignore] // Run with: cargo test --test pg_store_test -- --ignored
async fn test_unique_constraint_reports_duplicates() {
    let pool = connect().await;
    let company = insert_company(&pool).await;
    let store = PgVehicleStore::new(pool.clone());

    assert_ok!(
        store
            .create(
                company,
                &NewVehicle {
                    vin: Some(CIVIC_VIN.to_string()),
                    license_plate: "UNQ-1".to_string(),
                    ..Default::default()
                },
            )
            .await
    );

    let same_vin = vehicle_queries::insert_vehicle(
        &pool,
        company,
        &NewVehicle {
            vin: Some(CIVIC_VIN.to_lowercase()),
            license_plate: "UNQ-2".to_string(),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(same_vin, Err(StoreError::DuplicateVin(_))));

    let same_plate = vehicle_queries::insert_vehicle(
        &pool,
        company,
        &NewVehicle {
            license_plate: " UNQ-1 ".to_string(),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(same_plate, Err(StoreError::DuplicatePlate(_))));
}

/// Two concurrent creates of the same VIN: exactly one row lands.
#[tokio::test]
#[ignore] // Run with: cargo test --test pg_store_test -- --ignored
async fn test_concurrent_creates_admit_one_vin() {
    let pool = connect().await;
    let company = insert_company(&pool).await;
    let store = PgVehicleStore::new(pool);

    let first = NewVehicle {
        vin: Some(CIVIC_VIN.to_string()),
        license_plate: "RACE-1".to_string(),
        ..Default::default()
    };
    let second = NewVehicle {
        license_plate: "RACE-2".to_string(),
        ..first.clone()
    };

    let (a, b) = futures::future::join(
        store.create(company, &first),
        store.create(company, &second),
    )
    .await;
    let results = [a, b];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::DuplicateVin(_))))
            .count(),
        1
    );
    assert_eq!(assert_ok!(store.list(company).await).len(), 1);
}
