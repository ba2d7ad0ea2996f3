//! VIN acquisition and reconciliation service.
//!
//! Validates and extracts VINs, runs server-side scan sessions fed by browser
//! camera frames (barcode + OCR), and resolves a VIN against the tenant's own
//! vehicles before falling back to the NHTSA vPIC decoder.

pub mod app_state;
pub mod auth;
pub mod capture;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
