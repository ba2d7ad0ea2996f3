pub mod resolution;
pub mod scan;
pub mod vehicle;
pub mod vin;
