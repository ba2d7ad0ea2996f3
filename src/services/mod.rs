pub mod nhtsa;
pub mod ocr;
pub mod resolver;
pub mod vin;
