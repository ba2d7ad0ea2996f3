use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

use crate::services::vin;

/// Why a string is not a valid VIN.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VinError {
    #[error("VIN must be exactly 17 characters, got {0}")]
    Length(usize),

    #[error("invalid VIN character '{found}' at position {}", .position + 1)]
    InvalidCharacter { position: usize, found: char },

    #[error("VIN check digit mismatch: expected '{expected}', found '{found}'")]
    CheckDigit { expected: char, found: char },
}

/// A 17-character, upper-case VIN whose check digit has been verified.
///
/// The only way to obtain one is [`ValidatedVin::parse`] (or deserializing, which
/// goes through it), so holders never need to re-validate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ValidatedVin(String);

impl ValidatedVin {
    /// Trim and upper-case `raw`, then require a correct check digit.
    pub fn parse(raw: &str) -> Result<Self, VinError> {
        let candidate = raw.trim().to_ascii_uppercase();
        vin::check(&candidate)?;
        Ok(Self(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ValidatedVin {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedVin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ValidatedVin {
    type Error = VinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ValidatedVin> for String {
    fn from(vin: ValidatedVin) -> Self {
        vin.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let vin = ValidatedVin::parse("  1hgbh41jxmn109186\n").unwrap();
        assert_eq!(vin.as_str(), "1HGBH41JXMN109186");
    }

    #[test]
    fn test_parse_rejects_bad_check_digit() {
        let err = ValidatedVin::parse("1HGBH41J1MN109186").unwrap_err();
        assert_eq!(err, VinError::CheckDigit { expected: 'X', found: '1' });
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: ValidatedVin = serde_json::from_str("\"1HGCM82633A004352\"").unwrap();
        assert_eq!(ok.to_string(), "1HGCM82633A004352");

        let bad = serde_json::from_str::<ValidatedVin>("\"1HGCM82643A004352\"");
        assert!(bad.is_err());
    }
}
