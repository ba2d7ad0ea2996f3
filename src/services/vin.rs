//! VIN check-digit validation and extraction from noisy text.
//!
//! Implements the ISO 3779 / 49 CFR 565 check digit: each character is
//! transliterated to a number, multiplied by its positional weight, and the
//! sum modulo 11 must equal the character at position 9 (`X` stands for 10).

use regex::Regex;
use std::sync::LazyLock;

use crate::models::vin::{ValidatedVin, VinError};

/// Length of a modern (post-1981) VIN.
pub const VIN_LENGTH: usize = 17;

/// Zero-based index of the check digit.
pub const CHECK_DIGIT_INDEX: usize = 8;

/// Positional weights. Position 9 carries weight 0 because it is the check digit itself.
const WEIGHTS: [u32; VIN_LENGTH] = [8, 7, 6, 5, 4, 3, 2, 10, 0, 9, 8, 7, 6, 5, 4, 3, 2];

/// Direct match: a contiguous run of VIN-alphabet characters, at least 17 long.
static DIRECT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-HJ-NPR-Z0-9]{17,}").expect("valid regex"));

/// Labeled match: `VIN:` or `VIN` followed by whitespace, then 17 characters.
static LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bVIN(?::\s*|\s+)([A-Z0-9]{17})").expect("valid regex")
});

/// Segmented match: 3 + 2 + 12 groups with optional whitespace or hyphens between them.
static SEGMENTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-HJ-NPR-Z0-9]{3})[\s\-]*([A-HJ-NPR-Z0-9]{2})[\s\-]*([A-HJ-NPR-Z0-9]{12})")
        .expect("valid regex")
});

/// Numeric value of a VIN character, or `None` for characters outside the VIN alphabet.
///
/// Digits map to themselves; letters follow the NHTSA transliteration table.
/// `I`, `O` and `Q` are not part of the alphabet.
pub fn transliterate(c: char) -> Option<u32> {
    let value = match c {
        '0'..='9' => c.to_digit(10)?,
        'A' | 'J' => 1,
        'B' | 'K' | 'S' => 2,
        'C' | 'L' | 'T' => 3,
        'D' | 'M' | 'U' => 4,
        'E' | 'N' | 'V' => 5,
        'F' | 'W' => 6,
        'G' | 'P' | 'X' => 7,
        'H' | 'Y' => 8,
        'R' | 'Z' => 9,
        _ => return None,
    };
    Some(value)
}

/// True for characters allowed in a VIN (`[A-HJ-NPR-Z0-9]`).
pub fn is_vin_char(c: char) -> bool {
    transliterate(c).is_some()
}

/// Expected check character for a VIN-shaped string.
///
/// Fails on wrong length or a character outside the VIN alphabet.
pub fn expected_check_digit(vin: &str) -> Result<char, VinError> {
    let chars: Vec<char> = vin.chars().collect();
    if chars.len() != VIN_LENGTH {
        return Err(VinError::Length(chars.len()));
    }

    let mut sum = 0u32;
    for (position, (&c, weight)) in chars.iter().zip(WEIGHTS).enumerate() {
        let value = transliterate(c).ok_or(VinError::InvalidCharacter { position, found: c })?;
        if position != CHECK_DIGIT_INDEX {
            sum += value * weight;
        }
    }

    Ok(match sum % 11 {
        10 => 'X',
        // sum % 11 is in 0..=9 here
        digit => char::from_digit(digit, 10).unwrap_or('0'),
    })
}

/// Full validation with the reason for rejection.
pub fn check(vin: &str) -> Result<(), VinError> {
    let expected = expected_check_digit(vin)?;
    let found = vin.chars().nth(CHECK_DIGIT_INDEX).unwrap_or_default();
    if found != expected {
        return Err(VinError::CheckDigit { expected, found });
    }
    Ok(())
}

/// Checksum validation of an already-normalized (upper-case, alphanumeric) VIN.
///
/// Never panics; any malformed input is simply `false`.
pub fn validate_checksum(vin: &str) -> bool {
    check(vin).is_ok()
}

/// Strip everything but ASCII letters and digits and upper-case the rest.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Find the first checksum-valid VIN in free text (OCR output or a barcode payload).
///
/// Candidates are tried in decreasing order of confidence: a direct 17-character
/// run of VIN characters, then a `VIN:`-labeled value, then a VIN split into
/// 3 + 2 + 12 groups by spaces or hyphens. `None` is the normal "nothing here" outcome.
pub fn extract_vin(text: &str) -> Option<ValidatedVin> {
    let upper = text.to_uppercase();

    let direct = DIRECT_RUN.find_iter(&upper).flat_map(|m| {
        let run = m.as_str();
        // the alphabet is ASCII, so byte windows are char windows
        (0..=run.len() - VIN_LENGTH).map(move |start| &run[start..start + VIN_LENGTH])
    });
    let labeled = LABELED
        .captures_iter(&upper)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str());
    let segmented = SEGMENTED
        .captures_iter(&upper)
        .filter_map(|c| c.get(0))
        .map(|m| m.as_str());

    direct
        .chain(labeled)
        .chain(segmented)
        .map(normalize)
        .find(|candidate| validate_checksum(candidate))
        .and_then(|candidate| ValidatedVin::parse(&candidate).ok())
}
