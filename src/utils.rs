//! Identifier helpers

use bech32::Bech32m;
use uuid7::uuid7;

use super::error::ValidationError;

// construct a unique time-ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Trims and upper-cases a caller supplied key.
pub fn normalise_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Container numbers are upper-case ASCII alphanumerics.
pub fn container_number(raw: &str) -> Result<String, ValidationError> {
    let number = normalise_key(raw);
    if number.is_empty() {
        return Err(ValidationError::MissingContainerNumber);
    }
    if !number.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::MalformedContainerNumber(number));
    }
    Ok(number)
}
