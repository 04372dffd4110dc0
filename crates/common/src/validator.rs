//! Order number validation (mod-10 / Luhn checksum).

use thiserror::Error;

/// Returned when an order number is empty, non-numeric or fails the checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid order number")]
pub struct InvalidOrderNumber;

/// Trims whitespace and validates an order number.
///
/// Returns the normalized digit string. Fails if the trimmed input is empty,
/// contains anything other than ASCII digits, or does not pass the mod-10
/// checksum.
pub fn validate_order_number(raw: &str) -> Result<String, InvalidOrderNumber> {
    let normalized = raw.trim();
    if normalized.is_empty() || !normalized.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidOrderNumber);
    }
    if !luhn_valid(normalized) {
        return Err(InvalidOrderNumber);
    }
    Ok(normalized.to_string())
}

/// Digits are doubled alternately starting from the second-to-last one.
fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum();
    sum % 10 == 0
}
