use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validator::{InvalidOrderNumber, validate_order_number};

/// Identifier of a loyalty program member.
///
/// Wraps the numeric user key so it cannot be mixed up with other
/// integer columns (amounts, row ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Creates a user ID from its numeric key.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the underlying numeric key.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// A normalized, checksum-valid order number.
///
/// The only ways to obtain one are [`OrderNumber::parse`] (which runs the
/// validator) and [`OrderNumber::from_trusted`] for values read back from
/// storage, where they were validated on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Validates and normalizes a raw order number.
    pub fn parse(raw: &str) -> Result<Self, InvalidOrderNumber> {
        validate_order_number(raw).map(Self)
    }

    /// Wraps a number that has already been validated (e.g. a stored row).
    pub fn from_trusted(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Returns the number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderNumber {
    type Err = InvalidOrderNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = InvalidOrderNumber;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
