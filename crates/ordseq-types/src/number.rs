use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::RecordKey;

/// Human-facing sequential identifier of an order.
///
/// Stored as text, ordered as an unsigned integer. An empty value is never
/// a `SequentialNumber`: the store treats it the same as an absent property.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequentialNumber(String);

impl SequentialNumber {
    /// Interpret a raw stored property value.
    ///
    /// Returns `None` for empty or whitespace-only values.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    /// A number issued by the allocator.
    pub fn from_value(value: u64) -> Self {
        Self(value.to_string())
    }

    /// A number backfilled from a legacy record's own key.
    pub fn from_key(key: RecordKey) -> Self {
        Self(key.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value used for ordering.
    ///
    /// Follows the usual SQL cast-to-unsigned rules: leading whitespace is
    /// skipped, the leading run of digits is the value, and a value with no
    /// leading digits counts as zero.
    pub fn numeric(&self) -> u64 {
        numeric_value(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SequentialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for SequentialNumber {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SequentialNumber {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Numeric value of a raw property string (see [`SequentialNumber::numeric`]).
pub fn numeric_value(raw: &str) -> u64 {
    raw.trim_start()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(u64::from(digit - b'0'))
        })
}
