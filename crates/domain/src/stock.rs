//! Per-size stock counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const MAX_SIZE_CODE_LEN: usize = 16;

/// Size code such as `"S"`, `"M"` or `"2XL"`.
///
/// Codes are compared exactly; surrounding whitespace is rejected rather
/// than trimmed so the same code is never stored under two keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SizeCode(String);

impl SizeCode {
    /// Parses a size code.
    pub fn parse(code: impl Into<String>) -> Result<Self, DomainError> {
        let code = code.into();
        let valid = !code.is_empty()
            && code.len() <= MAX_SIZE_CODE_LEN
            && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '/');
        if valid {
            Ok(Self(code))
        } else {
            Err(DomainError::InvalidSize(code))
        }
    }

    /// Returns the size code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SizeCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for SizeCode {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SizeCode> for String {
    fn from(code: SizeCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for SizeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered mapping from size code to available unit count.
///
/// Counts are unsigned, so a negative or fractional count fails to decode
/// and a map can never hold a value below zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockMap(BTreeMap<SizeCode, u32>);

impl StockMap {
    /// Creates an empty stock map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a stock map from signed counts, rejecting anything negative
    /// or larger than `u32::MAX`.
    pub fn from_counts<I, S>(counts: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (size, count) in counts {
            let size = size.into();
            let units = u32::try_from(count).map_err(|_| DomainError::InvalidStockCount {
                size: size.clone(),
                count,
            })?;
            map.insert(SizeCode::parse(size)?, units);
        }
        Ok(Self(map))
    }

    /// Decodes a stock map from a JSON value, validating every count.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Returns the available units for a size; unknown sizes have none.
    pub fn available(&self, size: &SizeCode) -> u32 {
        self.0.get(size).copied().unwrap_or(0)
    }

    /// Sets the count for a size.
    pub fn set(&mut self, size: SizeCode, units: u32) {
        self.0.insert(size, units);
    }

    /// Iterates sizes in order with their counts.
    pub fn iter(&self) -> impl Iterator<Item = (&SizeCode, u32)> {
        self.0.iter().map(|(size, units)| (size, *units))
    }
}

impl FromIterator<(SizeCode, u32)> for StockMap {
    fn from_iter<T: IntoIterator<Item = (SizeCode, u32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(code: &str) -> SizeCode {
        SizeCode::parse(code).unwrap()
    }

    #[test]
    fn size_code_accepts_common_codes() {
        for code in ["S", "M", "L", "XL", "2XL", "one-size", "32/34"] {
            assert!(SizeCode::parse(code).is_ok(), "{code} should parse");
        }
    }

    #[test]
    fn size_code_rejects_blank_and_padded() {
        assert!(SizeCode::parse("").is_err());
        assert!(SizeCode::parse(" M").is_err());
        assert!(SizeCode::parse("XXXXXXXXXXXXXXXXXL").is_err());
    }

    #[test]
    fn missing_size_has_zero_available() {
        let stock: StockMap = [(size("M"), 3)].into_iter().collect();
        assert_eq!(stock.available(&size("M")), 3);
        assert_eq!(stock.available(&size("XL")), 0);
    }

    #[test]
    fn from_counts_rejects_negative() {
        let err = StockMap::from_counts([("M", 2), ("L", -1)]).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStockCount {
                size: "L".to_string(),
                count: -1
            }
        );
    }

    #[test]
    fn json_decoding_rejects_negative_and_fractional_counts() {
        assert!(StockMap::from_json(serde_json::json!({"M": -1})).is_err());
        assert!(StockMap::from_json(serde_json::json!({"M": 1.5})).is_err());
        assert!(StockMap::from_json(serde_json::json!({"": 1})).is_err());

        let stock = StockMap::from_json(serde_json::json!({"S": 4, "2XL": 0})).unwrap();
        assert_eq!(stock.available(&size("S")), 4);
        assert_eq!(stock.available(&size("2XL")), 0);
        assert_eq!(stock.iter().count(), 2);
    }

    #[test]
    fn sizes_iterate_in_code_order() {
        let stock = StockMap::from_counts([("XL", 1), ("L", 2), ("M", 3)]).unwrap();
        let codes: Vec<_> = stock.iter().map(|(s, _)| s.as_str().to_string()).collect();
        assert_eq!(codes, vec!["L", "M", "XL"]);
    }
}
