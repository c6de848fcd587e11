use serde::{Deserialize, Serialize};

use crate::error::RowError;

/// Tunables for a row buffer.
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowConfig {
    /// Bytes reserved when a buffer is created.
    pub initial_capacity: usize,
    /// Largest encoded row a buffer may grow to. Offsets in the format are 32-bit.
    pub max_row_size: usize,
    /// Zero the gap a sparse shift opens before the value is written.
    pub zero_fill_gaps: bool,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 512,
            max_row_size: i32::MAX as usize,
            zero_fill_gaps: cfg!(debug_assertions),
        }
    }
}

impl RowConfig {
    pub fn from_json(json: &str) -> Result<Self, RowError> {
        serde_json::from_str(json).map_err(|e| RowError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RowConfig::from_json(r#"{ "max_row_size": 4096 }"#).unwrap();
        assert_eq!(config.max_row_size, 4096);
        assert_eq!(config.initial_capacity, RowConfig::default().initial_capacity);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        assert!(matches!(
            RowConfig::from_json("{ \"max_row_size\": \"big\" }"),
            Err(RowError::Config(_))
        ));
    }
}
