//! Shared-data key derivation.
//!
//! Writer and readers must agree on the key for a `(timestamp, device_id)`
//! pair without talking to each other, so the key is a pure function of the
//! two: the device id followed by the timestamp in centiseconds.
//!
//! ```rust
//! use obstacle_middleware::key::shared_data_key;
//!
//! assert_eq!(shared_data_key(100.0, "radar_front").unwrap(), "radar_front10000");
//! assert!(shared_data_key(100.0, "").is_err());
//! ```

use obstacle_types::{PerceptionError, Timestamp};
use thiserror::Error;

/// Timestamps are scaled by this factor before being folded into the key.
pub const STAMP_ENLARGE_FACTOR: f64 = 100.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeyError {
    #[error("device id is empty")]
    EmptyDeviceId,

    #[error("device id {0:?} contains whitespace or control characters")]
    InvalidDeviceId(String),

    #[error("timestamp {0} cannot be encoded")]
    InvalidTimestamp(Timestamp),
}

impl From<KeyError> for PerceptionError {
    fn from(e: KeyError) -> Self {
        PerceptionError::KeyDerivation(e.to_string())
    }
}

/// Derive the shared-data key for a result.
///
/// The scaled timestamp is rounded to the nearest integer so that
/// `100.07 - 0.07` and `100.0` land on the same key.
pub fn shared_data_key(timestamp: Timestamp, device_id: &str) -> Result<String, KeyError> {
    if device_id.is_empty() {
        return Err(KeyError::EmptyDeviceId);
    }
    if device_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(KeyError::InvalidDeviceId(device_id.to_string()));
    }
    let scaled = (timestamp * STAMP_ENLARGE_FACTOR).round();
    if !scaled.is_finite() || scaled < 0.0 || scaled >= i64::MAX as f64 {
        return Err(KeyError::InvalidTimestamp(timestamp));
    }
    Ok(format!("{device_id}{}", scaled as i64))
}
