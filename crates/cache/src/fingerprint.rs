//! Cache keys for (context, criteria set) pairs.
//!
//! The key covers each property's key, declared type and raw value, the
//! evaluation time truncated to the minute, and the canonical JSON of the
//! criteria list. Context identity, timestamps of individual properties
//! and data sources are excluded so equal fact sets share a key.

use serde::Serialize;
use sha2::{Digest, Sha256};
use targeting_core::{TargetingContext, TargetingResult};

const FIELD_SEPARATOR: u8 = 0x1f;
const RECORD_SEPARATOR: u8 = 0x1e;

/// Hex-encoded SHA-256 fingerprint.
pub fn fingerprint<C: Serialize>(context: &TargetingContext, criteria: &[C]) -> TargetingResult<String> {
    let mut hasher = Sha256::new();
    for property in context.properties() {
        hasher.update(property.key().as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(format!("{:?}", property.property_type()).as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(property.raw_value().as_bytes());
        hasher.update([RECORD_SEPARATOR]);
    }
    let minute = context.request_time().timestamp().div_euclid(60);
    hasher.update(minute.to_le_bytes());
    hasher.update([RECORD_SEPARATOR]);
    hasher.update(serde_json::to_vec(criteria)?);
    Ok(hex::encode(hasher.finalize()))
}
