//! Artifact verification (SHA-256)

use sdk::errors::EngineError;
use sha2::{Digest, Sha256};

/// Verify that a finished SHA-256 digest matches `expected_hex`
pub fn verify_digest(hasher: Sha256, expected_hex: &str) -> Result<(), EngineError> {
    let computed = hex::encode(hasher.finalize());

    if !computed.eq_ignore_ascii_case(expected_hex.trim()) {
        return Err(EngineError::HashMismatch(format!(
            "expected {}, got {}",
            expected_hex, computed
        )));
    }

    Ok(())
}

/// Verify that the SHA-256 hash of `data` matches `expected_hex`
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<(), EngineError> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    verify_digest(hasher, expected_hex)
}

/// Compute the SHA-256 hash of `data` and return hex string
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
