//! Content fingerprints for planned layouts.
//!
//! A layout fingerprint is the SHA-256 of the serialized layout description.
//! Locators and stores carry the fingerprint of the layout they came from,
//! so a locator from an incompatible layout is rejected rather than
//! silently indexing the wrong slot.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 layout hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutFingerprint([u8; 32]);

impl LayoutFingerprint {
    /// Fingerprint any serializable layout description.
    pub fn of<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(value)?;
        let mut hasher = Sha256::new();
        hasher.update(&json);
        Ok(Self(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight hex digits, for log lines.
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for LayoutFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
