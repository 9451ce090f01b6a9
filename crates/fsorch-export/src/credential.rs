//! Mount credentials.

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Shared secret handed to clients alongside the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountCredential {
    /// Hex-encoded 128-bit secret.
    pub secret: String,
}

impl MountCredential {
    /// Generate a fresh random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            secret: hex::encode(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_length() {
        let cred = MountCredential::generate();
        assert_eq!(cred.secret.len(), 32);
        assert!(cred.secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_distinct() {
        let a = MountCredential::generate();
        let b = MountCredential::generate();
        assert_ne!(a, b);
    }
}
