/// Credential hashing and verification using Argon2id
///
/// Used for account passwords and for one-time verification codes. Every call
/// to `hash` draws a fresh random salt; the PHC string carries salt and
/// parameters so `verify` needs nothing but the stored digest.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;

/// Argon2id memory cost (KiB) of the default parameters
pub const DEFAULT_MEMORY_KIB: u32 = 19_456;
/// Argon2id iteration count of the default parameters
pub const DEFAULT_ITERATIONS: u32 = 2;
/// Argon2id lane count of the default parameters
pub const DEFAULT_PARALLELISM: u32 = 1;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),

    #[error("Hashing failed: {0}")]
    Hashing(String),
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingParams {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// Stateless Argon2id hasher; cheap to clone and safe to share across threads
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    pub fn new(params: HashingParams) -> Result<Self, HashError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| HashError::InvalidParams(e.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `plaintext` with a freshly generated salt
    ///
    /// Returns a PHC-formatted string safe for storage.
    pub fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| HashError::Hashing(e.to_string()))
    }

    /// Check `plaintext` against a stored PHC digest
    ///
    /// A malformed digest is reported as a failed verification. Parameters
    /// are read from the digest, so hashes produced under older cost
    /// settings keep verifying.
    pub fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Stored credential digest is malformed");
                return false;
            }
        };

        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            params: Params::new(
                DEFAULT_MEMORY_KIB,
                DEFAULT_ITERATIONS,
                DEFAULT_PARALLELISM,
                None,
            )
            .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> CredentialHasher {
        CredentialHasher::new(HashingParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .expect("test params are valid")
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let digest = hasher.hash("pw123456").expect("should hash");
        assert!(hasher.verify("pw123456", &digest));
    }

    #[test]
    fn test_verify_wrong_plaintext() {
        let hasher = fast_hasher();
        let digest = hasher.hash("pw123456").expect("should hash");
        assert!(!hasher.verify("wrongpassword", &digest));
    }

    #[test]
    fn test_different_salts_for_same_plaintext() {
        let hasher = fast_hasher();
        let first = hasher.hash("pw123456").expect("should hash");
        let second = hasher.hash("pw123456").expect("should hash");
        assert_ne!(first, second);
    }

    #[test]
    fn test_malformed_digest_is_a_mismatch() {
        let hasher = fast_hasher();
        assert!(!hasher.verify("pw123456", "not-a-phc-string"));
        assert!(!hasher.verify("pw123456", ""));
        assert!(!hasher.verify("pw123456", "$argon2id$v=19$m=broken"));
    }

    #[test]
    fn test_boundary_lengths() {
        let hasher = fast_hasher();
        for plaintext in ["a".to_string(), "x".repeat(256), "pässwörd-ünïcode".to_string()] {
            let digest = hasher.hash(&plaintext).expect("should hash");
            assert!(hasher.verify(&plaintext, &digest));
            assert!(!hasher.verify(&format!("{plaintext}!"), &digest));
        }
    }

    #[test]
    fn test_digest_from_other_params_still_verifies() {
        let digest = fast_hasher().hash("pw123456").expect("should hash");
        let other = CredentialHasher::new(HashingParams {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        })
        .expect("valid params");
        assert!(other.verify("pw123456", &digest));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let result = CredentialHasher::new(HashingParams {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(matches!(result, Err(HashError::InvalidParams(_))));
    }
}
