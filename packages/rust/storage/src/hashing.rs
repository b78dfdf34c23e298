//! Credential hashes compatible with the platform's login check.
//!
//! The platform verifies passwords with bcrypt and stores them in the `$2a$`
//! modular format, cost 10.

use bcrypt::Version;

use datalive_shared::{BootstrapError, Result};

/// bcrypt work factor the platform itself uses.
pub const BCRYPT_COST: u32 = 10;

/// Hash a plaintext password into the platform's stored format.
pub fn hash_password(plain: &str) -> Result<String> {
    let parts = bcrypt::hash_with_result(plain, BCRYPT_COST)
        .map_err(|e| BootstrapError::Hashing(e.to_string()))?;
    Ok(parts.format_for_version(Version::TwoA))
}

/// Check a plaintext password against a stored hash. Malformed hashes never match.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    bcrypt::verify(plain, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_uses_platform_format() {
        let hash = hash_password("Sup3r-secret").expect("hash");
        assert!(hash.starts_with("$2a$10$"), "unexpected prefix: {hash}");
        assert_eq!(hash.len(), 60);
    }

    #[test]
    fn verify_roundtrip() {
        let hash = hash_password("Sup3r-secret").expect("hash");
        assert!(verify_password("Sup3r-secret", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
