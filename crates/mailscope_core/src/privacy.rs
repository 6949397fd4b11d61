//! Pseudonymous address fingerprints for log output
//!
//! Log records carry a salted SHA-256 of the local part plus the plain
//! domain, so operators can correlate requests without storing mailboxes.

use sha2::{Digest, Sha256};
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use tracing::debug;

/// Hex characters of the digest kept in a fingerprint
const FINGERPRINT_LEN: usize = 16;

pub struct Fingerprinter {
    salt: Vec<u8>,
}

impl Fingerprinter {
    pub fn new(salt: impl Into<Vec<u8>>) -> Self {
        let salt = salt.into();
        debug!("Fingerprinter initialized with {}-byte salt", salt.len());
        Self { salt }
    }

    /// Per-process salt; fingerprints are not comparable across restarts
    pub fn with_random_salt() -> Self {
        let mut salt = Vec::with_capacity(32);
        for _ in 0..4 {
            let mut hasher = RandomState::new().build_hasher();
            hasher.write_usize(salt.len());
            salt.extend_from_slice(&hasher.finish().to_be_bytes());
        }
        Self::new(salt)
    }

    pub fn hash_local_part(&self, local_part: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.salt);
        hasher.update(local_part.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// `<hash prefix>@<domain>`, or just the hash prefix for input without `@`
    pub fn fingerprint(&self, email: &str) -> String {
        match email.rsplit_once('@') {
            Some((local, domain)) => {
                let hash = self.hash_local_part(local);
                format!("{}@{}", &hash[..FINGERPRINT_LEN], domain)
            }
            None => self.hash_local_part(email)[..FINGERPRINT_LEN].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_local_part_hashing() {
        let processor = Fingerprinter::new(vec![1, 2, 3, 4]);

        let hash1 = processor.hash_local_part("john.doe");
        let hash2 = processor.hash_local_part("john.doe");
        let hash3 = processor.hash_local_part("jane.doe");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_fingerprint_keeps_domain_only() {
        let processor = Fingerprinter::new("pepper");
        let fingerprint = processor.fingerprint("john.doe@example.com");

        assert!(fingerprint.ends_with("@example.com"));
        assert!(!fingerprint.contains("john"));
        assert_eq!(fingerprint.len(), FINGERPRINT_LEN + "@example.com".len());
        assert_eq!(processor.fingerprint("no-at-sign").len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_salt_changes_hash() {
        let a = Fingerprinter::new("salt-a").hash_local_part("user");
        let b = Fingerprinter::new("salt-b").hash_local_part("user");
        assert_ne!(a, b);
    }

    #[test]
    fn test_random_salts_differ() {
        let a = Fingerprinter::with_random_salt().hash_local_part("user");
        let b = Fingerprinter::with_random_salt().hash_local_part("user");
        assert_ne!(a, b);
    }
}
