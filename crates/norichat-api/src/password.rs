//! Salted password hashing in the `salt:hash` stored format.
//!
//! Stored value: `hex(salt8) ':' hex(sha256(hex(salt8) || password))`.
//! The format boundary is stable so a future memory-hard KDF can coexist
//! with existing rows by distinguishing on shape.

use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 8;

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let salt_hex = hex::encode(salt);
    let digest = digest_hex(&salt_hex, password);
    format!("{salt_hex}:{digest}")
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, expected)) = stored.split_once(':') else {
        return false;
    };
    let actual = digest_hex(salt_hex, password);
    constant_time_eq(actual.as_bytes(), expected.as_bytes())
}

fn digest_hex(salt_hex: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_has_salt_colon_digest_shape() {
        let stored = hash_password("pw1234");
        let (salt, digest) = stored.split_once(':').unwrap();
        assert_eq!(salt.len(), SALT_LEN * 2);
        assert_eq!(digest.len(), 64);
        assert!(salt.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn roundtrip_verifies() {
        let stored = hash_password("correct horse");
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("correct h0rse", &stored));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password("same");
        let b = hash_password("same");
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn malformed_stored_values_never_verify() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "!"));
        assert!(!verify_password("anything", "no-separator-here"));
    }
}
