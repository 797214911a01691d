//! # Secret Generation and Hashing
//!
//! Token secrets and node API keys: 32 bytes from the OS CSPRNG, presented
//! as an opaque lowercase-hex string (256 bits, well above the 128-bit
//! floor). Only the SHA-256 of a secret is ever stored; presentation-time
//! verification uses a constant-time comparison over the hash bytes.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Byte length of generated secrets.
const SECRET_LEN: usize = 32;

/// Generate a fresh secret as an opaque printable string.
pub fn generate_secret() -> String {
    let mut bytes = Zeroizing::new([0u8; SECRET_LEN]);
    OsRng.fill_bytes(&mut *bytes);
    hex::encode(&bytes[..])
}

/// Storage hash of a secret (SHA-256, lowercase hex).
pub fn hash_secret(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex::encode(digest)
}

/// Constant-time check of a presented secret against a stored hash.
///
/// The comparison runs over the fixed-width digest, so timing reveals
/// nothing about how much of the secret matched.
pub fn verify_secret(plaintext: &str, stored_hash: &str) -> bool {
    let presented = Sha256::digest(plaintext.as_bytes());
    let presented_hex = hex::encode(presented);
    presented_hex.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_unique_and_printable() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        assert_eq!(a.len(), SECRET_LEN * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verify_accepts_matching_secret() {
        let secret = generate_secret();
        let hash = hash_secret(&secret);
        assert!(verify_secret(&secret, &hash));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let hash = hash_secret(&generate_secret());
        assert!(!verify_secret(&generate_secret(), &hash));
        assert!(!verify_secret("", &hash));
    }

    #[test]
    fn hash_is_stable() {
        assert_eq!(hash_secret("abc"), hash_secret("abc"));
        assert_ne!(hash_secret("abc"), hash_secret("abd"));
    }
}
